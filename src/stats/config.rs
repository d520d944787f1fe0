use std::{error::Error, fmt::Display, str::FromStr};

///
/// The metrics a [`Resource`](crate::sync::Resource) can feed into a
/// bound data collector.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
pub enum Metric {
    /// Time of every acquire call.
    Arrivals,
    /// Time of every grant.
    Services,
    /// Time of every forced removal from the wait queue.
    Reneges,
    /// Time of every release.
    Departs,
    /// Time between two consecutive arrivals.
    InterArrivals,
    /// Time from arrival to grant.
    QueueTimes,
    /// Time from arrival to a forced removal from the wait queue.
    RenegeTimes,
    /// Time from grant to release.
    ServiceTimes,
    /// Time from arrival to release.
    SystemTimes,
    /// Number of processes holding or waiting.
    InSystems,
    /// Number of processes holding a unit.
    InServices,
    /// Number of processes waiting.
    InQueues,
}

impl Metric {
    /// All metrics, in report order.
    pub const ALL: [Metric; 12] = [
        Metric::Arrivals,
        Metric::Services,
        Metric::Reneges,
        Metric::Departs,
        Metric::InterArrivals,
        Metric::QueueTimes,
        Metric::RenegeTimes,
        Metric::ServiceTimes,
        Metric::SystemTimes,
        Metric::InSystems,
        Metric::InServices,
        Metric::InQueues,
    ];

    /// The textual name of the metric.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Arrivals => "arrivals",
            Metric::Services => "services",
            Metric::Reneges => "reneges",
            Metric::Departs => "departs",
            Metric::InterArrivals => "inter_arrivals",
            Metric::QueueTimes => "queue_times",
            Metric::RenegeTimes => "renege_times",
            Metric::ServiceTimes => "service_times",
            Metric::SystemTimes => "system_times",
            Metric::InSystems => "in_systems",
            Metric::InServices => "in_services",
            Metric::InQueues => "in_queues",
        }
    }

    /// The kind of collector that can record this metric.
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Arrivals | Metric::Services | Metric::Reneges | Metric::Departs => {
                MetricKind::TimeMarks
            }
            Metric::InterArrivals
            | Metric::QueueTimes
            | Metric::RenegeTimes
            | Metric::ServiceTimes
            | Metric::SystemTimes => MetricKind::RunStats,
            Metric::InSystems | Metric::InServices | Metric::InQueues => MetricKind::TimeSeries,
        }
    }
}

impl Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Metric::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| ConfigError::UnknownMetric(s.to_string()))
    }
}

/// The three families of collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Event timestamps.
    TimeMarks,
    /// Scalar samples, usually durations.
    RunStats,
    /// Piecewise constant levels over time.
    TimeSeries,
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeMarks => write!(f, "timemarks"),
            Self::RunStats => write!(f, "runstats"),
            Self::TimeSeries => write!(f, "timeseries"),
        }
    }
}

///
/// The configuration of a single collector.
///
/// `all` selects full retention of the raw data in addition to
/// the streaming aggregates.
///
/// Parses from `timemarks`, `timemarks()` or `timemarks(all)`,
/// and equally for `runstats` and `timeseries`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum CollectorSpec {
    /// Event timestamps.
    TimeMarks {
        /// Retain every timestamp.
        all: bool,
    },
    /// Streaming scalar statistics.
    RunStats {
        /// Retain every sample.
        all: bool,
    },
    /// Time weighted level statistics.
    TimeSeries {
        /// Retain every breakpoint.
        all: bool,
    },
}

impl CollectorSpec {
    /// The collector family of this spec.
    #[must_use]
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::TimeMarks { .. } => MetricKind::TimeMarks,
            Self::RunStats { .. } => MetricKind::RunStats,
            Self::TimeSeries { .. } => MetricKind::TimeSeries,
        }
    }

    /// Whether raw data is retained.
    #[must_use]
    pub fn retains_all(&self) -> bool {
        match *self {
            Self::TimeMarks { all } | Self::RunStats { all } | Self::TimeSeries { all } => all,
        }
    }
}

impl Display for CollectorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.retains_all() {
            write!(f, "{}(all)", self.kind())
        } else {
            write!(f, "{}()", self.kind())
        }
    }
}

impl FromStr for CollectorSpec {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ConfigError::UnknownSpec(s.to_string());

        let trimmed = s.trim();
        let (name, args) = match trimmed.split_once('(') {
            Some((name, rest)) => (name.trim(), rest.strip_suffix(')').ok_or_else(unknown)?),
            None => (trimmed, ""),
        };
        let all = match args.trim() {
            "" => false,
            "all" => true,
            _ => return Err(unknown()),
        };

        match name {
            "timemarks" => Ok(Self::TimeMarks { all }),
            "runstats" => Ok(Self::RunStats { all }),
            "timeseries" => Ok(Self::TimeSeries { all }),
            _ => Err(unknown()),
        }
    }
}

/// An error in the configuration of a data collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The metric name is not recognised.
    UnknownMetric(String),
    /// The collector spec is not recognised.
    UnknownSpec(String),
    /// The collector spec cannot record the metric.
    KindMismatch {
        /// The configured metric.
        metric: Metric,
        /// The rejected spec.
        spec: CollectorSpec,
    },
    /// The metric was configured more than once.
    DuplicateMetric(Metric),
    /// The YAML document could not be parsed.
    Yaml(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMetric(name) => write!(f, "unknown metric '{name}'"),
            Self::UnknownSpec(spec) => write!(f, "unknown collector spec '{spec}'"),
            Self::KindMismatch { metric, spec } => write!(
                f,
                "metric '{metric}' requires a {} collector, got '{spec}'",
                metric.kind()
            ),
            Self::DuplicateMetric(metric) => write!(f, "metric '{metric}' configured twice"),
            Self::Yaml(msg) => write!(f, "invalid yaml: {msg}"),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_metric_names() {
        for metric in Metric::ALL {
            assert_eq!(metric.name().parse::<Metric>(), Ok(metric));
        }
        assert_eq!(" in_queues ".parse::<Metric>(), Ok(Metric::InQueues));
        assert_eq!(
            "queue_length".parse::<Metric>(),
            Err(ConfigError::UnknownMetric("queue_length".to_string()))
        );
    }

    #[test]
    fn parse_collector_specs() {
        assert_eq!(
            "timemarks(all)".parse::<CollectorSpec>(),
            Ok(CollectorSpec::TimeMarks { all: true })
        );
        assert_eq!(
            "runstats()".parse::<CollectorSpec>(),
            Ok(CollectorSpec::RunStats { all: false })
        );
        assert_eq!(
            "runstats".parse::<CollectorSpec>(),
            Ok(CollectorSpec::RunStats { all: false })
        );
        assert_eq!(
            " timeseries( all ) ".parse::<CollectorSpec>(),
            Ok(CollectorSpec::TimeSeries { all: true })
        );

        for bad in ["histogram()", "timemarks(some)", "runstats(all", "", "()"] {
            assert_eq!(
                bad.parse::<CollectorSpec>(),
                Err(ConfigError::UnknownSpec(bad.to_string())),
                "{bad}"
            );
        }
    }

    #[test]
    fn spec_display() {
        assert_eq!(
            CollectorSpec::TimeSeries { all: true }.to_string(),
            "timeseries(all)"
        );
        assert_eq!(CollectorSpec::RunStats { all: false }.to_string(), "runstats()");
    }

    #[test]
    fn metric_kinds() {
        assert_eq!(Metric::Departs.kind(), MetricKind::TimeMarks);
        assert_eq!(Metric::RenegeTimes.kind(), MetricKind::RunStats);
        assert_eq!(Metric::InServices.kind(), MetricKind::TimeSeries);

        let err = ConfigError::KindMismatch {
            metric: Metric::InQueues,
            spec: CollectorSpec::RunStats { all: false },
        };
        assert_eq!(
            err.to_string(),
            "metric 'in_queues' requires a timeseries collector, got 'runstats()'"
        );
    }
}
