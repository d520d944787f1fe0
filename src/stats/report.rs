use super::{CollectorSpec, Metric, RunStats, Statistic, TimeMarks, TimeSeries};
use crate::time::SimTime;
use std::fmt::Display;

/// The aggregates of a [`TimeMarks`] collector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TimeMarksSummary {
    /// The number of marks.
    pub count: usize,
    /// The earliest mark.
    pub first: Option<SimTime>,
    /// The latest mark.
    pub last: Option<SimTime>,
    /// Marks per time unit since the collector was created.
    pub rate: f64,
}

impl TimeMarksSummary {
    pub(crate) fn of(marks: &TimeMarks, elapsed: f64) -> Self {
        Self {
            count: marks.count(),
            first: marks.first(),
            last: marks.last(),
            rate: marks.rate(elapsed),
        }
    }
}

/// The aggregates of a [`RunStats`] collector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RunStatsSummary {
    /// The number of samples.
    pub count: usize,
    /// The arithmetic mean.
    pub mean: f64,
    /// The sample variance.
    pub variance: f64,
    /// The square root of the variance.
    pub stddev: f64,
    /// The smallest sample.
    pub min: Option<f64>,
    /// The largest sample.
    pub max: Option<f64>,
}

impl RunStatsSummary {
    pub(crate) fn of(stats: &RunStats) -> Self {
        let (min, max) = bounds(stats);
        Self {
            count: stats.len(),
            mean: stats.mean(),
            variance: stats.variance(),
            stddev: stats.std_dev(),
            min,
            max,
        }
    }
}

/// The aggregates of a [`TimeSeries`] collector, closed at the report time.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TimeSeriesSummary {
    /// The number of breakpoints.
    pub breakpoints: usize,
    /// The time weighted mean.
    pub mean: f64,
    /// The time weighted variance.
    pub variance: f64,
    /// The square root of the variance.
    pub stddev: f64,
    /// The lowest level.
    pub min: Option<f64>,
    /// The highest level.
    pub max: Option<f64>,
    /// The level at the report time.
    pub last: Option<f64>,
    /// The time covered, from the first breakpoint to the report time.
    pub elapsed: f64,
}

impl TimeSeriesSummary {
    pub(crate) fn of(series: &TimeSeries, now: SimTime) -> Self {
        let closed = series.closed_at(now);
        let (min, max) = bounds(&closed);
        Self {
            breakpoints: closed.len(),
            mean: closed.mean(),
            variance: closed.variance(),
            stddev: closed.std_dev(),
            min,
            max,
            last: closed.current(),
            elapsed: closed.elapsed(),
        }
    }
}

fn bounds(stat: &impl Statistic) -> (Option<f64>, Option<f64>) {
    if stat.is_empty() {
        (None, None)
    } else {
        (Some(stat.min()), Some(stat.max()))
    }
}

/// The aggregates of a single collector.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(rename_all = "lowercase"))]
pub enum Summary {
    /// See [`TimeMarksSummary`].
    TimeMarks(TimeMarksSummary),
    /// See [`RunStatsSummary`].
    RunStats(RunStatsSummary),
    /// See [`TimeSeriesSummary`].
    TimeSeries(TimeSeriesSummary),
}

/// The summary of one configured metric.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetricReport {
    /// The reported metric.
    pub metric: Metric,
    /// The configuration of its collector.
    pub spec: CollectorSpec,
    /// The aggregates.
    pub summary: Summary,
}

///
/// A read-only projection of a [`DataCollector`](super::DataCollector)
/// at a given time.
///
/// Metrics are listed in the order of [`Metric::ALL`].
///
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// The time of the report.
    pub time: SimTime,
    /// The time since the collector was created.
    pub elapsed: f64,
    /// One entry per configured metric.
    pub metrics: Vec<MetricReport>,
}

impl Report {
    /// The summary of a metric, if configured.
    #[must_use]
    pub fn get(&self, metric: Metric) -> Option<&Summary> {
        self.metrics
            .iter()
            .find(|m| m.metric == metric)
            .map(|m| &m.summary)
    }

    /// The summary of a timemarks metric.
    #[must_use]
    pub fn timemarks(&self, metric: Metric) -> Option<&TimeMarksSummary> {
        match self.get(metric)? {
            Summary::TimeMarks(s) => Some(s),
            _ => None,
        }
    }

    /// The summary of a runstats metric.
    #[must_use]
    pub fn runstats(&self, metric: Metric) -> Option<&RunStatsSummary> {
        match self.get(metric)? {
            Summary::RunStats(s) => Some(s),
            _ => None,
        }
    }

    /// The summary of a timeseries metric.
    #[must_use]
    pub fn timeseries(&self, metric: Metric) -> Option<&TimeSeriesSummary> {
        match self.get(metric)? {
            Summary::TimeSeries(s) => Some(s),
            _ => None,
        }
    }
}

struct Opt<T>(Option<T>);

impl Display for Opt<f64> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.6}"),
            None => write!(f, "-"),
        }
    }
}

impl Display for Opt<SimTime> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Opt(self.0.map(SimTime::as_f64)).fmt(f)
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeMarks(s) => write!(
                f,
                "count: {} first: {} last: {} rate: {:.6}",
                s.count,
                Opt(s.first),
                Opt(s.last),
                s.rate
            ),
            Self::RunStats(s) => write!(
                f,
                "count: {} mean: {:.6} var: {:.6} stddev: {:.6} min: {} max: {}",
                s.count,
                s.mean,
                s.variance,
                s.stddev,
                Opt(s.min),
                Opt(s.max)
            ),
            Self::TimeSeries(s) => write!(
                f,
                "breakpoints: {} mean: {:.6} var: {:.6} stddev: {:.6} min: {} max: {} last: {} elapsed: {:.6}",
                s.breakpoints,
                s.mean,
                s.variance,
                s.stddev,
                Opt(s.min),
                Opt(s.max),
                Opt(s.last),
                s.elapsed
            ),
        }
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "report at {} (elapsed {:.6})", self.time, self.elapsed)?;
        for m in &self.metrics {
            writeln!(
                f,
                "  {:<15} {:<16} {}",
                m.metric.name(),
                m.spec.to_string(),
                m.summary
            )?;
        }
        Ok(())
    }
}
