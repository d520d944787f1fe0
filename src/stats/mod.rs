//!
//! A set of structs that help with the collection of statistical data.
//!
//! A [`DataCollector`] bundles one collector per configured [`Metric`].
//! Bound to a [`Resource`](crate::sync::Resource), it receives samples
//! whenever processes arrive, get served, renege or depart.
//!
//! ```
//! use dessim::prelude::*;
//!
//! let dc = DataCollector::parse([
//!     ("arrivals", "timemarks(all)"),
//!     ("service_times", "runstats"),
//!     ("in_queues", "timeseries()"),
//! ])
//! .unwrap();
//!
//! assert_eq!(
//!     dc.metrics(),
//!     vec![Metric::Arrivals, Metric::ServiceTimes, Metric::InQueues]
//! );
//! assert!(DataCollector::parse([("arrivals", "runstats()")]).is_err());
//! ```
#![allow(clippy::cast_precision_loss)]

use crate::time::SimTime;
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fmt::Debug,
    rc::{Rc, Weak},
};

mod config;
pub use self::config::*;

mod report;
pub use self::report::*;

mod runstats;
pub use self::runstats::*;

mod timemarks;
pub use self::timemarks::*;

mod timeseries;
pub use self::timeseries::*;

///
/// A type that allows for statistical datacollection
/// inside a given simulation.
///
pub trait Statistic {
    ///
    /// Collects a datapoint at a given time.
    ///
    fn collect_at(&mut self, value: f64, time: SimTime);

    /// Indicates whether the statistical object has received any datapoints.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of datapoints used in the statistical object.
    fn len(&self) -> usize;

    /// Returns the smallest datapoint.
    fn min(&self) -> f64;

    /// Returns the biggest datapoint.
    fn max(&self) -> f64;

    /// Returns the mean of all datapoints.
    fn mean(&self) -> f64;

    /// Returns the variance of all datapoints.
    fn variance(&self) -> f64;

    /// Returns the standard deviation of all datapoints.
    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[derive(Debug, Clone)]
enum Collector {
    TimeMarks(TimeMarks),
    RunStats(RunStats),
    TimeSeries(TimeSeries),
}

impl Collector {
    fn new(spec: CollectorSpec) -> Self {
        match spec {
            CollectorSpec::TimeMarks { all } => Self::TimeMarks(TimeMarks::new(all)),
            CollectorSpec::RunStats { all } => Self::RunStats(RunStats::new(all)),
            CollectorSpec::TimeSeries { all } => Self::TimeSeries(TimeSeries::new(all)),
        }
    }
}

#[derive(Debug)]
pub(crate) struct CollectorSet {
    start: SimTime,
    collectors: BTreeMap<Metric, (CollectorSpec, Collector)>,
}

impl CollectorSet {
    pub(crate) fn mark(&mut self, metric: Metric, time: SimTime) {
        if let Some((_, Collector::TimeMarks(marks))) = self.collectors.get_mut(&metric) {
            marks.mark(time);
        }
    }

    pub(crate) fn sample(&mut self, metric: Metric, value: f64) {
        if let Some((_, Collector::RunStats(stats))) = self.collectors.get_mut(&metric) {
            stats.push(value);
        }
    }

    pub(crate) fn level(&mut self, metric: Metric, time: SimTime, value: f64) {
        if let Some((_, Collector::TimeSeries(series))) = self.collectors.get_mut(&metric) {
            series.record(time, value);
        }
    }

    fn report(&self, now: SimTime) -> Report {
        let elapsed = now - self.start;
        let metrics = self
            .collectors
            .iter()
            .map(|(&metric, (spec, collector))| MetricReport {
                metric,
                spec: *spec,
                summary: match collector {
                    Collector::TimeMarks(c) => {
                        Summary::TimeMarks(TimeMarksSummary::of(c, elapsed))
                    }
                    Collector::RunStats(c) => Summary::RunStats(RunStatsSummary::of(c)),
                    Collector::TimeSeries(c) => {
                        Summary::TimeSeries(TimeSeriesSummary::of(c, now))
                    }
                },
            })
            .collect();

        Report {
            time: now,
            elapsed,
            metrics,
        }
    }
}

///
/// A fixed bundle of named metric collectors.
///
/// The mapping from metrics to collectors is validated once at
/// construction and cannot change afterwards. Clones share the same
/// collectors. Resources only keep a weak reference, so collected data
/// lives exactly as long as the last user held handle.
///
#[derive(Clone)]
pub struct DataCollector {
    inner: Rc<RefCell<CollectorSet>>,
}

impl DataCollector {
    ///
    /// Creates a collector with time marks measured from time zero.
    ///
    /// # Errors
    ///
    /// Fails if a spec does not match the kind of its metric,
    /// or a metric is configured twice.
    ///
    pub fn new(
        config: impl IntoIterator<Item = (Metric, CollectorSpec)>,
    ) -> Result<Self, ConfigError> {
        Self::starting_at(SimTime::ZERO, config)
    }

    ///
    /// Creates a collector with time marks measured from `start`.
    ///
    /// # Errors
    ///
    /// See [`DataCollector::new`].
    ///
    pub fn starting_at(
        start: SimTime,
        config: impl IntoIterator<Item = (Metric, CollectorSpec)>,
    ) -> Result<Self, ConfigError> {
        let mut collectors = BTreeMap::new();
        for (metric, spec) in config {
            if spec.kind() != metric.kind() {
                return Err(ConfigError::KindMismatch { metric, spec });
            }
            if collectors
                .insert(metric, (spec, Collector::new(spec)))
                .is_some()
            {
                return Err(ConfigError::DuplicateMetric(metric));
            }
        }

        tracing::debug!(%start, metrics = collectors.len(), "created data collector");
        Ok(Self {
            inner: Rc::new(RefCell::new(CollectorSet { start, collectors })),
        })
    }

    ///
    /// Creates a collector from textual `(metric, spec)` pairs,
    /// such as `("in_queues", "timeseries(all)")`.
    ///
    /// # Errors
    ///
    /// Fails on unknown metric names or specs, and otherwise
    /// like [`DataCollector::new`].
    ///
    pub fn parse<K, V>(config: impl IntoIterator<Item = (K, V)>) -> Result<Self, ConfigError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let typed = config
            .into_iter()
            .map(|(k, v)| -> Result<(Metric, CollectorSpec), ConfigError> {
                Ok((
                    k.as_ref().parse::<Metric>()?,
                    v.as_ref().parse::<CollectorSpec>()?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(typed)
    }

    ///
    /// Creates a collector from a YAML mapping of metric names to specs.
    ///
    /// ```yaml
    /// arrivals: timemarks(all)
    /// service_times: runstats
    /// in_systems: timeseries(all)
    /// ```
    ///
    /// # Errors
    ///
    /// Fails if the document is not a mapping of strings,
    /// and otherwise like [`DataCollector::parse`].
    ///
    #[cfg(feature = "yaml")]
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: BTreeMap<String, String> =
            serde_yml::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))?;
        Self::parse(config)
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<CollectorSet>> {
        Rc::downgrade(&self.inner)
    }

    /// The time the collector measures rates from.
    #[must_use]
    pub fn start(&self) -> SimTime {
        self.inner.borrow().start
    }

    /// The configured metrics in report order.
    #[must_use]
    pub fn metrics(&self) -> Vec<Metric> {
        self.inner.borrow().collectors.keys().copied().collect()
    }

    /// Whether the metric is configured.
    #[must_use]
    pub fn contains(&self, metric: Metric) -> bool {
        self.inner.borrow().collectors.contains_key(&metric)
    }

    /// The configuration of a metric.
    #[must_use]
    pub fn spec(&self, metric: Metric) -> Option<CollectorSpec> {
        self.inner.borrow().collectors.get(&metric).map(|(s, _)| *s)
    }

    /// A snapshot of a timemarks collector.
    #[must_use]
    pub fn timemarks(&self, metric: Metric) -> Option<TimeMarks> {
        match self.inner.borrow().collectors.get(&metric) {
            Some((_, Collector::TimeMarks(c))) => Some(c.clone()),
            _ => None,
        }
    }

    /// A snapshot of a runstats collector.
    #[must_use]
    pub fn runstats(&self, metric: Metric) -> Option<RunStats> {
        match self.inner.borrow().collectors.get(&metric) {
            Some((_, Collector::RunStats(c))) => Some(c.clone()),
            _ => None,
        }
    }

    /// A snapshot of a timeseries collector.
    #[must_use]
    pub fn timeseries(&self, metric: Metric) -> Option<TimeSeries> {
        match self.inner.borrow().collectors.get(&metric) {
            Some((_, Collector::TimeSeries(c))) => Some(c.clone()),
            _ => None,
        }
    }

    ///
    /// Summarises all collectors at `now`.
    ///
    /// Open time series intervals are closed at `now` in the report only,
    /// the collected data is not modified.
    ///
    #[must_use]
    pub fn report(&self, now: SimTime) -> Report {
        self.inner.borrow().report(now)
    }
}

impl Debug for DataCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("DataCollector")
            .field("start", &inner.start)
            .field("metrics", &inner.collectors.keys().collect::<Vec<_>>())
            .finish()
    }
}
