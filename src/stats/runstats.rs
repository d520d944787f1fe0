use super::Statistic;
use crate::time::SimTime;
use std::fmt::Display;

///
/// A streaming aggregator over scalar samples.
///
/// Mean and variance are maintained with Welford's method, so
/// long runs do not lose precision to cancellation.
///
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    all: bool,

    count: usize,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,

    samples: Vec<f64>,
}

impl RunStats {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new(all: bool) -> Self {
        Self {
            all,

            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,

            samples: Vec::new(),
        }
    }

    /// Adds a sample.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if self.all {
            self.samples.push(value);
        }
    }

    /// Whether every sample is retained.
    #[must_use]
    pub fn retains_all(&self) -> bool {
        self.all
    }

    /// The retained samples, empty in bounded mode.
    #[must_use]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }
}

impl Statistic for RunStats {
    fn collect_at(&mut self, value: f64, _time: SimTime) {
        self.push(value);
    }

    fn len(&self) -> usize {
        self.count
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    fn mean(&self) -> f64 {
        self.mean
    }

    /// The sample variance, zero for less than two samples.
    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }
}

impl Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Mean: {:>7.3} with deviation {:>7.3} (min: {:>7.3} max: {:>7.3} len: {})",
            self.mean(),
            self.std_dev(),
            self.min(),
            self.max(),
            self.count
        )
    }
}
