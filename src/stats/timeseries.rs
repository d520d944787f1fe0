use super::Statistic;
use crate::time::SimTime;

///
/// A piecewise constant level over simulation time.
///
/// Each breakpoint `(time, value)` holds until the next one. The time
/// weighted mean and variance cover the closed intervals between
/// breakpoints. The interval after the last breakpoint is only
/// included by [`TimeSeries::closed_at`].
///
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    all: bool,

    start: Option<SimTime>,
    last: Option<(SimTime, f64)>,
    len: usize,
    min: f64,
    max: f64,

    weight: f64,
    mean: f64,
    s: f64,

    breakpoints: Vec<(SimTime, f64)>,
}

impl TimeSeries {
    /// Creates an empty series.
    #[must_use]
    pub fn new(all: bool) -> Self {
        Self {
            all,

            start: None,
            last: None,
            len: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,

            weight: 0.0,
            mean: 0.0,
            s: 0.0,

            breakpoints: Vec::new(),
        }
    }

    ///
    /// Sets the level to `value` from `time` onwards.
    ///
    /// Breakpoints must arrive in non decreasing time order.
    ///
    pub fn record(&mut self, time: SimTime, value: f64) {
        self.close(time);
        self.start.get_or_insert(time);
        self.last = Some((time, value));
        self.len += 1;

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if self.all {
            self.breakpoints.push((time, value));
        }
    }

    // West's weighted incremental update
    fn close(&mut self, time: SimTime) {
        let Some((since, value)) = self.last else {
            return;
        };
        let weight = time - since;
        if weight <= 0.0 {
            return;
        }

        let total = self.weight + weight;
        let delta = value - self.mean;
        let r = delta * weight / total;
        self.mean += r;
        self.s += self.weight * delta * r;
        self.weight = total;
    }

    ///
    /// Returns a copy of this series with the open interval after the
    /// last breakpoint closed at `now`. The series itself is not modified.
    ///
    #[must_use]
    pub fn closed_at(&self, now: SimTime) -> TimeSeries {
        let mut closed = self.clone();
        closed.close(now);
        closed.last = self.last.map(|(time, value)| (time.max(now), value));
        closed
    }

    /// Whether every breakpoint is retained.
    #[must_use]
    pub fn retains_all(&self) -> bool {
        self.all
    }

    /// The retained breakpoints, empty in bounded mode.
    #[must_use]
    pub fn breakpoints(&self) -> &[(SimTime, f64)] {
        &self.breakpoints
    }

    /// The current level.
    #[must_use]
    pub fn current(&self) -> Option<f64> {
        self.last.map(|(_, v)| v)
    }

    /// The time of the first breakpoint.
    #[must_use]
    pub fn start(&self) -> Option<SimTime> {
        self.start
    }

    /// The time of the last breakpoint.
    #[must_use]
    pub fn last_time(&self) -> Option<SimTime> {
        self.last.map(|(t, _)| t)
    }

    /// The total length of all closed intervals.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.weight
    }
}

impl Statistic for TimeSeries {
    fn collect_at(&mut self, value: f64, time: SimTime) {
        self.record(time, value);
    }

    fn len(&self) -> usize {
        self.len
    }

    fn min(&self) -> f64 {
        self.min
    }

    fn max(&self) -> f64 {
        self.max
    }

    /// The time weighted mean. Without any closed interval this is the
    /// current level, or zero for an empty series.
    fn mean(&self) -> f64 {
        if self.weight > 0.0 {
            self.mean
        } else {
            self.current().unwrap_or(0.0)
        }
    }

    /// The time weighted population variance.
    fn variance(&self) -> f64 {
        if self.weight > 0.0 {
            (self.s / self.weight).max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_integral() {
        let mut series = TimeSeries::new(true);
        series.record(SimTime::ZERO, 0.0);
        series.record(SimTime::new(2.0), 3.0);
        series.record(SimTime::new(3.0), 1.0);

        // Closed intervals: 0 for 2 units, 3 for 1 unit.
        assert_eq!(series.elapsed(), 3.0);
        assert!((series.mean() - 1.0).abs() < 1e-12);

        // Closing at 7 adds 1 for 4 units: (0*2 + 3*1 + 1*4) / 7 = 1
        let closed = series.closed_at(SimTime::new(7.0));
        assert_eq!(closed.elapsed(), 7.0);
        assert!((closed.mean() - 1.0).abs() < 1e-12);

        let expected_var = (2.0 * 1.0 + 1.0 * 4.0 + 4.0 * 0.0) / 7.0;
        assert!((closed.variance() - expected_var).abs() < 1e-12);

        assert_eq!(series.elapsed(), 3.0, "closing must not mutate the series");
        assert_eq!(series.breakpoints().len(), 3);
        assert_eq!(series.min(), 0.0);
        assert_eq!(series.max(), 3.0);
    }

    #[test]
    fn zero_length_intervals_carry_no_weight() {
        let mut series = TimeSeries::new(false);
        series.record(SimTime::new(1.0), 5.0);
        series.record(SimTime::new(1.0), 2.0);
        assert_eq!(series.elapsed(), 0.0);
        assert_eq!(series.mean(), 2.0);
        assert_eq!(series.len(), 2);
        assert!(series.breakpoints().is_empty());

        let closed = series.closed_at(SimTime::new(3.0));
        assert_eq!(closed.mean(), 2.0);
        assert_eq!(closed.variance(), 0.0);
    }
}
