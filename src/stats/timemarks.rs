use crate::time::SimTime;

///
/// A record of event timestamps.
///
/// In bounded mode only the count and the first and last timestamp are
/// kept, otherwise every timestamp is retained in order.
///
#[derive(Debug, Clone, PartialEq)]
pub struct TimeMarks {
    all: bool,
    count: usize,
    first: Option<SimTime>,
    last: Option<SimTime>,
    marks: Vec<SimTime>,
}

impl TimeMarks {
    /// Creates an empty record.
    #[must_use]
    pub fn new(all: bool) -> Self {
        Self {
            all,
            count: 0,
            first: None,
            last: None,
            marks: Vec::new(),
        }
    }

    /// Records a timestamp.
    pub fn mark(&mut self, time: SimTime) {
        self.count += 1;
        self.first.get_or_insert(time);
        self.last = Some(time);
        if self.all {
            self.marks.push(time);
        }
    }

    /// Whether every timestamp is retained.
    #[must_use]
    pub fn retains_all(&self) -> bool {
        self.all
    }

    /// The number of recorded timestamps.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// The earliest recorded timestamp.
    #[must_use]
    pub fn first(&self) -> Option<SimTime> {
        self.first
    }

    /// The latest recorded timestamp.
    #[must_use]
    pub fn last(&self) -> Option<SimTime> {
        self.last
    }

    /// The retained timestamps, empty in bounded mode.
    #[must_use]
    pub fn marks(&self) -> &[SimTime] {
        &self.marks
    }

    ///
    /// The number of marks per time unit over `elapsed` time units,
    /// zero if no time has passed.
    ///
    #[must_use]
    pub fn rate(&self, elapsed: f64) -> f64 {
        if elapsed > 0.0 {
            self.count as f64 / elapsed
        } else {
            0.0
        }
    }
}
