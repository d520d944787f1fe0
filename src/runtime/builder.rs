use std::fmt::Debug;

use crate::time::SimTime;

use super::{RuntimeLimit, Simulator, UnwindBehaviour};

/// A builder for a simulator instance.
#[must_use]
pub struct Builder {
    pub(super) limit: RuntimeLimit,
    pub(super) start_time: SimTime,
    pub(super) unwind: UnwindBehaviour,
}

impl Builder {
    /// Creates a new unconfigured builder.
    pub fn new() -> Builder {
        Builder {
            limit: RuntimeLimit::None,
            start_time: SimTime::ZERO,
            unwind: UnwindBehaviour::Catch,
        }
    }

    ///
    /// Changes the initial simulation time (default: 0).
    ///
    pub fn start_time(mut self, time: impl Into<SimTime>) -> Self {
        self.start_time = time.into();
        self
    }

    ///
    /// Changes the maximum iteration number of a simulator.
    ///
    /// The count covers all events dispatched over the lifetime
    /// of the simulator, not only those of a single run.
    ///
    pub fn max_itr(mut self, max_itr: usize) -> Self {
        self.limit = std::mem::take(&mut self.limit) | RuntimeLimit::EventCount(max_itr);
        self
    }

    ///
    /// Changes the maximum time of the simulator (default: inf).
    ///
    /// Runs with a later horizon stop dispatching at this time.
    ///
    pub fn max_time(mut self, max_time: impl Into<SimTime>) -> Self {
        self.limit = std::mem::take(&mut self.limit) | RuntimeLimit::SimTime(max_time.into());
        self
    }

    ///
    /// Adds a custom limit. Every call adds a further stop condition,
    /// the first one reached ends a run.
    ///
    pub fn limit(mut self, limit: RuntimeLimit) -> Self {
        self.limit = std::mem::take(&mut self.limit) | limit;
        self
    }

    ///
    /// Defines how panics inside of processes and callbacks are treated
    /// (default: [`UnwindBehaviour::Catch`]).
    ///
    pub fn unwind(mut self, unwind: UnwindBehaviour) -> Self {
        self.unwind = unwind;
        self
    }

    ///
    /// Builds a new [`Simulator`] instance.
    ///
    /// # Examples
    ///
    /// ```
    /// use dessim::prelude::*;
    ///
    /// let sim = Builder::new()
    ///     .start_time(10.0)
    ///     .max_itr(1_000)
    ///     .build();
    ///
    /// assert_eq!(sim.now(), SimTime::new(10.0));
    /// ```
    #[must_use]
    pub fn build(self) -> Simulator {
        tracing::debug!(
            start_time = %self.start_time,
            limit = %self.limit,
            unwind = ?self.unwind,
            "building simulator"
        );
        Simulator::from_builder(self)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("limit", &self.limit)
            .field("start_time", &self.start_time)
            .field("unwind", &self.unwind)
            .finish()
    }
}
