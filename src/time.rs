//!
//! Temporal quantification in a simulation context.
//!
//! A [`SimTime`] is a point on the virtual clock of a [`Simulator`](crate::runtime::Simulator).
//! Spans of simulated time are plain `f64` values, so arithmetic between
//! the two stays cheap and explicit.
//!
//! ```rust
//! # use dessim::time::SimTime;
//! let t = SimTime::ZERO + 2.5;
//! assert_eq!(t, SimTime::new(2.5));
//! assert_eq!(t - SimTime::new(1.0), 1.5);
//! ```

use std::cmp::Ordering;
use std::fmt::{Debug, Display};
use std::ops::{Add, AddAssign, Sub};

///
/// A specific point of time in the simulation.
///
/// Ordering is total (`f64::total_cmp`), so a `SimTime` can be used as a
/// key in ordered collections. Values handed to the scheduler are checked
/// to be non-NaN before they reach the event queue.
///
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SimTime(f64);

impl SimTime {
    /// The start of every simulation, unless configured otherwise.
    pub const ZERO: SimTime = SimTime(0.0);
    /// A time that is never reached.
    pub const INFINITY: SimTime = SimTime(f64::INFINITY);

    /// Creates a new instance from raw time units.
    #[must_use]
    pub const fn new(time: f64) -> Self {
        Self(time)
    }

    /// Returns the raw time units.
    #[must_use]
    pub const fn as_f64(self) -> f64 {
        self.0
    }

    ///
    /// Whether this value may be used on the event queue
    /// (not NaN, not negative infinity).
    ///
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.0.is_nan() && self.0 != f64::NEG_INFINITY
    }

    /// Whether the time is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.0.is_finite()
    }

    /// Returns the elapsed time units since `earlier`, or zero if
    /// `earlier` lies in the future.
    #[must_use]
    pub fn saturating_duration_since(&self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }

    /// Returns the smaller of the two values.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        std::cmp::min(self, other)
    }

    /// Returns the bigger of the two values.
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        std::cmp::max(self, other)
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl PartialEq<f64> for SimTime {
    fn eq(&self, other: &f64) -> bool {
        self.0 == *other
    }
}

impl Debug for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimTime({})", self.0)
    }
}

impl Display for SimTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<f64> for SimTime {
    fn from(fval: f64) -> Self {
        Self(fval)
    }
}

impl From<SimTime> for f64 {
    fn from(sim_time: SimTime) -> Self {
        sim_time.0
    }
}

impl Add<f64> for SimTime {
    type Output = Self;

    fn add(self, rhs: f64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<f64> for SimTime {
    fn add_assign(&mut self, rhs: f64) {
        self.0 += rhs;
    }
}

impl Sub for SimTime {
    type Output = f64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}
