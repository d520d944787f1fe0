use crate::time::SimTime;
use std::{
    fmt::Display,
    ops::{BitAnd, BitOr},
};

///
/// A stop condition for the dispatch loop of a [`Simulator`](super::Simulator).
///
/// Limits are checked before each event is dispatched, against the
/// number of events the dispatch would bring the simulator to and the
/// time of the candidate event. Compose them with `|` (stop when any
/// part is reached) and `&` (stop when every part is reached).
///
/// ```
/// use dessim::prelude::*;
///
/// let limit = RuntimeLimit::EventCount(1_000) | RuntimeLimit::SimTime(SimTime::new(50.0));
/// assert_eq!(limit.to_string(), "events > 1000 | time > 50");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuntimeLimit {
    /// Never stops, the run ends when the queue is drained.
    #[default]
    None,

    /// Stops before the event that would exceed this many dispatched
    /// events over the simulator's lifetime.
    EventCount(usize),

    /// Stops before the first event due strictly after this time.
    SimTime(SimTime),

    /// Stops once all contained limits are reached.
    All(Vec<RuntimeLimit>),

    /// Stops once any contained limit is reached.
    Any(Vec<RuntimeLimit>),
}

impl RuntimeLimit {
    ///
    /// Whether dispatching an event due at `next`, as the `dispatched`-th
    /// event overall, would exceed this limit.
    ///
    pub(crate) fn exceeded(&self, dispatched: usize, next: SimTime) -> bool {
        match self {
            Self::None => false,
            Self::EventCount(max) => dispatched > *max,
            Self::SimTime(horizon) => next > *horizon,
            Self::All(parts) => {
                !parts.is_empty() && parts.iter().all(|p| p.exceeded(dispatched, next))
            }
            Self::Any(parts) => parts.iter().any(|p| p.exceeded(dispatched, next)),
        }
    }

    ///
    /// The latest time up to which this limit lets events be dispatched,
    /// or `None` if the limit does not bound time.
    ///
    pub(crate) fn time_bound(&self) -> Option<SimTime> {
        match self {
            Self::None | Self::EventCount(_) => None,
            Self::SimTime(horizon) => Some(*horizon),
            Self::Any(parts) => parts.iter().filter_map(Self::time_bound).min(),
            Self::All(parts) if parts.is_empty() => None,
            Self::All(parts) => parts
                .iter()
                .map(Self::time_bound)
                .collect::<Option<Vec<_>>>()
                .and_then(|bounds| bounds.into_iter().max()),
        }
    }
}

impl BitOr for RuntimeLimit {
    type Output = RuntimeLimit;

    fn bitor(self, rhs: RuntimeLimit) -> RuntimeLimit {
        match (self, rhs) {
            (Self::None, other) | (other, Self::None) => other,
            (Self::Any(mut lhs), Self::Any(rhs)) => {
                lhs.extend(rhs);
                Self::Any(lhs)
            }
            (Self::Any(mut lhs), other) => {
                lhs.push(other);
                Self::Any(lhs)
            }
            (other, Self::Any(mut rhs)) => {
                rhs.insert(0, other);
                Self::Any(rhs)
            }
            (lhs, rhs) => Self::Any(vec![lhs, rhs]),
        }
    }
}

impl BitAnd for RuntimeLimit {
    type Output = RuntimeLimit;

    // `None` never stops, so it absorbs a conjunction.
    fn bitand(self, rhs: RuntimeLimit) -> RuntimeLimit {
        match (self, rhs) {
            (Self::None, _) | (_, Self::None) => Self::None,
            (Self::All(mut lhs), Self::All(rhs)) => {
                lhs.extend(rhs);
                Self::All(lhs)
            }
            (Self::All(mut lhs), other) => {
                lhs.push(other);
                Self::All(lhs)
            }
            (other, Self::All(mut rhs)) => {
                rhs.insert(0, other);
                Self::All(rhs)
            }
            (lhs, rhs) => Self::All(vec![lhs, rhs]),
        }
    }
}

impl Display for RuntimeLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "unbounded"),
            Self::EventCount(max) => write!(f, "events > {max}"),
            Self::SimTime(horizon) => write!(f, "time > {horizon}"),
            Self::All(parts) => write_joined(f, parts, "&"),
            Self::Any(parts) => write_joined(f, parts, "|"),
        }
    }
}

fn write_joined(
    f: &mut std::fmt::Formatter<'_>,
    parts: &[RuntimeLimit],
    sep: &str,
) -> std::fmt::Result {
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        match part {
            RuntimeLimit::All(_) | RuntimeLimit::Any(_) => write!(f, "({part})")?,
            _ => write!(f, "{part}")?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(v: f64) -> SimTime {
        SimTime::new(v)
    }

    #[test]
    fn single_limits() {
        assert!(!RuntimeLimit::None.exceeded(usize::MAX, SimTime::INFINITY));

        let events = RuntimeLimit::EventCount(3);
        assert!(!events.exceeded(3, t(1e9)));
        assert!(events.exceeded(4, t(0.0)));

        let time = RuntimeLimit::SimTime(t(10.0));
        assert!(!time.exceeded(1_000, t(10.0)), "the horizon is inclusive");
        assert!(time.exceeded(0, t(10.5)));
        assert!(time.exceeded(0, SimTime::INFINITY));
    }

    #[test]
    fn composition() {
        let any = RuntimeLimit::EventCount(3) | RuntimeLimit::SimTime(t(10.0));
        assert!(any.exceeded(4, t(1.0)));
        assert!(any.exceeded(1, t(11.0)));
        assert!(!any.exceeded(2, t(9.0)));

        let all = RuntimeLimit::EventCount(3) & RuntimeLimit::SimTime(t(10.0));
        assert!(!all.exceeded(4, t(1.0)));
        assert!(!all.exceeded(1, t(11.0)));
        assert!(all.exceeded(4, t(11.0)));

        assert_eq!(RuntimeLimit::None | RuntimeLimit::EventCount(1), RuntimeLimit::EventCount(1));
        assert_eq!(RuntimeLimit::None & RuntimeLimit::EventCount(1), RuntimeLimit::None);
        assert!(!RuntimeLimit::All(Vec::new()).exceeded(10, t(10.0)));
    }

    #[test]
    fn time_bounds() {
        assert_eq!(RuntimeLimit::None.time_bound(), None);
        assert_eq!(RuntimeLimit::EventCount(3).time_bound(), None);

        let any = RuntimeLimit::SimTime(t(5.0))
            | RuntimeLimit::EventCount(3)
            | RuntimeLimit::SimTime(t(2.0));
        assert_eq!(any.time_bound(), Some(t(2.0)));

        let all = RuntimeLimit::SimTime(t(5.0)) & RuntimeLimit::SimTime(t(2.0));
        assert_eq!(all.time_bound(), Some(t(5.0)));

        let all = RuntimeLimit::SimTime(t(5.0)) & RuntimeLimit::EventCount(3);
        assert_eq!(all.time_bound(), None);
        assert_eq!((all | RuntimeLimit::SimTime(t(9.0))).time_bound(), Some(t(9.0)));
    }

    #[test]
    fn flattening_and_display() {
        let limit = RuntimeLimit::EventCount(1)
            | RuntimeLimit::SimTime(t(2.0))
            | (RuntimeLimit::EventCount(5) & RuntimeLimit::SimTime(t(1.5)));
        assert!(matches!(&limit, RuntimeLimit::Any(parts) if parts.len() == 3));
        assert_eq!(
            limit.to_string(),
            "events > 1 | time > 2 | (events > 5 & time > 1.5)"
        );
        assert_eq!(RuntimeLimit::default().to_string(), "unbounded");
    }
}
