use crate::{runtime::ProcessId, stats::ConfigError, time::SimTime};
use std::{error::Error as StdError, fmt::Display};

/// An error that occurred while interacting with a simulation.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SimError {
    /// An event would have been scheduled before the current time,
    /// or at a time that is not a number.
    InvalidTime {
        /// The requested time.
        requested: SimTime,
        /// The clock when the request was made.
        now: SimTime,
    },
    /// A negative or NaN duration was passed to `sleep` or as a spawn delay.
    InvalidDuration(f64),
    /// A data collector was configured with an invalid metric mapping.
    Config(ConfigError),
    /// The given event handle was never issued by this simulator.
    UnknownHandle(u64),
    /// A release was requested by a process that does not hold the resource.
    NotHeld {
        /// The process that called release.
        process: ProcessId,
        /// The name of the resource.
        resource: String,
    },
    /// A facility was requested with a capacity below its minimum.
    InvalidCapacity(f64),
    /// A store operation was requested with an amount outside `(0, capacity]`.
    InvalidAmount(f64),
    /// The given process id was never issued by this simulator.
    UnknownProcess(ProcessId),
    /// A process-only operation was called outside of a running process.
    NoProcessContext,
    /// The simulator behind a context handle no longer exists.
    SimulatorDropped,
    /// One or more processes faulted during a run.
    ProcessFaults(Vec<ProcessFault>),
}

impl Display for SimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTime { requested, now } => {
                write!(f, "invalid event time {requested} (current time is {now})")
            }
            Self::InvalidDuration(d) => write!(f, "invalid duration {d}"),
            Self::Config(e) => write!(f, "invalid collector configuration: {e}"),
            Self::UnknownHandle(seq) => write!(f, "unknown event handle #{seq}"),
            Self::NotHeld { process, resource } => {
                write!(f, "{process} released resource '{resource}' without holding it")
            }
            Self::InvalidCapacity(c) => write!(f, "invalid capacity {c}"),
            Self::InvalidAmount(a) => write!(f, "invalid amount {a}"),
            Self::UnknownProcess(pid) => write!(f, "unknown process {pid}"),
            Self::NoProcessContext => write!(f, "operation requires a running process"),
            Self::SimulatorDropped => write!(f, "simulator no longer exists"),
            Self::ProcessFaults(faults) => {
                write!(f, "{} process fault(s)", faults.len())?;
                for fault in faults {
                    write!(f, "; {fault}")?;
                }
                Ok(())
            }
        }
    }
}

impl StdError for SimError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for SimError {
    fn from(err: ConfigError) -> Self {
        SimError::Config(err)
    }
}

///
/// A record of a process (or scheduled callback) that terminated
/// abnormally, either by returning an error or by panicking.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessFault {
    /// The faulting process, `None` for plain scheduled callbacks.
    pub process: Option<ProcessId>,
    /// The simulation time of the fault.
    pub time: SimTime,
    /// A rendered description of the fault.
    pub reason: String,
}

impl Display for ProcessFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.process {
            Some(pid) => write!(f, "{pid} at {}: {}", self.time, self.reason),
            None => write!(f, "callback at {}: {}", self.time, self.reason),
        }
    }
}
