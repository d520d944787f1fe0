//!
//! Convenience re-export of common members.
//!

pub use crate::time::SimTime;

pub use crate::runtime::Builder;
pub use crate::runtime::EventHandle;
pub use crate::runtime::ProcessFault;
pub use crate::runtime::ProcessHandle;
pub use crate::runtime::ProcessId;
pub use crate::runtime::ProcessState;
pub use crate::runtime::RunSummary;
pub use crate::runtime::RuntimeLimit;
pub use crate::runtime::SimContext;
pub use crate::runtime::SimError;
pub use crate::runtime::Simulator;
pub use crate::runtime::UnwindBehaviour;
pub use crate::runtime::When;

pub use crate::sync::Resource;
pub use crate::sync::Store;

pub use crate::stats::CollectorSpec;
pub use crate::stats::ConfigError;
pub use crate::stats::DataCollector;
pub use crate::stats::Metric;
pub use crate::stats::Report;
pub use crate::stats::Statistic;
