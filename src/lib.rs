#![allow(clippy::needless_doctest_main)]
//!
//! A process oriented discrete event simulation core.
//!
//! `dessim` advances a virtual clock by dispatching timestamped events,
//! multiplexes many cooperative processes over that clock, arbitrates
//! finite shared resources with FIFO queueing, and instruments all of
//! this with statistical collectors bound to simulated time.
//!
//! # Building a simple model
//!
//! Processes are plain `async` blocks. They suspend at the `.await` of a
//! [`sleep`](runtime::SimContext::sleep), a blocking
//! [`acquire`](sync::Resource::acquire) or a store operation, and the
//! [`Simulator`](runtime::Simulator) resumes them once simulated time has
//! advanced far enough.
//!
//! ```
//! use dessim::prelude::*;
//!
//! fn main() -> Result<(), SimError> {
//!     let mut sim = Simulator::new();
//!     let dc = sim.data_collector([
//!         (Metric::ServiceTimes, CollectorSpec::RunStats { all: false }),
//!         (Metric::InQueues, CollectorSpec::TimeSeries { all: true }),
//!     ])?;
//!     let server = sim.resource(1, Some(&dc))?;
//!
//!     for delay in [0.0, 1.0, 2.0] {
//!         let server = server.clone();
//!         sim.process_in(delay, move |ctx| async move {
//!             server.acquire().await?;
//!             ctx.sleep(4.0).await?;
//!             server.release()
//!         })?;
//!     }
//!
//!     sim.run(100.0)?;
//!     let report = dc.report(sim.now());
//!     assert_eq!(report.runstats(Metric::ServiceTimes).unwrap().mean, 4.0);
//!     Ok(())
//! }
//! ```
//!
//! Events with equal times are dispatched in the order they were
//! scheduled, so a model driven by a seeded random number generator
//! reproduces the same run bit for bit.
//!
//! # Features
//!
//! | Feature | Description                                                      |
//! |---------|------------------------------------------------------------------|
//! | serde   | Derives `Serialize` for reports and `Deserialize` for configs.   |
//! | yaml    | Adds [`DataCollector::from_yaml`](stats::DataCollector::from_yaml). |
//! | full    | All of the above (default).                                      |
//!

pub mod prelude;

pub mod logger;
pub mod runtime;
pub mod stats;
pub mod sync;
pub mod time;
