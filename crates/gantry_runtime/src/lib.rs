//! gantry runtime
//!
//! The orchestrator context that owns planner, resource pool and monitor,
//! and the reference phase executor that runs a plan through a
//! [`TestHarness`] under admission control.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod error;
pub mod executor;
pub mod harness;
pub mod orchestrator;

pub use backoff::Backoff;
pub use error::{RuntimeError, RuntimeResult};
pub use executor::{PhaseExecutor, PhaseOutcome, RunOutcome, TestRecord};
pub use harness::{TestHarness, TestOutcome};
pub use orchestrator::Orchestrator;
