//! gantry resource pool
//!
//! Process-wide admission control for concurrently running tests. A test
//! reserves memory, one worker slot and any named connections before it runs
//! and gives them back afterwards. The pool never blocks: a request that does
//! not fit is refused and the caller retries later.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod budget;
pub mod error;
pub mod event;
pub mod pool;
pub mod probe;
pub mod reclaim;
pub mod request;
mod sampler;

pub use budget::{Gauge, Pressure, ResourceBudget};
pub use error::Refusal;
pub use event::{Bucket, ResourceEvent, ResourceWarning};
pub use pool::{ResourcePool, ResourceUsage, ShutdownReport};
pub use probe::{MetricSample, ProcessProbe, peak_resident_mb};
pub use reclaim::{LogReclaimer, Reclaimer};
pub use request::{Cleanup, Reservation, ResourceRequest, Ticket};
