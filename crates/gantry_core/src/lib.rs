//! gantry core types
//!
//! Shared data model for the test orchestration engine: discovered test
//! descriptors, the dependency graph, identifiers, timestamps and the layered
//! configuration every other crate reads.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod descriptor;
pub mod error;
pub mod id;
pub mod inventory;
pub mod time;

// Re-exports
pub use config::{
    ExecutorConfig, GantryConfig, MonitorConfig, PlannerConfig, RequestProfile, ResourceConfig,
    SmartSelectionConfig,
};
pub use descriptor::{DEFAULT_ESTIMATED_MS, TestDescriptor, TestType};
pub use error::{CoreError, CoreResult};
pub use id::{AlertId, RunId, TestId, TicketId};
pub use inventory::{DependencyGraph, TestInventory, TestPool};
pub use time::Timestamp;
