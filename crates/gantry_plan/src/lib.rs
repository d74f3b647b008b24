//! gantry execution planner
//!
//! Turns a pool of discovered tests into an ordered, optimized plan of
//! phases. A strategy decides which tests run and how they are grouped;
//! optimization then orders phases by dependency layer, merges phases of the
//! same type and clusters dependent tests so they are never scheduled apart.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod estimate;
pub mod filter;
pub mod optimize;
pub mod plan;
pub mod planner;
pub mod selection;
pub mod strategy;

pub use error::{PlanError, PlanResult};
pub use estimate::estimate_phase_ms;
pub use filter::{FilterSpec, TestFilter, filter_tests};
pub use optimize::{cluster_tests, optimize_phases};
pub use plan::{Phase, Plan, PlanSummary, TestGroup};
pub use planner::{ExecutionPlanner, PlanOptions};
pub use selection::{ChangeSet, SmartSelector, is_critical};
pub use strategy::{Strategy, StrategyContext};
