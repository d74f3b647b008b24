//! Execution planner entry point.

use crate::error::PlanResult;
use crate::filter::{TestFilter, filter_tests};
use crate::optimize::optimize_phases;
use crate::plan::Plan;
use crate::selection::ChangeSet;
use crate::strategy::{Strategy, StrategyContext};
use gantry_core::{DependencyGraph, PlannerConfig, TestPool};
use std::path::PathBuf;

/// Per-call planning options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Strategy name, the configured default when unset
    pub strategy: Option<String>,
    /// Conjunctive filters applied before the strategy
    pub filters: Vec<TestFilter>,
    /// Changed files, consulted by smart selection
    pub changed_files: Vec<PathBuf>,
}

impl PlanOptions {
    /// Options using the configured defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a named strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Add a filter
    #[must_use]
    pub fn with_filter(mut self, filter: TestFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a changed file
    #[must_use]
    pub fn with_changed_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.changed_files.push(path.into());
        self
    }
}

/// Builds optimized plans from a test pool and its dependency graph
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
}

impl ExecutionPlanner {
    /// Create a planner
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Planner configuration
    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Filter, build phases with the chosen strategy and optimize.
    ///
    /// The strategy name is checked before filtering, so an unknown name is
    /// an error even when no test would survive the filters.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PlanError::InvalidStrategy`] for an unknown strategy name
    pub fn create_plan(
        &self,
        pool: &TestPool,
        graph: &DependencyGraph,
        options: &PlanOptions,
    ) -> PlanResult<Plan> {
        let name = options
            .strategy
            .as_deref()
            .unwrap_or(&self.config.default_strategy);
        let strategy: Strategy = name.parse()?;

        let tests = filter_tests(pool, &options.filters);
        if tests.is_empty() {
            tracing::info!(%strategy, pool = pool.len(), "no tests matched, empty plan");
            return Ok(Plan::empty(strategy));
        }

        let changes = ChangeSet::new(options.changed_files.iter().cloned());
        let ctx = StrategyContext {
            config: &self.config,
            changes: &changes,
        };
        let phases = optimize_phases(strategy.build_phases(&tests, &ctx), graph);
        let plan = Plan::new(strategy, phases);

        tracing::info!(
            %strategy,
            candidates = tests.len(),
            tests = plan.summary.total_tests,
            phases = plan.summary.phase_count,
            estimated_secs = plan.summary.estimated_duration_secs,
            "plan created"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use gantry_core::{TestDescriptor, TestType};

    fn pool(tests: Vec<TestDescriptor>) -> TestPool {
        tests.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    fn mixed() -> TestPool {
        pool(vec![
            TestDescriptor::new("u1", "tests/unit/a.test.js", TestType::Unit).with_estimated_ms(500),
            TestDescriptor::new("u2", "tests/unit/b.test.js", TestType::Unit).with_estimated_ms(500),
            TestDescriptor::new("i1", "tests/int/c.test.js", TestType::Integration).with_estimated_ms(2_000),
            TestDescriptor::new("e1", "tests/e2e/d.spec.js", TestType::E2e).with_estimated_ms(8_000),
        ])
    }

    #[test]
    fn test_default_strategy_is_fast_feedback() {
        let planner = ExecutionPlanner::default();
        let plan = planner
            .create_plan(&mixed(), &DependencyGraph::new(), &PlanOptions::new())
            .unwrap();
        assert_eq!(plan.strategy, Strategy::FastFeedback);
        assert_eq!(plan.summary.total_tests, 4);
        assert_eq!(plan.phases[0].phase_type, TestType::Unit);
    }

    #[test]
    fn test_invalid_strategy_even_when_filtered_empty() {
        let planner = ExecutionPlanner::default();
        let options = PlanOptions::new()
            .with_strategy("random")
            .with_filter(TestFilter::of_type(TestType::Database));
        let err = planner
            .create_plan(&mixed(), &DependencyGraph::new(), &options)
            .unwrap_err();
        assert!(matches!(err, PlanError::InvalidStrategy { .. }));
    }

    #[test]
    fn test_filtered_empty_gives_empty_plan() {
        let planner = ExecutionPlanner::default();
        let options = PlanOptions::new()
            .with_strategy("comprehensive")
            .with_filter(TestFilter::of_type(TestType::Database));
        let plan = planner
            .create_plan(&mixed(), &DependencyGraph::new(), &options)
            .unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.strategy, Strategy::Comprehensive);
        assert_eq!(plan.summary.total_tests, 0);
    }

    #[test]
    fn test_smart_selection_uses_changed_files() {
        let mut config = PlannerConfig::default();
        config.smart_selection.inclusion_probability = 0.0;
        let planner = ExecutionPlanner::new(config);
        let options = PlanOptions::new()
            .with_strategy("smart-selection")
            .with_changed_file("tests/int/c.test.js");
        let plan = planner
            .create_plan(&mixed(), &DependencyGraph::new(), &options)
            .unwrap();
        assert_eq!(plan.strategy, Strategy::SmartSelection);
        let ids: Vec<_> = plan.tests().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["i1"]);
    }
}
