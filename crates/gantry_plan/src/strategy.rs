//! Planning strategies.
//!
//! Each strategy turns the filtered tests into an unordered list of phases.
//! Ordering, merging and grouping happen afterwards in [`crate::optimize`].

use crate::error::PlanError;
use crate::plan::Phase;
use crate::selection::{ChangeSet, SmartSelector, is_critical};
use gantry_core::{PlannerConfig, TestDescriptor, TestType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Priority given to phases appended for otherwise uncovered test types
const REMAINDER_PRIORITY: u32 = 10;

/// Closed set of planning strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Unit, then integration/API, then E2E
    FastFeedback,
    /// Database → API → unit → integration → E2E → performance
    Comprehensive,
    /// Critical tests only
    Smoke,
    /// Quick unit tests, then performance tests
    Performance,
    /// Change-driven subset, planned as fast feedback
    SmartSelection,
}

/// Inputs a strategy may consult besides the tests
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    /// Planner configuration
    pub config: &'a PlannerConfig,
    /// Files of the change under test
    pub changes: &'a ChangeSet,
}

impl Strategy {
    /// Every strategy
    pub const ALL: [Strategy; 5] = [
        Strategy::FastFeedback,
        Strategy::Comprehensive,
        Strategy::Smoke,
        Strategy::Performance,
        Strategy::SmartSelection,
    ];

    /// Name used in options and configuration
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::FastFeedback => "fast-feedback",
            Self::Comprehensive => "comprehensive",
            Self::Smoke => "smoke",
            Self::Performance => "performance",
            Self::SmartSelection => "smart-selection",
        }
    }

    /// One line description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::FastFeedback => "unit tests first, then integration/API, then serial E2E",
            Self::Comprehensive => "full dependency chain from the data layer up to performance",
            Self::Smoke => "critical tests only, for cheap pre-merge gating",
            Self::Performance => "quick unit tests, then serial performance tests",
            Self::SmartSelection => "tests related to the changed files plus a random sample",
        }
    }

    /// Whether the strategy may leave filtered tests out of the plan
    #[must_use]
    pub const fn is_subset(&self) -> bool {
        matches!(self, Self::Smoke | Self::Performance | Self::SmartSelection)
    }

    /// Build the strategy's phases. Phases with no tests are not emitted.
    #[must_use]
    pub fn build_phases(&self, tests: &[TestDescriptor], ctx: &StrategyContext<'_>) -> Vec<Phase> {
        match self {
            Self::FastFeedback => fast_feedback(tests),
            Self::Comprehensive => comprehensive(tests),
            Self::Smoke => smoke(tests, ctx.config),
            Self::Performance => performance(tests, ctx.config),
            Self::SmartSelection => {
                let selector = SmartSelector::new(&ctx.config.critical_tests, &ctx.config.smart_selection);
                fast_feedback(&selector.select(tests, ctx.changes))
            }
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s.trim())
            .ok_or_else(|| PlanError::InvalidStrategy {
                name: s.to_string(),
                expected: Self::ALL.map(|st| st.name()).join(", "),
            })
    }
}

fn of_types(tests: &[TestDescriptor], types: &[TestType]) -> Vec<TestDescriptor> {
    tests
        .iter()
        .filter(|t| types.contains(&t.test_type))
        .cloned()
        .collect()
}

fn non_empty(phase: Phase) -> Option<Phase> {
    (!phase.is_empty()).then_some(phase)
}

/// One phase per test type not in `covered`, so no filtered test is dropped
fn remainder(tests: &[TestDescriptor], covered: &[TestType]) -> Vec<Phase> {
    TestType::ALL
        .into_iter()
        .filter(|t| !covered.contains(t))
        .zip(REMAINDER_PRIORITY..)
        .filter_map(|(test_type, priority)| {
            let phase = Phase::new(
                format!("{} Tests", test_type.label()),
                test_type,
                priority,
                of_types(tests, &[test_type]),
            );
            let phase = if matches!(test_type, TestType::E2e | TestType::Performance) {
                phase.serial()
            } else {
                phase
            };
            non_empty(phase)
        })
        .collect()
}

fn fast_feedback(tests: &[TestDescriptor]) -> Vec<Phase> {
    let named = [
        Phase::new("Unit Tests", TestType::Unit, 1, of_types(tests, &[TestType::Unit])).fail_fast(),
        Phase::new(
            "Integration Tests",
            TestType::Integration,
            2,
            of_types(tests, &[TestType::Integration, TestType::Api]),
        ),
        Phase::new("E2E Tests", TestType::E2e, 3, of_types(tests, &[TestType::E2e])).serial(),
    ];
    let covered = [TestType::Unit, TestType::Integration, TestType::Api, TestType::E2e];

    named
        .into_iter()
        .filter_map(non_empty)
        .chain(remainder(tests, &covered))
        .collect()
}

fn comprehensive(tests: &[TestDescriptor]) -> Vec<Phase> {
    let named = [
        Phase::new("Database Tests", TestType::Database, 1, of_types(tests, &[TestType::Database]))
            .serial()
            .fail_fast(),
        Phase::new("API Tests", TestType::Api, 2, of_types(tests, &[TestType::Api])).fail_fast(),
        Phase::new("Unit Tests", TestType::Unit, 3, of_types(tests, &[TestType::Unit])),
        Phase::new(
            "Integration Tests",
            TestType::Integration,
            4,
            of_types(tests, &[TestType::Integration]),
        ),
        Phase::new("E2E Tests", TestType::E2e, 5, of_types(tests, &[TestType::E2e])).serial(),
        Phase::new(
            "Performance Tests",
            TestType::Performance,
            6,
            of_types(tests, &[TestType::Performance]),
        )
        .serial(),
    ];
    let covered = [
        TestType::Database,
        TestType::Api,
        TestType::Unit,
        TestType::Integration,
        TestType::E2e,
        TestType::Performance,
    ];

    named
        .into_iter()
        .filter_map(non_empty)
        .chain(remainder(tests, &covered))
        .collect()
}

fn smoke(tests: &[TestDescriptor], config: &PlannerConfig) -> Vec<Phase> {
    let critical: Vec<_> = tests
        .iter()
        .filter(|t| is_critical(t, &config.critical_tests))
        .cloned()
        .collect();
    non_empty(Phase::new("Smoke Tests", TestType::Smoke, 1, critical).fail_fast())
        .into_iter()
        .collect()
}

fn performance(tests: &[TestDescriptor], config: &PlannerConfig) -> Vec<Phase> {
    let quick: Vec<_> = tests
        .iter()
        .filter(|t| t.test_type == TestType::Unit && t.estimated_ms() <= config.quick_test_ceiling_ms)
        .cloned()
        .collect();
    [
        Phase::new("Quick Unit Tests", TestType::Unit, 1, quick),
        Phase::new(
            "Performance Tests",
            TestType::Performance,
            2,
            of_types(tests, &[TestType::Performance]),
        )
        .serial()
        .fail_fast(),
    ]
    .into_iter()
    .filter_map(non_empty)
    .collect()
}
