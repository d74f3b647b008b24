//! Plans, phases and test groups.

use crate::estimate::estimate_phase_ms;
use crate::strategy::Strategy;
use gantry_core::{TestDescriptor, TestId, TestType, Timestamp};
use serde::{Deserialize, Serialize};

/// Tests that must be scheduled together because one depends on another.
/// Members are listed dependencies first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestGroup {
    /// Member test ids
    pub tests: Vec<TestId>,
}

impl TestGroup {
    /// Group holding the given ids
    #[must_use]
    pub fn new(tests: Vec<TestId>) -> Self {
        Self { tests }
    }

    /// Number of members
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the group has no members
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Whether `id` is a member
    #[must_use]
    pub fn contains(&self, id: &TestId) -> bool {
        self.tests.contains(id)
    }
}

/// A named batch of tests sharing a parallelism and failure policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    /// Display name ("Unit Tests")
    pub name: String,
    /// Ordering key
    #[serde(rename = "type")]
    pub phase_type: TestType,
    /// Tests selected for this phase
    pub tests: Vec<TestDescriptor>,
    /// Tie-break for ordering, lower first
    pub priority: u32,
    /// Whether tests may run concurrently
    pub parallel: bool,
    /// Whether a failing test lets the rest of the phase continue
    pub continue_on_failure: bool,
    /// Derived estimate in milliseconds
    #[serde(rename = "estimatedDuration")]
    pub estimated_duration_ms: u64,
    /// Dependency clusters, filled in by optimization
    #[serde(default)]
    pub test_groups: Vec<TestGroup>,
}

impl Phase {
    /// Create a parallel, fault-tolerant phase and estimate its duration
    #[must_use]
    pub fn new(name: impl Into<String>, phase_type: TestType, priority: u32, tests: Vec<TestDescriptor>) -> Self {
        let estimated_duration_ms = estimate_phase_ms(&tests);
        Self {
            name: name.into(),
            phase_type,
            tests,
            priority,
            parallel: true,
            continue_on_failure: true,
            estimated_duration_ms,
            test_groups: Vec::new(),
        }
    }

    /// Run tests one at a time
    #[must_use]
    pub fn serial(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Stop scheduling after the first failure
    #[must_use]
    pub fn fail_fast(mut self) -> Self {
        self.continue_on_failure = false;
        self
    }

    /// Number of tests
    #[must_use]
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Whether the phase has no tests
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Look a member up by id
    #[must_use]
    pub fn test(&self, id: &TestId) -> Option<&TestDescriptor> {
        self.tests.iter().find(|test| &test.id == id)
    }

    /// Groups in scheduling order, or one group per test if the phase was
    /// never optimized
    #[must_use]
    pub fn groups(&self) -> Vec<TestGroup> {
        if self.test_groups.is_empty() {
            self.tests
                .iter()
                .map(|test| TestGroup::new(vec![test.id.clone()]))
                .collect()
        } else {
            self.test_groups.clone()
        }
    }
}

/// Figures derived from a finished plan
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    /// Tests across all phases
    pub total_tests: usize,
    /// Sum of phase estimates in milliseconds
    pub estimated_duration_ms: u64,
    /// Sum of phase estimates in whole seconds
    pub estimated_duration_secs: u64,
    /// Number of phases
    pub phase_count: usize,
    /// Distinct test types present, in order of first appearance
    pub test_types: Vec<TestType>,
    /// Phases flagged parallel
    pub parallel_phases: usize,
}

impl PlanSummary {
    /// Summarize a list of phases
    #[must_use]
    pub fn of(phases: &[Phase]) -> Self {
        let estimated_duration_ms: u64 = phases.iter().map(|p| p.estimated_duration_ms).sum();
        let mut test_types = Vec::new();
        for test in phases.iter().flat_map(|p| p.tests.iter()) {
            if !test_types.contains(&test.test_type) {
                test_types.push(test.test_type);
            }
        }
        Self {
            total_tests: phases.iter().map(Phase::len).sum(),
            estimated_duration_ms,
            estimated_duration_secs: (estimated_duration_ms + 500) / 1_000,
            phase_count: phases.len(),
            test_types,
            parallel_phases: phases.iter().filter(|p| p.parallel).count(),
        }
    }
}

/// The ordered phases for one orchestration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Strategy that built the plan
    pub strategy: Strategy,
    /// Phases in execution order
    pub phases: Vec<Phase>,
    /// Derived summary
    pub summary: PlanSummary,
    /// When the plan was built
    pub created_at: Timestamp,
}

impl Plan {
    /// Assemble a plan and compute its summary
    #[must_use]
    pub fn new(strategy: Strategy, phases: Vec<Phase>) -> Self {
        let summary = PlanSummary::of(&phases);
        Self {
            strategy,
            phases,
            summary,
            created_at: Timestamp::now(),
        }
    }

    /// Plan with no phases
    #[must_use]
    pub fn empty(strategy: Strategy) -> Self {
        Self::new(strategy, Vec::new())
    }

    /// Whether the plan has no phases
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }

    /// Find a phase by name
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// All tests in execution order
    pub fn tests(&self) -> impl Iterator<Item = &TestDescriptor> {
        self.phases.iter().flat_map(|p| p.tests.iter())
    }
}
