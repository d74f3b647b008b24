//! Lifecycle events published by the phase executor.

use gantry_core::{TestId, TestType, Timestamp};
use serde::{Deserialize, Serialize};

/// Terminal status of one test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Test passed
    Passed,
    /// Test failed
    Failed,
    /// Test did not run
    Skipped,
}

impl TestStatus {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test reached a terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCompleted {
    /// Test id
    pub test_id: TestId,
    /// Test type, when known
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<TestType>,
    /// Phase the test ran in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Outcome
    pub status: TestStatus,
    /// Wall time in ms
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Memory used by the test in MB
    #[serde(rename = "memory", default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    /// Whether the harness ran the test. False for admission failures.
    #[serde(default = "ran_default", skip_serializing_if = "is_true")]
    pub ran: bool,
    /// When it completed
    pub timestamp: Timestamp,
}

fn ran_default() -> bool {
    true
}

fn is_true(value: &bool) -> bool {
    *value
}

impl TestCompleted {
    /// Completion record stamped now
    #[must_use]
    pub fn new(test_id: impl Into<TestId>, status: TestStatus, duration_ms: u64) -> Self {
        Self {
            test_id: test_id.into(),
            test_type: None,
            phase: None,
            status,
            duration_ms,
            error: None,
            memory_mb: None,
            ran: true,
            timestamp: Timestamp::now(),
        }
    }

    /// Passed test
    #[must_use]
    pub fn passed(test_id: impl Into<TestId>, duration_ms: u64) -> Self {
        Self::new(test_id, TestStatus::Passed, duration_ms)
    }

    /// Failed test
    #[must_use]
    pub fn failed(test_id: impl Into<TestId>, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(test_id, TestStatus::Failed, duration_ms)
        }
    }

    /// Set the type
    #[must_use]
    pub fn with_type(mut self, test_type: TestType) -> Self {
        self.test_type = Some(test_type);
        self
    }

    /// Set the phase
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Set memory
    #[must_use]
    pub fn with_memory(mut self, memory_mb: f64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Mark the test as never handed to the harness
    #[must_use]
    pub fn not_run(mut self) -> Self {
        self.ran = false;
        self
    }

    /// Whether `duration_ms` is a real observation. Skipped tests and tests
    /// that were never admitted carry no timing.
    #[must_use]
    pub fn is_measured(&self) -> bool {
        self.ran && self.status != TestStatus::Skipped
    }
}

/// A phase finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseCompleted {
    /// Phase name
    pub phase: String,
    /// Phase type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub phase_type: Option<TestType>,
    /// Member tests, skipped ones included
    pub test_count: usize,
    /// Passed tests
    pub passed: usize,
    /// Failed tests
    pub failed: usize,
    /// Tests halted or cancelled before running
    #[serde(default)]
    pub skipped: usize,
    /// Wall time in ms
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    /// When it completed
    pub timestamp: Timestamp,
}

impl PhaseCompleted {
    /// Completion record stamped now
    #[must_use]
    pub fn new(phase: impl Into<String>, passed: usize, failed: usize, duration_ms: u64) -> Self {
        Self {
            phase: phase.into(),
            phase_type: None,
            test_count: passed + failed,
            passed,
            failed,
            skipped: 0,
            duration_ms,
            timestamp: Timestamp::now(),
        }
    }

    /// Set the phase type
    #[must_use]
    pub fn with_type(mut self, phase_type: TestType) -> Self {
        self.phase_type = Some(phase_type);
        self
    }

    /// Count members that never ran
    #[must_use]
    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped = skipped;
        self.test_count = self.passed + self.failed + skipped;
        self
    }
}

/// A resource bucket crossed its warning ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceWarningEvent {
    /// Bucket name (`memory`, `workers`, `connection:database`)
    pub resource: String,
    /// Observed utilization
    pub ratio: f64,
    /// Configured threshold
    pub threshold: f64,
    /// When it was observed
    pub timestamp: Timestamp,
}

impl ResourceWarningEvent {
    /// Warning stamped now
    #[must_use]
    pub fn new(resource: impl Into<String>, ratio: f64, threshold: f64) -> Self {
        Self {
            resource: resource.into(),
            ratio,
            threshold,
            timestamp: Timestamp::now(),
        }
    }
}

/// A measured value exceeded an expectation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceIssue {
    /// Test concerned, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<TestId>,
    /// What was measured
    pub metric: String,
    /// Observed value
    pub value: f64,
    /// Expected bound
    pub threshold: f64,
    /// When it was observed
    pub timestamp: Timestamp,
}

impl PerformanceIssue {
    /// Issue stamped now
    #[must_use]
    pub fn new(metric: impl Into<String>, value: f64, threshold: f64) -> Self {
        Self {
            test_id: None,
            metric: metric.into(),
            value,
            threshold,
            timestamp: Timestamp::now(),
        }
    }

    /// Attach a test
    #[must_use]
    pub fn for_test(mut self, test_id: impl Into<TestId>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }
}

/// Every event the monitor consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum MonitorEvent {
    /// `test-completed`
    TestCompleted(TestCompleted),
    /// `phase-completed`
    PhaseCompleted(PhaseCompleted),
    /// `resource-warning`
    ResourceWarning(ResourceWarningEvent),
    /// `performance-issue`
    PerformanceIssue(PerformanceIssue),
}

impl MonitorEvent {
    /// Event name as published
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TestCompleted(_) => "test-completed",
            Self::PhaseCompleted(_) => "phase-completed",
            Self::ResourceWarning(_) => "resource-warning",
            Self::PerformanceIssue(_) => "performance-issue",
        }
    }
}

impl From<TestCompleted> for MonitorEvent {
    fn from(event: TestCompleted) -> Self {
        Self::TestCompleted(event)
    }
}

impl From<PhaseCompleted> for MonitorEvent {
    fn from(event: PhaseCompleted) -> Self {
        Self::PhaseCompleted(event)
    }
}

impl From<ResourceWarningEvent> for MonitorEvent {
    fn from(event: ResourceWarningEvent) -> Self {
        Self::ResourceWarning(event)
    }
}

impl From<PerformanceIssue> for MonitorEvent {
    fn from(event: PerformanceIssue) -> Self {
        Self::PerformanceIssue(event)
    }
}
