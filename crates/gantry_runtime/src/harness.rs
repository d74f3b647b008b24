//! The seam to whatever actually runs a test body.

use async_trait::async_trait;
use gantry_core::TestDescriptor;
use gantry_monitor::TestStatus;
use serde::{Deserialize, Serialize};

/// What the harness reports for one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Terminal status
    pub status: TestStatus,
    /// Failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Memory used by the test in MB, when measured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
}

impl TestOutcome {
    /// Passing outcome
    #[must_use]
    pub fn passed() -> Self {
        Self {
            status: TestStatus::Passed,
            error: None,
            memory_mb: None,
        }
    }

    /// Failing outcome with a message
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TestStatus::Failed,
            error: Some(error.into()),
            memory_mb: None,
        }
    }

    /// Skipped outcome
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            status: TestStatus::Skipped,
            error: None,
            memory_mb: None,
        }
    }

    /// Attach a memory measurement
    #[must_use]
    pub fn with_memory(mut self, memory_mb: f64) -> Self {
        self.memory_mb = Some(memory_mb);
        self
    }

    /// Whether the test failed
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status == TestStatus::Failed
    }
}

/// Runs a single test. Called only while the test holds its reservation.
#[async_trait]
pub trait TestHarness: Send + Sync {
    /// Run `test` to a terminal outcome
    async fn run_test(&self, test: &TestDescriptor) -> TestOutcome;
}
