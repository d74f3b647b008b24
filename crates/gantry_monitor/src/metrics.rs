//! Running aggregates over completed tests and phases.

use crate::event::{PhaseCompleted, TestCompleted, TestStatus};
use gantry_core::{TestId, TestType, Timestamp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Counts for one test type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCounts {
    /// Completed tests
    pub total: u64,
    /// Passed tests
    pub passed: u64,
    /// Failed tests
    pub failed: u64,
    /// Summed duration in ms
    pub duration_ms: u64,
}

/// Entry of the slow test list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowTest {
    /// Test id
    pub test_id: TestId,
    /// Duration in ms
    pub duration_ms: u64,
    /// Type, when known
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<TestType>,
}

/// Phase level record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseMetrics {
    /// Phase name
    pub phase: String,
    /// Member tests, skipped ones included
    pub test_count: usize,
    /// Passed tests
    pub passed: usize,
    /// Failed tests
    pub failed: usize,
    /// Halted or cancelled tests
    #[serde(default)]
    pub skipped: usize,
    /// Wall time in ms
    pub duration_ms: u64,
}

/// One duration sample in the trend history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSample {
    /// When the test completed
    pub timestamp: Timestamp,
    /// Duration in ms
    pub duration_ms: u64,
}

/// Aggregated summary of the run so far
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    /// Completed tests
    pub total_tests: u64,
    /// Passed tests
    pub passed_tests: u64,
    /// Failed tests
    pub failed_tests: u64,
    /// Skipped tests
    pub skipped_tests: u64,
    /// Summed test duration in ms
    pub total_duration_ms: u64,
    /// Counts per type
    pub by_type: IndexMap<TestType, TypeCounts>,
    /// Slowest tests, slowest first
    pub slow_tests: Vec<SlowTest>,
    /// Completed phases in order
    pub phases: Vec<PhaseMetrics>,
}

impl MetricsSummary {
    /// Passed over completed, 1.0 when nothing ran
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_tests == 0 {
            return 1.0;
        }
        self.passed_tests as f64 / self.total_tests as f64
    }
}

/// Aggregator fed by the monitor
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    summary: MetricsSummary,
    /// Every observed duration, for percentiles
    durations: Vec<u64>,
    /// Durations per type, for benchmarks
    durations_by_type: IndexMap<TestType, Vec<u64>>,
    history: VecDeque<DurationSample>,
    slow_test_limit: usize,
    history_limit: usize,
}

impl MetricsAggregator {
    /// Aggregator keeping `slow_test_limit` slow tests and `history_limit`
    /// trend samples
    #[must_use]
    pub fn new(slow_test_limit: usize, history_limit: usize) -> Self {
        Self {
            summary: MetricsSummary::default(),
            durations: Vec::new(),
            durations_by_type: IndexMap::new(),
            history: VecDeque::with_capacity(history_limit),
            slow_test_limit,
            history_limit,
        }
    }

    /// Fold in a completed test
    pub fn record_test(&mut self, event: &TestCompleted) {
        let s = &mut self.summary;
        s.total_tests += 1;
        s.total_duration_ms += event.duration_ms;
        match event.status {
            TestStatus::Passed => s.passed_tests += 1,
            TestStatus::Failed => s.failed_tests += 1,
            TestStatus::Skipped => s.skipped_tests += 1,
        }

        if let Some(test_type) = event.test_type {
            let counts = s.by_type.entry(test_type).or_default();
            counts.total += 1;
            counts.duration_ms += event.duration_ms;
            match event.status {
                TestStatus::Passed => counts.passed += 1,
                TestStatus::Failed => counts.failed += 1,
                TestStatus::Skipped => {}
            }
        }

        // timing statistics only see tests the harness actually ran
        if !event.is_measured() {
            return;
        }
        if let Some(test_type) = event.test_type {
            self.durations_by_type
                .entry(test_type)
                .or_default()
                .push(event.duration_ms);
        }

        self.track_slow(event);

        self.durations.push(event.duration_ms);
        self.history.push_back(DurationSample {
            timestamp: event.timestamp,
            duration_ms: event.duration_ms,
        });
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }

    /// Keep the top-N list sorted slowest first
    fn track_slow(&mut self, event: &TestCompleted) {
        let slow = &mut self.summary.slow_tests;
        if self.slow_test_limit == 0 {
            return;
        }
        if slow.len() == self.slow_test_limit
            && slow.last().is_some_and(|last| last.duration_ms >= event.duration_ms)
        {
            return;
        }
        let at = slow.partition_point(|s| s.duration_ms >= event.duration_ms);
        slow.insert(
            at,
            SlowTest {
                test_id: event.test_id.clone(),
                duration_ms: event.duration_ms,
                test_type: event.test_type,
            },
        );
        slow.truncate(self.slow_test_limit);
    }

    /// Fold in a completed phase
    pub fn record_phase(&mut self, event: &PhaseCompleted) {
        self.summary.phases.push(PhaseMetrics {
            phase: event.phase.clone(),
            test_count: event.test_count,
            passed: event.passed,
            failed: event.failed,
            skipped: event.skipped,
            duration_ms: event.duration_ms,
        });
    }

    /// Current summary
    #[must_use]
    pub fn summary(&self) -> &MetricsSummary {
        &self.summary
    }

    /// Every observed duration in arrival order
    #[must_use]
    pub fn durations(&self) -> &[u64] {
        &self.durations
    }

    /// Observed durations per type
    #[must_use]
    pub fn durations_by_type(&self) -> &IndexMap<TestType, Vec<u64>> {
        &self.durations_by_type
    }

    /// Bounded trend history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<DurationSample> {
        self.history.iter().copied().collect()
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::new(self.slow_test_limit, self.history_limit);
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(10, 100)
    }
}
