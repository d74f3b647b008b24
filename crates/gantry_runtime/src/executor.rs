//! Phase executor.
//!
//! Consumes a plan top to bottom. Phases run strictly one after another.
//! Inside a parallel phase every dependency group is dispatched on its own
//! task, bounded by the worker budget, and runs its tests in order. A serial
//! phase runs one test at a time. Every test holds a pool reservation while
//! it runs and gives it back however it ends.

use crate::backoff::Backoff;
use crate::harness::{TestHarness, TestOutcome};
use gantry_core::{ExecutorConfig, TestDescriptor, TestId, TestType};
use gantry_monitor::{PhaseCompleted, TestCompleted, TestMonitor, TestStatus};
use gantry_plan::{Phase, Plan};
use gantry_resource::{Refusal, ResourcePool, ResourceRequest, Ticket};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Terminal result of one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    /// Test id
    pub test_id: TestId,
    /// Terminal status
    pub status: TestStatus,
    /// Time spent in the harness in ms
    pub duration_ms: u64,
    /// Failure or skip reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of one phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutcome {
    /// Phase name
    pub name: String,
    /// Phase type
    #[serde(rename = "type")]
    pub phase_type: TestType,
    /// Per-test results in plan order
    pub tests: Vec<TestRecord>,
    /// Passed tests
    pub passed: usize,
    /// Failed tests
    pub failed: usize,
    /// Tests never started
    pub skipped: usize,
    /// Wall time in ms
    pub duration_ms: u64,
    /// A failure in a fail-fast phase stopped further dispatch
    pub halted: bool,
}

impl PhaseOutcome {
    /// No test failed
    #[must_use]
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Result of a whole plan
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Phases that were entered, in order
    pub phases: Vec<PhaseOutcome>,
    /// The run was cancelled before it finished
    pub cancelled: bool,
}

impl RunOutcome {
    /// Passed tests across phases
    #[must_use]
    pub fn passed(&self) -> usize {
        self.phases.iter().map(|p| p.passed).sum()
    }

    /// Failed tests across phases
    #[must_use]
    pub fn failed(&self) -> usize {
        self.phases.iter().map(|p| p.failed).sum()
    }

    /// Skipped tests across phases
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.phases.iter().map(|p| p.skipped).sum()
    }

    /// Ran to the end without a failure
    #[must_use]
    pub fn success(&self) -> bool {
        !self.cancelled && self.phases.iter().all(PhaseOutcome::success)
    }
}

/// A held reservation, released on drop
struct Admission {
    pool: ResourcePool,
    ticket: Ticket,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.pool.release(&self.ticket);
    }
}

enum Admit {
    Admitted(Admission),
    Refused(String),
    Halted,
}

/// Runs plans against a pool, reporting to a monitor
#[derive(Clone)]
pub struct PhaseExecutor {
    pool: ResourcePool,
    monitor: Arc<TestMonitor>,
    config: Arc<ExecutorConfig>,
    token: CancellationToken,
}

impl std::fmt::Debug for PhaseExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseExecutor")
            .field("config", &self.config)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PhaseExecutor {
    /// Executor with its own cancellation token
    #[must_use]
    pub fn new(pool: ResourcePool, monitor: Arc<TestMonitor>, config: ExecutorConfig) -> Self {
        Self {
            pool,
            monitor,
            config: Arc::new(config),
            token: CancellationToken::new(),
        }
    }

    /// Use `token` for cancellation
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Token that stops new dispatches when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Run every phase in order. Cancellation stops dispatching; tests
    /// already running finish.
    pub async fn run(&self, plan: &Plan, harness: Arc<dyn TestHarness>) -> RunOutcome {
        let mut phases = Vec::with_capacity(plan.phases.len());
        for phase in &plan.phases {
            if self.token.is_cancelled() {
                break;
            }
            phases.push(self.run_phase(phase, Arc::clone(&harness)).await);
        }
        let outcome = RunOutcome {
            phases,
            cancelled: self.token.is_cancelled(),
        };
        tracing::info!(
            strategy = %plan.strategy,
            passed = outcome.passed(),
            failed = outcome.failed(),
            skipped = outcome.skipped(),
            cancelled = outcome.cancelled,
            "run finished"
        );
        outcome
    }

    /// Run one phase until every member reached a terminal status
    pub async fn run_phase(&self, phase: &Phase, harness: Arc<dyn TestHarness>) -> PhaseOutcome {
        let started = Instant::now();
        let ctx = Arc::new(PhaseRun {
            executor: self.clone(),
            phase: phase.name.clone(),
            fail_fast: !phase.continue_on_failure,
            halt: self.token.child_token(),
            harness,
        });
        let groups: Vec<Vec<TestDescriptor>> = phase
            .groups()
            .iter()
            .map(|group| group.tests.iter().filter_map(|id| phase.test(id).cloned()).collect())
            .collect();
        tracing::info!(
            phase = %phase.name,
            tests = phase.len(),
            groups = groups.len(),
            parallel = phase.parallel,
            "phase started"
        );

        let mut records = Vec::with_capacity(phase.len());
        if phase.parallel {
            let slots = Arc::new(Semaphore::new(self.pool.config().workers_max.max(1)));
            let mut set = JoinSet::new();
            for group in groups {
                let ctx = Arc::clone(&ctx);
                let slots = Arc::clone(&slots);
                set.spawn(async move {
                    // the semaphore is never closed
                    let _slot = slots.acquire_owned().await.ok();
                    ctx.run_group(group).await
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(group) => records.extend(group),
                    Err(err) => tracing::error!(phase = %phase.name, error = %err, "test group task failed"),
                }
            }
        } else {
            for group in groups {
                records.extend(ctx.run_group(group).await);
            }
        }

        // members lost with a crashed task still get a terminal status
        let seen: IndexSet<TestId> = records.iter().map(|r| r.test_id.clone()).collect();
        for test in phase.tests.iter().filter(|t| !seen.contains(&t.id)) {
            records.push(ctx.finish_unrun(test, TestOutcome::failed("test task aborted")));
        }
        records.sort_by_key(|r| phase.tests.iter().position(|t| t.id == r.test_id));

        let count = |status| records.iter().filter(|r| r.status == status).count();
        let (passed, failed, skipped) = (
            count(TestStatus::Passed),
            count(TestStatus::Failed),
            count(TestStatus::Skipped),
        );
        let duration_ms = started.elapsed().as_millis() as u64;
        self.monitor
            .publish(
                PhaseCompleted::new(&phase.name, passed, failed, duration_ms)
                    .with_type(phase.phase_type)
                    .with_skipped(skipped),
            );

        PhaseOutcome {
            name: phase.name.clone(),
            phase_type: phase.phase_type,
            tests: records,
            passed,
            failed,
            skipped,
            duration_ms,
            halted: ctx.halt.is_cancelled() && !self.token.is_cancelled(),
        }
    }

    /// Acquire the test's profile, backing off on refusal
    async fn admit(&self, test: &TestDescriptor, halt: &CancellationToken) -> Admit {
        let profile = self.config.profile_for(test.test_type);
        let mut backoff = Backoff::from_config(&self.config);
        loop {
            let refusal = match self.pool.acquire(ResourceRequest::from_profile(&profile)) {
                Ok(ticket) => {
                    return Admit::Admitted(Admission {
                        pool: self.pool.clone(),
                        ticket,
                    });
                }
                Err(_) if halt.is_cancelled() => return Admit::Halted,
                Err(Refusal::ShuttingDown) => return Admit::Refused(Refusal::ShuttingDown.to_string()),
                Err(refusal) => refusal,
            };
            let Some(delay) = backoff.next_delay() else {
                tracing::warn!(test = %test.id, attempts = backoff.attempts(), %refusal, "admission timed out");
                return Admit::Refused(refusal.to_string());
            };
            tokio::select! {
                () = halt.cancelled() => return Admit::Halted,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Shared state of one phase while it runs
struct PhaseRun {
    executor: PhaseExecutor,
    phase: String,
    fail_fast: bool,
    /// Cancelled by the run token or by a failure in a fail-fast phase
    halt: CancellationToken,
    harness: Arc<dyn TestHarness>,
}

impl PhaseRun {
    async fn run_group(&self, group: Vec<TestDescriptor>) -> Vec<TestRecord> {
        let mut records = Vec::with_capacity(group.len());
        for test in &group {
            let record = if self.halt.is_cancelled() {
                self.not_started(test)
            } else {
                self.run_test(test).await
            };
            if self.fail_fast && record.status == TestStatus::Failed {
                self.halt.cancel();
            }
            records.push(record);
        }
        records
    }

    async fn run_test(&self, test: &TestDescriptor) -> TestRecord {
        let admission = match self.executor.admit(test, &self.halt).await {
            Admit::Admitted(admission) => admission,
            Admit::Refused(reason) => {
                return self.finish_unrun(test, TestOutcome::failed(format!("admission failed: {reason}")));
            }
            Admit::Halted => return self.not_started(test),
        };
        tracing::debug!(test = %test.id, ticket = %admission.ticket.id, "test started");

        let started = Instant::now();
        let outcome = self.harness.run_test(test).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        drop(admission);
        self.finish(test, outcome, duration_ms)
    }

    fn not_started(&self, test: &TestDescriptor) -> TestRecord {
        let reason = if self.executor.token.is_cancelled() {
            "run cancelled"
        } else {
            "phase halted after a failure"
        };
        let mut outcome = TestOutcome::skipped();
        outcome.error = Some(reason.to_string());
        self.finish_unrun(test, outcome)
    }

    /// Terminal status for a test the harness never saw
    fn finish_unrun(&self, test: &TestDescriptor, outcome: TestOutcome) -> TestRecord {
        self.publish(test, outcome, 0, false)
    }

    /// Terminal status for a test the harness ran
    fn finish(&self, test: &TestDescriptor, outcome: TestOutcome, duration_ms: u64) -> TestRecord {
        self.publish(test, outcome, duration_ms, true)
    }

    /// Publish the terminal event and return the record
    fn publish(&self, test: &TestDescriptor, outcome: TestOutcome, duration_ms: u64, ran: bool) -> TestRecord {
        let record = TestRecord {
            test_id: test.id.clone(),
            status: outcome.status,
            duration_ms,
            error: outcome.error.clone(),
        };
        let mut event = TestCompleted::new(test.id.clone(), outcome.status, duration_ms)
            .with_type(test.test_type)
            .with_phase(&self.phase);
        event.error = outcome.error;
        event.memory_mb = outcome.memory_mb;
        event.ran = ran;
        self.executor.monitor.publish(event);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_core::{MonitorConfig, ResourceConfig};
    use gantry_plan::{Strategy, TestGroup};
    use indexmap::IndexMap;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockHarness {
        failing: IndexSet<String>,
        delay_ms: u64,
        running: AtomicUsize,
        peak: AtomicUsize,
        order: Mutex<Vec<String>>,
    }

    impl MockHarness {
        fn new(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                ..Self::default()
            }
        }

        fn failing(mut self, id: &str) -> Self {
            self.failing.insert(id.to_string());
            self
        }

        fn order(&self) -> Vec<String> {
            self.order.lock().clone()
        }
    }

    #[async_trait]
    impl TestHarness for MockHarness {
        async fn run_test(&self, test: &TestDescriptor) -> TestOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.order.lock().push(test.id.to_string());
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            if self.failing.contains(test.id.as_str()) {
                TestOutcome::failed("assertion failed")
            } else {
                TestOutcome::passed()
            }
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        pool: ResourcePool,
        monitor: Arc<TestMonitor>,
        executor: PhaseExecutor,
    }

    fn fixture(resources: ResourceConfig, executor: ExecutorConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let pool = ResourcePool::new(resources);
        let monitor = Arc::new(TestMonitor::new(MonitorConfig {
            output_dir: dir.path().to_path_buf(),
            ..MonitorConfig::default()
        }));
        let executor = PhaseExecutor::new(pool.clone(), Arc::clone(&monitor), executor);
        Fixture {
            _dir: dir,
            pool,
            monitor,
            executor,
        }
    }

    fn resources(workers_max: usize) -> ResourceConfig {
        ResourceConfig {
            memory_max_mb: 4_096,
            workers_max,
            ..ResourceConfig::default()
        }
    }

    fn units(ids: &[&str]) -> Vec<TestDescriptor> {
        ids.iter()
            .map(|id| TestDescriptor::new(*id, format!("tests/unit/{id}.test.js"), TestType::Unit))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_phase_bounded_by_workers() {
        let f = fixture(resources(2), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(100));
        let phase = Phase::new("Unit Tests", TestType::Unit, 1, units(&["a", "b", "c", "d", "e"]));

        let outcome = f.executor.run_phase(&phase, harness.clone()).await;
        assert_eq!(outcome.passed, 5);
        assert_eq!(harness.peak.load(Ordering::SeqCst), 2);
        assert_eq!(
            outcome.tests.iter().map(|r| r.test_id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c", "d", "e"]
        );
        let usage = f.pool.usage();
        assert_eq!(usage.outstanding, 0);
        assert_eq!(usage.budget.workers.used, 0);
        assert_eq!(f.monitor.summary().total_tests, 5);
        assert_eq!(f.monitor.summary().phases.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_serial_phase_runs_one_at_a_time() {
        let f = fixture(resources(8), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(50));
        let phase = Phase::new("E2E Tests", TestType::E2e, 3, units(&["x", "y", "z"])).serial();

        let outcome = f.executor.run_phase(&phase, harness.clone()).await;
        assert_eq!(outcome.passed, 3);
        assert_eq!(harness.peak.load(Ordering::SeqCst), 1);
        assert_eq!(harness.order(), vec!["x", "y", "z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_runs_dependencies_in_order() {
        let f = fixture(resources(8), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(10));
        let mut phase = Phase::new("Unit Tests", TestType::Unit, 1, units(&["dep", "user", "other"]));
        phase.test_groups = vec![
            TestGroup::new(vec!["dep".into(), "user".into()]),
            TestGroup::new(vec!["other".into()]),
        ];

        f.executor.run_phase(&phase, harness.clone()).await;
        let order = harness.order();
        let at = |id: &str| order.iter().position(|o| o == id).unwrap();
        assert!(at("dep") < at("user"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_stops_dispatch() {
        let f = fixture(resources(8), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(10).failing("b"));
        let phase = Phase::new("Unit Tests", TestType::Unit, 1, units(&["a", "b", "c", "d"]))
            .serial()
            .fail_fast();

        let outcome = f.executor.run_phase(&phase, harness.clone()).await;
        assert_eq!((outcome.passed, outcome.failed, outcome.skipped), (1, 1, 2));
        assert!(outcome.halted);
        assert_eq!(harness.order(), vec!["a", "b"]);
        let summary = f.monitor.summary();
        assert_eq!(summary.skipped_tests, 2);
        assert_eq!(summary.phases[0].test_count, 4);
        assert_eq!(summary.phases[0].skipped, 2);
        // halted members carry no timing
        assert_eq!(f.monitor.generate_report().performance.durations.count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_tolerant_phase_runs_everything() {
        let f = fixture(resources(8), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(10).failing("a").failing("c"));
        let phase = Phase::new("API Tests", TestType::Api, 2, units(&["a", "b", "c"]));

        let outcome = f.executor.run_phase(&phase, harness).await;
        assert_eq!((outcome.passed, outcome.failed, outcome.skipped), (1, 2, 0));
        assert!(!outcome.halted);
        assert!(!outcome.success());
        assert_eq!(f.monitor.alerts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admission_timeout_fails_test() {
        let mut profiles = IndexMap::new();
        profiles.insert("unit".to_string(), gantry_core::RequestProfile::memory(512));
        let executor = ExecutorConfig {
            profiles,
            admission_timeout_ms: 200,
            ..ExecutorConfig::default()
        };
        let f = fixture(
            ResourceConfig {
                memory_max_mb: 256,
                ..resources(4)
            },
            executor,
        );
        let harness = Arc::new(MockHarness::new(10));
        let phase = Phase::new("Unit Tests", TestType::Unit, 1, units(&["big"]));

        let outcome = f.executor.run_phase(&phase, harness.clone()).await;
        assert_eq!(outcome.failed, 1);
        let error = outcome.tests[0].error.as_deref().unwrap();
        assert!(error.starts_with("admission failed: memory"));
        assert!(harness.order().is_empty());
        let report = f.monitor.generate_report();
        assert_eq!(report.summary.failed_tests, 1);
        assert_eq!(report.performance.durations.count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_admission_retries_until_free() {
        let f = fixture(resources(1), ExecutorConfig::default());
        // hold the only worker slot for a while
        let held = f.pool.acquire(ResourceRequest::new(1)).unwrap();
        let pool = f.pool.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            pool.release(&held);
        });

        let harness = Arc::new(MockHarness::new(10));
        let phase = Phase::new("Unit Tests", TestType::Unit, 1, units(&["late"]));
        let outcome = f.executor.run_phase(&phase, harness).await;
        assert_eq!(outcome.passed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_dispatches_nothing() {
        let f = fixture(resources(2), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(10));
        let plan = Plan::new(
            Strategy::FastFeedback,
            vec![Phase::new("Unit Tests", TestType::Unit, 1, units(&["a"]))],
        );

        f.executor.cancellation_token().cancel();
        let outcome = f.executor.run(&plan, harness.clone()).await;
        assert!(outcome.cancelled);
        assert!(outcome.phases.is_empty());
        assert!(!outcome.success());
        assert!(harness.order().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_run_in_plan_order() {
        let f = fixture(resources(4), ExecutorConfig::default());
        let harness = Arc::new(MockHarness::new(20));
        let plan = Plan::new(
            Strategy::FastFeedback,
            vec![
                Phase::new("Unit Tests", TestType::Unit, 1, units(&["u1", "u2"])),
                Phase::new("E2E Tests", TestType::E2e, 3, units(&["e1"])).serial(),
            ],
        );

        let outcome = f.executor.run(&plan, harness.clone()).await;
        assert!(outcome.success());
        assert_eq!(outcome.passed(), 3);
        let order = harness.order();
        assert_eq!(order.last().map(String::as_str), Some("e1"));
        let phases = f.monitor.summary().phases;
        assert_eq!(phases.iter().map(|p| p.phase.as_str()).collect::<Vec<_>>(), vec!["Unit Tests", "E2E Tests"]);
    }
}
