//! The test monitor hub.
//!
//! Producers publish lifecycle events; each event is aggregated, logged and
//! checked against the alert rules before `publish` returns. Registered
//! handlers then run synchronously in registration order. Persistence
//! failures are logged and never reach the producer.

use crate::alert::{Alert, AlertDraft, AlertRules};
use crate::analysis::{DurationStats, PerformanceAnalysis, TrendRule, compare_benchmarks};
use crate::benchmarks::{BenchmarkStore, RunStats};
use crate::error::{MonitorError, MonitorResult};
use crate::event::{MonitorEvent, PerformanceIssue, PhaseCompleted, ResourceWarningEvent, TestCompleted};
use crate::log::JsonlLog;
use crate::metrics::{DurationSample, MetricsAggregator, MetricsSummary};
use crate::report::{MonitoringReport, MonitoringWindow};
use gantry_core::{AlertId, MonitorConfig, Timestamp};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Test execution log
pub const TEST_LOG: &str = "test-execution.jsonl";
/// Phase execution log
pub const PHASE_LOG: &str = "phase-execution.jsonl";
/// Alert log
pub const ALERT_LOG: &str = "alerts.jsonl";
/// Benchmark baselines
pub const BENCHMARKS_FILE: &str = "benchmarks.json";
/// Report written by `generate_report`
pub const REPORT_FILE: &str = "monitoring-report.json";

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    test_completed: Vec<Handler<TestCompleted>>,
    phase_completed: Vec<Handler<PhaseCompleted>>,
    resource_warning: Vec<Handler<ResourceWarningEvent>>,
    performance_issue: Vec<Handler<PerformanceIssue>>,
    alert: Vec<Handler<Alert>>,
}

struct MonitorState {
    metrics: MetricsAggregator,
    alerts: Vec<Alert>,
    next_alert: AlertId,
    benchmarks: BenchmarkStore,
    started_at: Option<Timestamp>,
    stopped_at: Option<Timestamp>,
    active: bool,
}

impl MonitorState {
    fn raise(&mut self, drafts: Vec<AlertDraft>) -> Vec<Alert> {
        drafts
            .into_iter()
            .map(|draft| {
                let alert = Alert::from_draft(self.next_alert, draft);
                self.next_alert = self.next_alert.next();
                self.alerts.push(alert.clone());
                alert
            })
            .collect()
    }
}

/// Publish/subscribe hub for test lifecycle events
pub struct TestMonitor {
    config: MonitorConfig,
    rules: AlertRules,
    trend: TrendRule,
    test_log: JsonlLog,
    phase_log: JsonlLog,
    alert_log: JsonlLog,
    state: Mutex<MonitorState>,
    handlers: RwLock<Handlers>,
}

impl std::fmt::Debug for TestMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestMonitor")
            .field("output_dir", &self.config.output_dir)
            .finish_non_exhaustive()
    }
}

impl TestMonitor {
    /// Monitor writing under `config.output_dir`
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        let dir = &config.output_dir;
        let state = MonitorState {
            metrics: MetricsAggregator::new(config.slow_test_limit, config.history_limit),
            alerts: Vec::new(),
            next_alert: AlertId::first(),
            benchmarks: BenchmarkStore::new(dir.join(BENCHMARKS_FILE)),
            started_at: None,
            stopped_at: None,
            active: false,
        };
        Self {
            rules: AlertRules::from_config(&config),
            trend: TrendRule::from_config(&config),
            test_log: JsonlLog::new(dir.join(TEST_LOG)),
            phase_log: JsonlLog::new(dir.join(PHASE_LOG)),
            alert_log: JsonlLog::new(dir.join(ALERT_LOG)),
            state: Mutex::new(state),
            handlers: RwLock::new(Handlers::default()),
            config,
        }
    }

    /// Monitor configuration
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run `handler` after every `test-completed` event
    pub fn on_test_completed(&self, handler: impl Fn(&TestCompleted) + Send + Sync + 'static) {
        self.handlers.write().test_completed.push(Arc::new(handler));
    }

    /// Run `handler` after every `phase-completed` event
    pub fn on_phase_completed(&self, handler: impl Fn(&PhaseCompleted) + Send + Sync + 'static) {
        self.handlers.write().phase_completed.push(Arc::new(handler));
    }

    /// Run `handler` after every `resource-warning` event
    pub fn on_resource_warning(&self, handler: impl Fn(&ResourceWarningEvent) + Send + Sync + 'static) {
        self.handlers.write().resource_warning.push(Arc::new(handler));
    }

    /// Run `handler` after every `performance-issue` event
    pub fn on_performance_issue(&self, handler: impl Fn(&PerformanceIssue) + Send + Sync + 'static) {
        self.handlers.write().performance_issue.push(Arc::new(handler));
    }

    /// Run `handler` for every raised alert
    pub fn on_alert(&self, handler: impl Fn(&Alert) + Send + Sync + 'static) {
        self.handlers.write().alert.push(Arc::new(handler));
    }

    /// Begin a monitoring window: prepare the output directory and load the
    /// stored benchmarks. Calling it while active does nothing.
    pub fn start_monitoring(&self) {
        let mut state = self.state.lock();
        if state.active {
            return;
        }
        if let Err(err) = std::fs::create_dir_all(&self.config.output_dir) {
            tracing::warn!(dir = %self.config.output_dir.display(), error = %err, "cannot create monitor output directory");
        }
        state.benchmarks = BenchmarkStore::load_or_default(self.config.output_dir.join(BENCHMARKS_FILE));
        state.started_at = Some(Timestamp::now());
        state.stopped_at = None;
        state.active = true;
        tracing::info!(
            dir = %self.config.output_dir.display(),
            baselines = state.benchmarks.baselines().len(),
            "monitoring started"
        );
    }

    /// Close the window: produce the final report, then fold this run into
    /// the benchmarks and rewrite `benchmarks.json`.
    pub fn stop_monitoring(&self) -> MonitoringReport {
        {
            let mut state = self.state.lock();
            if state.active {
                state.stopped_at = Some(Timestamp::now());
            }
        }
        let report = self.generate_report();

        let mut state = self.state.lock();
        if state.active {
            state.active = false;
            let run: IndexMap<_, _> = state
                .metrics
                .durations_by_type()
                .iter()
                .filter_map(|(t, d)| RunStats::of(d).map(|s| (*t, s)))
                .collect();
            state.benchmarks.merge_run(&run);
            if let Err(err) = state.benchmarks.save() {
                tracing::warn!(error = %err, "benchmark write failed");
            }
            tracing::info!(
                tests = state.metrics.summary().total_tests,
                alerts = state.alerts.len(),
                "monitoring stopped"
            );
        }
        report
    }

    /// Whether a monitoring window is open
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    /// Handle one event
    pub fn publish(&self, event: impl Into<MonitorEvent>) {
        match event.into() {
            MonitorEvent::TestCompleted(e) => self.test_completed(&e),
            MonitorEvent::PhaseCompleted(e) => self.phase_completed(&e),
            MonitorEvent::ResourceWarning(e) => self.resource_warning(&e),
            MonitorEvent::PerformanceIssue(e) => self.performance_issue(&e),
        }
    }

    fn test_completed(&self, event: &TestCompleted) {
        let alerts = {
            let mut state = self.state.lock();
            state.metrics.record_test(event);
            let drafts = self.rules.evaluate(event);
            state.raise(drafts)
        };
        self.test_log.append_or_warn(event);
        tracing::debug!(test = %event.test_id, status = %event.status, duration_ms = event.duration_ms, "test completed");

        let handlers = self.handlers.read().test_completed.clone();
        for handler in handlers {
            handler(event);
        }
        self.surface(&alerts);
    }

    fn phase_completed(&self, event: &PhaseCompleted) {
        self.state.lock().metrics.record_phase(event);
        self.phase_log.append_or_warn(event);
        tracing::info!(
            phase = %event.phase,
            passed = event.passed,
            failed = event.failed,
            duration_ms = event.duration_ms,
            "phase completed"
        );

        let handlers = self.handlers.read().phase_completed.clone();
        for handler in handlers {
            handler(event);
        }
    }

    fn resource_warning(&self, event: &ResourceWarningEvent) {
        let alerts = self.state.lock().raise(vec![AlertDraft::from(event)]);
        let handlers = self.handlers.read().resource_warning.clone();
        for handler in handlers {
            handler(event);
        }
        self.surface(&alerts);
    }

    fn performance_issue(&self, event: &PerformanceIssue) {
        let alerts = self.state.lock().raise(vec![AlertDraft::from(event)]);
        let handlers = self.handlers.read().performance_issue.clone();
        for handler in handlers {
            handler(event);
        }
        self.surface(&alerts);
    }

    /// Log and hand new alerts to alert handlers
    fn surface(&self, alerts: &[Alert]) {
        if alerts.is_empty() {
            return;
        }
        let handlers = self.handlers.read().alert.clone();
        for alert in alerts {
            tracing::warn!(id = %alert.id, kind = ?alert.kind, severity = ?alert.severity, "{}", alert.message);
            self.alert_log.append_or_warn(alert);
            for handler in &handlers {
                handler(alert);
            }
        }
    }

    /// Flag an alert resolved. Returns `false` for an unknown id.
    pub fn resolve_alert(&self, id: AlertId) -> bool {
        let mut state = self.state.lock();
        match state.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Every alert raised, resolved or not, in order
    #[must_use]
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().alerts.clone()
    }

    /// Current aggregated summary
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        self.state.lock().metrics.summary().clone()
    }

    /// Bounded duration history used for trends
    #[must_use]
    pub fn history(&self) -> Vec<DurationSample> {
        self.state.lock().metrics.history()
    }

    fn write_report(&self, report: &MonitoringReport) -> MonitorResult<()> {
        let path = self.config.output_dir.join(REPORT_FILE);
        let json = serde_json::to_string_pretty(report).map_err(|e| MonitorError::encoding(&path, e))?;
        std::fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| MonitorError::io(&self.config.output_dir, e))?;
        std::fs::write(&path, json).map_err(|e| MonitorError::io(&path, e))
    }

    /// Snapshot the current state and write `monitoring-report.json`
    pub fn generate_report(&self) -> MonitoringReport {
        let report = {
            let state = self.state.lock();
            let now = Timestamp::now();
            let duration_ms = state
                .started_at
                .map_or(0, |start| state.stopped_at.unwrap_or(now).millis_since(&start));
            let summary = state.metrics.summary().clone();
            MonitoringReport {
                generated_at: now,
                monitoring: MonitoringWindow {
                    started_at: state.started_at,
                    stopped_at: state.stopped_at,
                    duration_ms,
                },
                alerts: state.alerts.iter().filter(|a| !a.resolved).cloned().collect(),
                total_alerts: state.alerts.len(),
                performance: PerformanceAnalysis {
                    durations: DurationStats::of(state.metrics.durations()),
                    slow_tests: summary.slow_tests.clone(),
                    benchmarks: compare_benchmarks(
                        state.metrics.durations_by_type(),
                        &state.benchmarks,
                        self.config.regression_ratio,
                    ),
                },
                trend: self.trend.classify(&state.metrics.history()),
                summary,
            }
        };

        if let Err(err) = self.write_report(&report) {
            tracing::warn!(error = %err, "report write failed");
        }
        report
    }
}
