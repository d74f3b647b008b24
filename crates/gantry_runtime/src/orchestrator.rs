//! Orchestrator context.
//!
//! Owns the planner, the resource pool and the monitor for one process.
//! Nothing here is global; callers hold the orchestrator and pass it around.

use crate::error::{RuntimeError, RuntimeResult};
use crate::executor::{PhaseExecutor, RunOutcome};
use crate::harness::TestHarness;
use gantry_core::{GantryConfig, TestInventory};
use gantry_monitor::{MonitoringReport, ResourceWarningEvent, TestMonitor};
use gantry_plan::{ExecutionPlanner, Plan, PlanOptions};
use gantry_resource::{ResourceEvent, ResourcePool};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    ShutDown,
}

/// Planner, pool and monitor wired together
pub struct Orchestrator {
    config: GantryConfig,
    planner: ExecutionPlanner,
    pool: ResourcePool,
    monitor: Arc<TestMonitor>,
    token: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("lifecycle", &*self.lifecycle.lock())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build every component from `config`
    #[must_use]
    pub fn new(config: GantryConfig) -> Self {
        Self {
            planner: ExecutionPlanner::new(config.planner.clone()),
            pool: ResourcePool::new(config.resources.clone()),
            monitor: Arc::new(TestMonitor::new(config.monitor.clone())),
            token: CancellationToken::new(),
            lifecycle: Mutex::new(Lifecycle::Created),
            forwarder: Mutex::new(None),
            config,
        }
    }

    /// Configuration in use
    #[must_use]
    pub fn config(&self) -> &GantryConfig {
        &self.config
    }

    /// The planner
    #[must_use]
    pub fn planner(&self) -> &ExecutionPlanner {
        &self.planner
    }

    /// The resource pool
    #[must_use]
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// The monitor
    #[must_use]
    pub fn monitor(&self) -> &Arc<TestMonitor> {
        &self.monitor
    }

    /// Token cancelling the current and any later run
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop dispatching new tests
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Start monitoring, the pool sampler and warning forwarding. Calling it
    /// again while running does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutDown`] after `shutdown`
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime
    pub fn start(&self) -> RuntimeResult<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::ShutDown => return Err(RuntimeError::ShutDown),
            Lifecycle::Running => return Ok(()),
            Lifecycle::Created => {}
        }
        self.monitor.start_monitoring();
        *self.forwarder.lock() = Some(self.spawn_forwarder());
        self.pool.start_sampling();
        *lifecycle = Lifecycle::Running;
        tracing::info!(
            workers = self.config.resources.workers_max,
            memory_mb = self.config.resources.memory_max_mb,
            "orchestrator started"
        );
        Ok(())
    }

    /// Relay pool threshold warnings into the monitor
    fn spawn_forwarder(&self) -> JoinHandle<()> {
        let mut events = self.pool.subscribe();
        let monitor = Arc::clone(&self.monitor);
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = token.cancelled() => break,
                    event = events.recv() => event,
                };
                match event {
                    Ok(ResourceEvent::ResourceWarning(warning)) => monitor.publish(ResourceWarningEvent::new(
                        warning.bucket.to_string(),
                        warning.ratio,
                        warning.threshold,
                    )),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "resource event forwarder lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Plan `inventory` with the given options
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Plan`] for an unknown strategy or bad filter
    pub fn plan(&self, inventory: &TestInventory, options: &PlanOptions) -> RuntimeResult<Plan> {
        let plan = self
            .planner
            .create_plan(&inventory.pool(), &inventory.dependencies, options)?;
        Ok(plan)
    }

    /// Execute `plan` with `harness`
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotStarted`] before `start` and
    /// [`RuntimeError::ShutDown`] after `shutdown`
    pub async fn run(&self, plan: &Plan, harness: Arc<dyn TestHarness>) -> RuntimeResult<RunOutcome> {
        let lifecycle = *self.lifecycle.lock();
        match lifecycle {
            Lifecycle::Created => return Err(RuntimeError::NotStarted),
            Lifecycle::ShutDown => return Err(RuntimeError::ShutDown),
            Lifecycle::Running => {}
        }
        let executor = PhaseExecutor::new(
            self.pool.clone(),
            Arc::clone(&self.monitor),
            self.config.executor.clone(),
        )
        .with_cancellation(self.token.clone());
        Ok(executor.run(plan, harness).await)
    }

    /// Cancel, force-release the pool, stop monitoring and return the final
    /// report. Later calls return a fresh report without side effects.
    pub async fn shutdown(&self) -> MonitoringReport {
        let was_running = {
            let mut lifecycle = self.lifecycle.lock();
            let was_running = *lifecycle == Lifecycle::Running;
            *lifecycle = Lifecycle::ShutDown;
            was_running
        };
        if !was_running {
            return self.monitor.generate_report();
        }

        self.token.cancel();
        let forwarder = self.forwarder.lock().take();
        if let Some(forwarder) = forwarder {
            if let Err(err) = forwarder.await {
                tracing::warn!(error = %err, "resource event forwarder failed");
            }
        }
        let released = self.pool.shutdown().await;
        let report = self.monitor.stop_monitoring();
        tracing::info!(
            released = released.released,
            cleanup_failures = released.cleanup_failures,
            tests = report.summary.total_tests,
            failed = report.summary.failed_tests,
            "orchestrator shut down"
        );
        report
    }
}
