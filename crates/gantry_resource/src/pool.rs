//! The resource pool.
//!
//! `acquire` never blocks: it either admits the request against every bucket
//! at once or returns a [`Refusal`] and the caller backs off. Each call is a
//! single critical section over the budget counters.

use crate::budget::ResourceBudget;
use crate::error::Refusal;
use crate::event::{ResourceEvent, ResourceWarning};
use crate::probe::{MetricSample, ProcessProbe};
use crate::reclaim::{LogReclaimer, Reclaimer};
use crate::request::{Cleanup, ResourceRequest, Ticket};
use crate::sampler::Sampler;
use gantry_core::{ResourceConfig, TicketId, Timestamp};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// Point-in-time view of the budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Counters
    #[serde(flatten)]
    pub budget: ResourceBudget,
    /// Tickets not yet released
    pub outstanding: usize,
    /// Whether shutdown has begun
    pub shutting_down: bool,
}

/// Result of [`ResourcePool::shutdown`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Tickets force-released
    pub released: usize,
    /// Global cleanup tasks that failed
    pub cleanup_failures: usize,
}

struct Outstanding {
    ticket: Ticket,
    cleanups: Vec<Cleanup>,
}

struct PoolState {
    budget: ResourceBudget,
    outstanding: IndexMap<TicketId, Outstanding>,
    global_cleanups: Vec<Cleanup>,
    history: VecDeque<MetricSample>,
    shutting_down: bool,
}

pub(crate) struct Shared {
    config: ResourceConfig,
    state: Mutex<PoolState>,
    events: broadcast::Sender<ResourceEvent>,
    reclaimer: Box<dyn Reclaimer>,
    probe: ProcessProbe,
    sampler: Mutex<Option<Sampler>>,
}

/// Shared handle to the process-wide resource budget. Clones share state.
#[derive(Clone)]
pub struct ResourcePool {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}

impl ResourcePool {
    /// Pool with the logging reclaimer
    #[must_use]
    pub fn new(config: ResourceConfig) -> Self {
        Self::with_reclaimer(config, LogReclaimer)
    }

    /// Pool with a custom reclamation hook
    #[must_use]
    pub fn with_reclaimer(config: ResourceConfig, reclaimer: impl Reclaimer + 'static) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = PoolState {
            budget: ResourceBudget::from_config(&config),
            outstanding: IndexMap::new(),
            global_cleanups: Vec::new(),
            history: VecDeque::with_capacity(config.history_limit),
            shutting_down: false,
        };
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(state),
                events,
                reclaimer: Box::new(reclaimer),
                probe: ProcessProbe::new(),
                sampler: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Pool configuration
    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.shared.config
    }

    /// Receive pool events from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.shared.events.subscribe()
    }

    fn emit(&self, event: ResourceEvent) {
        // no subscribers is fine
        let _ = self.shared.events.send(event);
    }

    /// Admit the request against memory, one worker slot and every named
    /// connection it declares, all at once.
    ///
    /// # Errors
    ///
    /// Returns a [`Refusal`] naming the first bucket that cannot cover the
    /// request, or [`Refusal::ShuttingDown`]
    pub fn acquire(&self, request: ResourceRequest) -> Result<Ticket, Refusal> {
        let (reservation, cleanups) = request.into_parts();
        let mut state = self.shared.state.lock();
        if state.shutting_down {
            return Err(Refusal::ShuttingDown);
        }
        if let Err(refusal) = state.budget.check(&reservation) {
            tracing::debug!(%refusal, "resource request refused");
            return Err(refusal);
        }
        state.budget.reserve(&reservation);
        let ticket = Ticket::new(reservation);
        state.outstanding.insert(
            ticket.id,
            Outstanding {
                ticket: ticket.clone(),
                cleanups,
            },
        );
        tracing::trace!(ticket = %ticket.id, memory_mb = ticket.reservation.memory_mb, "resources acquired");
        Ok(ticket)
    }

    /// Give back what the ticket reserved and run its cleanups. Releasing an
    /// unknown or already released ticket does nothing and returns `false`.
    pub fn release(&self, ticket: &Ticket) -> bool {
        self.release_id(ticket.id)
    }

    fn release_id(&self, id: TicketId) -> bool {
        let (outstanding, memory_ratio) = {
            let mut state = self.shared.state.lock();
            let Some(outstanding) = state.outstanding.shift_remove(&id) else {
                return false;
            };
            // the pool's own record, never the caller's copy
            state.budget.restore(&outstanding.ticket.reservation);
            (outstanding, state.budget.memory.ratio())
        };

        self.run_cleanups(Some(id), outstanding.cleanups);

        if memory_ratio > self.shared.config.reclaim_ratio {
            self.shared.reclaimer.reclaim(memory_ratio);
            self.emit(ResourceEvent::ReclaimRequested { memory_ratio });
        }
        tracing::trace!(ticket = %id, "resources released");
        true
    }

    /// Run callbacks in order; failures are reported and skipped
    fn run_cleanups(&self, ticket: Option<TicketId>, cleanups: Vec<Cleanup>) -> usize {
        let mut failures = 0;
        for cleanup in cleanups {
            if let Err(err) = cleanup() {
                failures += 1;
                tracing::warn!(ticket = ?ticket.map(|t| t.to_string()), error = %err, "cleanup failed");
                self.emit(ResourceEvent::CleanupError {
                    ticket,
                    message: format!("{:#}", err),
                });
            }
        }
        failures
    }

    /// Attach a callback to an outstanding ticket. Returns `false` if the
    /// ticket was already released, in which case the callback is dropped.
    pub fn register_cleanup<F>(&self, ticket: &Ticket, cleanup: F) -> bool
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        match state.outstanding.get_mut(&ticket.id) {
            Some(outstanding) => {
                outstanding.cleanups.push(Box::new(cleanup));
                true
            }
            None => false,
        }
    }

    /// Register a task to run once at shutdown
    pub fn register_global_cleanup<F>(&self, cleanup: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.shared.state.lock().global_cleanups.push(Box::new(cleanup));
    }

    /// Current counters
    #[must_use]
    pub fn usage(&self) -> ResourceUsage {
        let state = self.shared.state.lock();
        ResourceUsage {
            budget: state.budget.clone(),
            outstanding: state.outstanding.len(),
            shutting_down: state.shutting_down,
        }
    }

    /// Tickets not yet released, oldest first
    #[must_use]
    pub fn outstanding(&self) -> Vec<Ticket> {
        let state = self.shared.state.lock();
        state.outstanding.values().map(|o| o.ticket.clone()).collect()
    }

    /// Sample history, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<MetricSample> {
        self.shared.state.lock().history.iter().cloned().collect()
    }

    /// Buckets currently above their warning ratio
    #[must_use]
    pub fn check_thresholds(&self) -> Vec<ResourceWarning> {
        let now = Timestamp::now();
        self.shared
            .state
            .lock()
            .budget
            .pressure(&self.shared.config)
            .into_iter()
            .map(|p| ResourceWarning {
                bucket: p.bucket,
                ratio: p.ratio,
                threshold: p.threshold,
                timestamp: now,
            })
            .collect()
    }

    /// Take one sample, append it to the bounded history and broadcast any
    /// threshold warnings
    pub fn sample_now(&self) -> MetricSample {
        let mut sample = self.shared.probe.sample();
        {
            let mut state = self.shared.state.lock();
            sample.active_requests = state.outstanding.len();
            sample.memory_ratio = state.budget.memory.ratio();
            sample.workers_ratio = state.budget.workers.ratio();
            state.history.push_back(sample.clone());
            while state.history.len() > self.shared.config.history_limit {
                state.history.pop_front();
            }
        }

        for warning in self.check_thresholds() {
            tracing::warn!(
                bucket = %warning.bucket,
                ratio = warning.ratio,
                threshold = warning.threshold,
                "resource threshold exceeded"
            );
            self.emit(ResourceEvent::ResourceWarning(warning));
        }
        self.emit(ResourceEvent::Sampled(sample.clone()));
        sample
    }

    /// Start the periodic sampler on the current Tokio runtime. Returns
    /// `false` if it is already running.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime
    pub fn start_sampling(&self) -> bool {
        let mut sampler = self.shared.sampler.lock();
        if sampler.is_some() {
            return false;
        }
        let period = Duration::from_millis(self.shared.config.sample_interval_ms.max(1));
        *sampler = Some(Sampler::spawn(&self.shared, period));
        tracing::debug!(period_ms = self.shared.config.sample_interval_ms, "resource sampler started");
        true
    }

    /// Refuse new requests, force-release every outstanding ticket, stop the
    /// sampler, run global cleanups and reset the counters.
    pub async fn shutdown(&self) -> ShutdownReport {
        let pending: Vec<TicketId> = {
            let mut state = self.shared.state.lock();
            state.shutting_down = true;
            state.outstanding.keys().copied().collect()
        };
        let released = pending.into_iter().filter(|id| self.release_id(*id)).count();

        let sampler = self.shared.sampler.lock().take();
        if let Some(sampler) = sampler {
            sampler.stop().await;
        }

        let globals = std::mem::take(&mut self.shared.state.lock().global_cleanups);
        let cleanup_failures = self.run_cleanups(None, globals);
        self.shared.state.lock().budget.reset();

        tracing::info!(released, cleanup_failures, "resource pool shut down");
        ShutdownReport {
            released,
            cleanup_failures,
        }
    }
}
