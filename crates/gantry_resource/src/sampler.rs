//! Fixed-interval sampler task.

use crate::pool::{ResourcePool, Shared};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Handle to a running sampler
#[derive(Debug)]
pub(crate) struct Sampler {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Sampler {
    /// Spawn on the current Tokio runtime. The task holds a weak reference
    /// and ends on its own once the pool is dropped.
    pub(crate) fn spawn(shared: &Arc<Shared>, period: Duration) -> Self {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let weak: Weak<Shared> = Arc::downgrade(shared);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(shared) = weak.upgrade() else { break };
                        ResourcePool::from_shared(shared).sample_now();
                    }
                }
            }
            tracing::debug!("resource sampler stopped");
        });

        Self { token, handle }
    }

    /// Cancel and wait for the task to finish
    pub(crate) async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.handle.await {
            tracing::warn!(error = %err, "resource sampler task failed");
        }
    }
}
