//! Memory reclamation hook.

/// Asked to free memory after a release leaves utilization above the
/// configured ratio. Best effort; the pool never waits on the result.
pub trait Reclaimer: Send + Sync {
    /// Called with memory utilization after the release
    fn reclaim(&self, memory_ratio: f64);
}

/// Default reclaimer: records the request and nothing else
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReclaimer;

impl Reclaimer for LogReclaimer {
    fn reclaim(&self, memory_ratio: f64) {
        tracing::debug!(memory_ratio, "memory reclamation requested");
    }
}

impl<F> Reclaimer for F
where
    F: Fn(f64) + Send + Sync,
{
    fn reclaim(&self, memory_ratio: f64) {
        self(memory_ratio);
    }
}
