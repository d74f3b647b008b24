//! Events broadcast by the pool.

use crate::probe::MetricSample;
use gantry_core::{TicketId, Timestamp};
use serde::{Deserialize, Serialize};

/// A budget bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Bucket {
    /// Memory megabytes
    Memory,
    /// Worker slots
    Workers,
    /// A named connection pool
    Connection(String),
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => f.write_str("memory"),
            Self::Workers => f.write_str("workers"),
            Self::Connection(name) => write!(f, "connection:{}", name),
        }
    }
}

/// A bucket above its warning ratio at sampling time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceWarning {
    /// Bucket under pressure
    pub bucket: Bucket,
    /// Utilization at sampling time
    pub ratio: f64,
    /// Configured warning ratio
    pub threshold: f64,
    /// When it was observed
    pub timestamp: Timestamp,
}

/// Everything the pool reports to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ResourceEvent {
    /// Threshold crossed
    ResourceWarning(ResourceWarning),
    /// A cleanup callback failed; the release still completed
    CleanupError {
        /// Ticket being released, none for global cleanups
        ticket: Option<TicketId>,
        /// Callback error
        message: String,
    },
    /// Memory utilization after a release asked for reclamation
    ReclaimRequested {
        /// Utilization after the release
        memory_ratio: f64,
    },
    /// Periodic sample taken
    Sampled(MetricSample),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_display() {
        assert_eq!(Bucket::Memory.to_string(), "memory");
        assert_eq!(Bucket::Connection("http".to_string()).to_string(), "connection:http");
    }

    #[test]
    fn test_event_tag() {
        let event = ResourceEvent::ReclaimRequested { memory_ratio: 0.75 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "reclaim-requested");
    }
}
