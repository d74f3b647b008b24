//! Resource requests, reservations and tickets.

use gantry_core::{RequestProfile, TicketId, Timestamp};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Callback run when a ticket is released or the pool shuts down
pub type Cleanup = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// What a caller asks for before running one test
#[derive(Default)]
pub struct ResourceRequest {
    /// Memory in megabytes
    pub memory_mb: u64,
    /// Named connection counts
    pub connections: IndexMap<String, u32>,
    /// Advisory CPU share, tracked but never used for admission
    pub cpu: Option<f64>,
    /// Run on release
    pub cleanups: Vec<Cleanup>,
}

impl ResourceRequest {
    /// Request for `memory_mb` megabytes and one worker slot
    #[must_use]
    pub fn new(memory_mb: u64) -> Self {
        Self {
            memory_mb,
            ..Self::default()
        }
    }

    /// Request matching a configured per-type profile
    #[must_use]
    pub fn from_profile(profile: &RequestProfile) -> Self {
        Self {
            memory_mb: profile.memory_mb,
            connections: profile.connections.clone(),
            ..Self::default()
        }
    }

    /// Set memory
    #[must_use]
    pub fn with_memory(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }

    /// Ask for `count` connections from the named pool
    #[must_use]
    pub fn with_connection(mut self, name: impl Into<String>, count: u32) -> Self {
        *self.connections.entry(name.into()).or_insert(0) += count;
        self
    }

    /// Declare an advisory CPU share
    #[must_use]
    pub fn with_cpu(mut self, cpu: f64) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Register a callback for release
    #[must_use]
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.cleanups.push(Box::new(cleanup));
        self
    }

    /// Split into the counted part and the callbacks
    pub(crate) fn into_parts(self) -> (Reservation, Vec<Cleanup>) {
        let reservation = Reservation {
            memory_mb: self.memory_mb,
            workers: 1,
            connections: self.connections.into_iter().filter(|(_, n)| *n > 0).collect(),
            cpu: self.cpu.unwrap_or(0.0).max(0.0),
        };
        (reservation, self.cleanups)
    }
}

impl std::fmt::Debug for ResourceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRequest")
            .field("memory_mb", &self.memory_mb)
            .field("connections", &self.connections)
            .field("cpu", &self.cpu)
            .field("cleanups", &self.cleanups.len())
            .finish()
    }
}

/// Exactly what an admitted request took, so release can give it back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    /// Megabytes reserved
    pub memory_mb: u64,
    /// Worker slots reserved, always 1
    pub workers: usize,
    /// Connections reserved per pool
    pub connections: IndexMap<String, u32>,
    /// Advisory CPU share
    pub cpu: f64,
}

/// Receipt for an admitted request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique request id
    pub id: TicketId,
    /// Admission time
    pub acquired_at: Timestamp,
    /// What was reserved
    pub reservation: Reservation,
}

impl Ticket {
    pub(crate) fn new(reservation: Reservation) -> Self {
        Self {
            id: TicketId::new(),
            acquired_at: Timestamp::now(),
            reservation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builders() {
        let request = ResourceRequest::new(100)
            .with_connection("database", 1)
            .with_connection("database", 1)
            .with_cpu(0.5)
            .with_cleanup(|| Ok(()));
        assert_eq!(request.connections["database"], 2);
        assert_eq!(request.cleanups.len(), 1);

        let (reservation, cleanups) = request.into_parts();
        assert_eq!(reservation.workers, 1);
        assert_eq!(reservation.memory_mb, 100);
        assert_eq!(reservation.cpu, 0.5);
        assert_eq!(cleanups.len(), 1);
    }

    #[test]
    fn test_zero_connections_are_dropped() {
        let (reservation, _) = ResourceRequest::new(1).with_connection("http", 0).into_parts();
        assert!(reservation.connections.is_empty());
    }

    #[test]
    fn test_from_profile() {
        let profile = RequestProfile::memory(128).with_connection("http", 1);
        let request = ResourceRequest::from_profile(&profile);
        assert_eq!(request.memory_mb, 128);
        assert_eq!(request.connections["http"], 1);
    }
}
