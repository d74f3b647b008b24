//! Admission refusals.

use serde::{Deserialize, Serialize};

/// Why a request was not admitted. A refusal is a normal answer that tells
/// the caller to back off and retry, not a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "bucket", rename_all = "kebab-case")]
pub enum Refusal {
    /// Not enough free memory
    #[error("memory: requested {requested_mb} MB, {available_mb} MB available")]
    Memory {
        /// Requested megabytes
        requested_mb: u64,
        /// Free megabytes
        available_mb: u64,
    },

    /// Every worker slot is taken
    #[error("workers: all {max} slots in use")]
    Workers {
        /// Slot budget
        max: usize,
    },

    /// A named connection pool cannot cover the request
    #[error("connection '{name}': requested {requested}, {available} available")]
    Connection {
        /// Pool name
        name: String,
        /// Requested connections
        requested: u32,
        /// Free connections
        available: u32,
    },

    /// The pool is shutting down
    #[error("pool is shutting down")]
    ShuttingDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusal_display() {
        let refusal = Refusal::Connection {
            name: "database".to_string(),
            requested: 2,
            available: 1,
        };
        assert_eq!(refusal.to_string(), "connection 'database': requested 2, 1 available");
        assert_eq!(Refusal::Workers { max: 2 }.to_string(), "workers: all 2 slots in use");
    }
}
