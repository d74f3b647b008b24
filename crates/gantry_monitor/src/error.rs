//! Monitor errors.
//!
//! Only explicit persistence calls return these. Event handling logs and
//! swallows them.

use std::path::PathBuf;

/// Result type for persistence calls
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Persistence failures
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Filesystem failure
    #[error("io error at {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failure
    #[error("encoding error in {path}: {source}")]
    Encoding {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_json::Error,
    },
}

impl MonitorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn encoding(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Encoding {
            path: path.into(),
            source,
        }
    }
}
