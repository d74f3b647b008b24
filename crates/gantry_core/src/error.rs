//! Core error types for gantry.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid encoding (JSON or TOML)
    InvalidEncoding { reason: String },

    /// Invalid configuration value
    Config { field: String, reason: String },

    /// Validation error
    Validation { field: String, reason: String },

    /// Already exists
    AlreadyExists { kind: String, id: String },

    /// Filesystem failure
    Io { path: String, reason: String },
}

impl CoreError {
    /// Build an io error that remembers the path it was about
    #[must_use]
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        }
    }

    /// Build a configuration error
    #[must_use]
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { reason } => write!(f, "Invalid encoding: {}", reason),
            Self::Config { field, reason } => {
                write!(f, "Invalid configuration for {}: {}", field, reason)
            }
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
            Self::AlreadyExists { kind, id } => write!(f, "{} already exists: {}", kind, id),
            Self::Io { path, reason } => write!(f, "IO error on {}: {}", path, reason),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: "<unknown>".to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::AlreadyExists {
            kind: "Test".to_string(),
            id: "unit-1".to_string(),
        };
        assert_eq!(format!("{}", err), "Test already exists: unit-1");

        let err = CoreError::config("resources.workers_max", "must be at least 1");
        assert_eq!(
            format!("{}", err),
            "Invalid configuration for resources.workers_max: must be at least 1"
        );
    }

    #[test]
    fn test_io_error_keeps_path() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = CoreError::io("/tmp/tests.json", &io);
        let s = format!("{}", err);
        assert!(s.contains("/tmp/tests.json"));
        assert!(s.contains("missing"));
    }

    #[test]
    fn test_json_error_converts() {
        let err: CoreError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, CoreError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::config("workers_max", "must be positive");
        let err2 = CoreError::config("workers_max", "must be positive");
        assert_eq!(err1, err2);
        assert_ne!(err1, CoreError::config("a", "b"));
    }
}
