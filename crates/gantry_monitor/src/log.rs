//! Append-only JSON-lines logs.

use crate::error::{MonitorError, MonitorResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One JSON object per line, appended in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    /// Log at `path`; nothing is created until the first append
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, creating the file and its directory on demand
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be encoded or written
    pub fn append<T: Serialize>(&self, record: &T) -> MonitorResult<()> {
        let mut line = serde_json::to_string(record).map_err(|e| MonitorError::encoding(&self.path, e))?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::io(parent, e))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MonitorError::io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .map_err(|e| MonitorError::io(&self.path, e))
    }

    /// Append, logging a failure instead of returning it
    pub fn append_or_warn<T: Serialize>(&self, record: &T) {
        if let Err(err) = self.append(record) {
            tracing::warn!(error = %err, "monitor log write failed");
        }
    }

    /// Read every record back. A missing file reads as empty.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a line does not parse
    pub fn read_all<T: DeserializeOwned>(&self) -> MonitorResult<Vec<T>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(MonitorError::io(&self.path, err)),
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| MonitorError::encoding(&self.path, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        n: u32,
    }

    #[test]
    fn test_append_creates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonlLog::new(dir.path().join("logs/run.jsonl"));
        assert!(log.read_all::<Line>().unwrap().is_empty());

        log.append(&Line { n: 1 }).unwrap();
        log.append(&Line { n: 2 }).unwrap();
        let raw = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(raw, "{\"n\":1}\n{\"n\":2}\n");
        assert_eq!(log.read_all::<Line>().unwrap(), vec![Line { n: 1 }, Line { n: 2 }]);
    }

    #[test]
    fn test_append_or_warn_swallows_failure() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "x").unwrap();
        let log = JsonlLog::new(blocker.join("run.jsonl"));
        assert!(log.append(&Line { n: 1 }).is_err());
        log.append_or_warn(&Line { n: 1 });
    }
}
