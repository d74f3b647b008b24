//! Harness that runs each test as a child process.

use async_trait::async_trait;
use gantry_core::TestDescriptor;
use gantry_resource::peak_resident_mb;
use gantry_runtime::{TestHarness, TestOutcome};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Longest stderr excerpt kept in a failure message
const ERROR_EXCERPT: usize = 2_000;

/// How often a running child's peak RSS is read
const MEMORY_POLL: Duration = Duration::from_millis(50);

/// Runs `<program> <args...> <test file>`; exit status zero passes.
///
/// Memory is the child's peak resident set size as last seen in
/// `/proc/<pid>/status` before it exited. Children that exit between polls
/// report the last observed peak, and platforms without `/proc` report none.
#[derive(Debug, Clone)]
pub struct ProcessHarness {
    program: String,
    args: Vec<String>,
}

impl ProcessHarness {
    /// Split `command` on whitespace into program and leading arguments.
    /// `None` when the command is blank.
    pub fn parse(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }
}

#[async_trait]
impl TestHarness for ProcessHarness {
    async fn run_test(&self, test: &TestDescriptor) -> TestOutcome {
        let spawned = Command::new(&self.program)
            .args(&self.args)
            .arg(&test.file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let child = match spawned {
            Ok(child) => child,
            Err(err) => return TestOutcome::failed(format!("cannot spawn {}: {err}", self.program)),
        };

        let pid = child.id();
        let mut peak_mb: Option<f64> = None;
        let mut poll = tokio::time::interval(MEMORY_POLL);
        let output = child.wait_with_output();
        tokio::pin!(output);
        let output = loop {
            tokio::select! {
                output = &mut output => break output,
                _ = poll.tick() => {
                    if let Some(mb) = pid.and_then(peak_resident_mb) {
                        peak_mb = Some(peak_mb.map_or(mb, |seen| seen.max(mb)));
                    }
                }
            }
        };

        let outcome = match output {
            Ok(output) if output.status.success() => TestOutcome::passed(),
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let excerpt: String = stderr.trim().chars().take(ERROR_EXCERPT).collect();
                let status = output
                    .status
                    .code()
                    .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"));
                if excerpt.is_empty() {
                    TestOutcome::failed(status)
                } else {
                    TestOutcome::failed(format!("{status}: {excerpt}"))
                }
            }
            Err(err) => TestOutcome::failed(format!("{} failed: {err}", self.program)),
        };
        match peak_mb {
            Some(mb) => outcome.with_memory(mb),
            None => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::TestType;
    use gantry_monitor::TestStatus;

    fn test() -> TestDescriptor {
        TestDescriptor::new("t", "tests/unit/a.test.js", TestType::Unit)
    }

    #[test]
    fn test_parse_command() {
        let harness = ProcessHarness::parse("node --test").unwrap();
        assert_eq!(harness.program, "node");
        assert_eq!(harness.args, vec!["--test"]);
        assert!(ProcessHarness::parse("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_decides_outcome() {
        let pass = ProcessHarness::parse("true").unwrap();
        assert_eq!(pass.run_test(&test()).await.status, TestStatus::Passed);

        let fail = ProcessHarness::parse("false").unwrap();
        let outcome = fail.run_test(&test()).await;
        assert_eq!(outcome.status, TestStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("exit code 1"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_child_peak_memory_is_reported() {
        let harness = ProcessHarness::parse("sleep").unwrap();
        let nap = TestDescriptor::new("nap", "0.3", TestType::Unit);
        let outcome = harness.run_test(&nap).await;
        assert_eq!(outcome.status, TestStatus::Passed);
        assert!(outcome.memory_mb.is_some_and(|mb| mb > 0.0));
    }

    #[tokio::test]
    async fn test_missing_program_fails() {
        let harness = ProcessHarness::parse("gantry-no-such-program-xyz").unwrap();
        let outcome = harness.run_test(&test()).await;
        assert!(outcome.error.unwrap().starts_with("cannot spawn"));
    }
}
