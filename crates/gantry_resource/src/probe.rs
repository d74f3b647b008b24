//! Process statistics for the sampler.
//!
//! Linux values come from `/proc/self`; CPU times from `getrusage`. Fields a
//! platform cannot provide are reported as zero.

use gantry_core::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;

/// One point in the sampler history
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSample {
    /// When the sample was taken
    pub timestamp: Timestamp,
    /// Resident set size in MB
    pub resident_mb: f64,
    /// Data segment (heap) size in MB
    pub heap_mb: f64,
    /// Swapped out memory in MB
    pub swap_mb: f64,
    /// User CPU time in ms
    pub user_cpu_ms: u64,
    /// System CPU time in ms
    pub system_cpu_ms: u64,
    /// Time since the probe started in ms
    pub uptime_ms: u64,
    /// Open file descriptors
    pub open_handles: u64,
    /// Outstanding tickets
    pub active_requests: usize,
    /// Reserved memory over budget
    pub memory_ratio: f64,
    /// Used worker slots over budget
    pub workers_ratio: f64,
}

/// Reads process statistics
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    started: Instant,
}

impl Default for ProcessProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe {
    /// Start a probe; uptime counts from here
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Sample the process. Pool fields are left at zero for the caller.
    #[must_use]
    pub fn sample(&self) -> MetricSample {
        let status = std::fs::read_to_string("/proc/self/status").unwrap_or_default();
        let (user_cpu_ms, system_cpu_ms) = cpu_times_ms();
        MetricSample {
            timestamp: Timestamp::now(),
            resident_mb: status_field_mb(&status, "VmRSS:"),
            heap_mb: status_field_mb(&status, "VmData:"),
            swap_mb: status_field_mb(&status, "VmSwap:"),
            user_cpu_ms,
            system_cpu_ms,
            uptime_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            open_handles: count_entries(Path::new("/proc/self/fd")),
            ..MetricSample::default()
        }
    }
}

/// Peak resident set size of process `pid` in MB, read from
/// `/proc/<pid>/status`. `None` without `/proc` or once the process is reaped.
#[must_use]
pub fn peak_resident_mb(pid: u32) -> Option<f64> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let mb = status_field_mb(&status, "VmHWM:");
    (mb > 0.0).then_some(mb)
}

/// `VmRSS:    1234 kB` → megabytes
fn status_field_mb(status: &str, key: &str) -> f64 {
    status
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse::<u64>().ok())
        .map_or(0.0, |kb| kb as f64 / 1024.0)
}

fn count_entries(dir: &Path) -> u64 {
    std::fs::read_dir(dir).map_or(0, |entries| entries.count() as u64)
}

#[cfg(unix)]
fn cpu_times_ms() -> (u64, u64) {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage fills the struct on success and the buffer is
    // zero-initialized either way
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return (0, 0);
    }
    // SAFETY: zeroed rusage is a valid value and rc == 0 means it was written
    let usage = unsafe { usage.assume_init() };
    (timeval_ms(usage.ru_utime), timeval_ms(usage.ru_stime))
}

#[cfg(unix)]
fn timeval_ms(tv: libc::timeval) -> u64 {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u64::try_from(tv.tv_usec).unwrap_or(0);
    secs * 1_000 + micros / 1_000
}

#[cfg(not(unix))]
fn cpu_times_ms() -> (u64, u64) {
    (0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = "Name:\tgantry\nVmData:\t   20480 kB\nVmRSS:\t    5120 kB\nVmSwap:\t       0 kB\n";

    #[test]
    fn test_status_field_mb() {
        assert_eq!(status_field_mb(STATUS, "VmRSS:"), 5.0);
        assert_eq!(status_field_mb(STATUS, "VmData:"), 20.0);
        assert_eq!(status_field_mb(STATUS, "VmSwap:"), 0.0);
        assert_eq!(status_field_mb(STATUS, "VmHWM:"), 0.0);
    }

    #[test]
    fn test_sample_uptime_advances() {
        let probe = ProcessProbe::new();
        let first = probe.sample();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = probe.sample();
        assert!(second.uptime_ms >= first.uptime_ms);
        assert_eq!(second.active_requests, 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_sample_reads_proc() {
        let sample = ProcessProbe::new().sample();
        assert!(sample.resident_mb > 0.0);
        assert!(sample.open_handles > 0);
        assert!(peak_resident_mb(std::process::id()).is_some());
    }

    #[test]
    fn test_peak_of_missing_process() {
        assert_eq!(peak_resident_mb(u32::MAX), None);
    }
}
