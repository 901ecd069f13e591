//! Escalating process termination.
//!
//! Kill delivery is staged: SIGTERM, a bounded grace wait, then SIGKILL with
//! a short hard deadline. Liveness is checked with signal 0, where EPERM
//! means "alive but not ours".

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Termination timing knobs.
#[derive(Debug, Clone)]
pub struct TerminateConfig {
    /// Grace period after SIGTERM before escalating to SIGKILL.
    pub grace: Duration,
    /// Polling interval when waiting for the process to exit.
    pub poll_interval: Duration,
    /// Maximum wait for exit after SIGKILL.
    pub hard_deadline: Duration,
}

impl Default for TerminateConfig {
    fn default() -> Self {
        TerminateConfig {
            grace: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            hard_deadline: Duration::from_secs(2),
        }
    }
}

impl TerminateConfig {
    pub fn with_grace(grace: Duration) -> Self {
        TerminateConfig { grace, ..TerminateConfig::default() }
    }
}

/// How a termination attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// Exited during the SIGTERM grace window (or was already gone).
    Graceful,
    /// Needed SIGKILL and then exited.
    Forced,
    /// Survived SIGKILL past the hard deadline.
    StillRunning,
}

/// Check whether a pid is alive.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // Pids above i32::MAX would wrap negative and target a process group.
    if pid > i32::MAX as u32 {
        return false;
    }
    let result = unsafe { libc::kill(pid as i32, 0) };
    if result == 0 {
        return true;
    }
    let err = std::io::Error::last_os_error();
    // EPERM means the process exists but we can't signal it
    err.raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Send a signal, treating an already-gone process as success.
#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> std::io::Result<()> {
    let result = unsafe { libc::kill(pid as i32, signal) };
    if result == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

/// Wait for a process to exit, polling liveness until the timeout.
fn wait_exit(pid: u32, timeout: Duration, poll_interval: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_alive(pid) {
            return true;
        }
        thread::sleep(poll_interval);
    }
    !process_alive(pid)
}

/// Terminate a process with SIGTERM -> SIGKILL escalation.
///
/// Idempotent: a pid that is already dead returns `Graceful` immediately.
#[cfg(unix)]
pub fn terminate(pid: u32, config: &TerminateConfig) -> TerminateOutcome {
    if !process_alive(pid) {
        return TerminateOutcome::Graceful;
    }

    if let Err(err) = send_signal(pid, libc::SIGTERM) {
        warn!(pid, %err, "SIGTERM delivery failed");
    }
    if wait_exit(pid, config.grace, config.poll_interval) {
        debug!(pid, "process exited within grace period");
        return TerminateOutcome::Graceful;
    }

    if let Err(err) = send_signal(pid, libc::SIGKILL) {
        warn!(pid, %err, "SIGKILL delivery failed");
    }
    if wait_exit(pid, config.hard_deadline, config.poll_interval) {
        return TerminateOutcome::Forced;
    }

    warn!(pid, "process survived SIGKILL");
    TerminateOutcome::StillRunning
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32, _config: &TerminateConfig) -> TerminateOutcome {
    TerminateOutcome::StillRunning
}
