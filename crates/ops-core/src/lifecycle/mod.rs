//! Process lifecycle controller.
//!
//! Drives a managed backend through absent -> starting -> healthy ->
//! stopping -> absent. Every kill decision goes through the ownership
//! allowlist: an owner whose command line does not carry both configured
//! fragments is never terminated without an explicit force override.

pub mod record;
pub mod signal;

pub use record::{FileRecordStore, ManagedProcessRecord, MemoryRecordStore, RecordStore};
pub use signal::{process_alive, terminate, TerminateConfig, TerminateOutcome};

use std::fs::OpenOptions;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use ops_common::{Error, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::OpsConfig;
use crate::health;
use crate::inspect::ProcessInspector;
use crate::probe::HttpProbe;

/// Delay between port re-checks while waiting for a takeover to settle.
const TAKEOVER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A process currently listening on the managed port.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOwner {
    pub pid: u32,
    pub command_line: String,
    pub safe_to_terminate: bool,
}

/// Result of a successful `stop`.
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    /// Pids that were terminated (or already gone when signalled).
    pub terminated: Vec<u32>,
    /// True when a recorded pid turned out to be dead already.
    pub stale_record_cleared: bool,
}

/// Snapshot for `opsctl status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub health_ok: bool,
    pub health_detail: String,
    pub owners: Vec<ProcessOwner>,
    pub recorded_pid: Option<u32>,
    pub recorded_alive: bool,
}

/// True when a command line belongs to the managed backend.
///
/// Matching is case-insensitive and path-separator-insensitive: the line is
/// lowercased with `\` folded to `/`, then must contain both fragments.
pub fn cmdline_matches(cmdline: &str, service_fragment: &str, repo_fragment: &str) -> bool {
    if cmdline.is_empty() {
        return false;
    }
    let normalized = cmdline.to_lowercase().replace('\\', "/");
    let service = service_fragment.to_lowercase().replace('\\', "/");
    let repo = repo_fragment.to_lowercase().replace('\\', "/");
    normalized.contains(&service) && normalized.contains(&repo)
}

/// Lifecycle operations over one managed backend.
pub struct LifecycleController<'a> {
    config: &'a OpsConfig,
    inspector: &'a dyn ProcessInspector,
    store: &'a dyn RecordStore,
}

impl<'a> LifecycleController<'a> {
    pub fn new(
        config: &'a OpsConfig,
        inspector: &'a dyn ProcessInspector,
        store: &'a dyn RecordStore,
    ) -> Self {
        LifecycleController { config, inspector, store }
    }

    /// Current owners of the managed port, classified against the allowlist.
    ///
    /// Owners are re-derived on every call; nothing is cached.
    pub fn owners(&self) -> Result<Vec<ProcessOwner>> {
        let pids = self.inspector.listening_pids(self.config.port)?;
        let mut owners = Vec::with_capacity(pids.len());
        for pid in pids {
            let command_line = match self.inspector.cmdline(pid) {
                Ok(cmdline) => cmdline,
                // The owner exited between enumeration and lookup.
                Err(Error::ProcessNotFound { .. }) => continue,
                Err(err) => return Err(err),
            };
            let safe_to_terminate = cmdline_matches(
                &command_line,
                &self.config.service_fragment,
                &self.config.repo_fragment,
            );
            owners.push(ProcessOwner { pid, command_line, safe_to_terminate });
        }
        Ok(owners)
    }

    /// Spawn the backend and persist its pid record.
    ///
    /// Does not wait for health; callers compose with `health::wait_healthy`.
    pub fn start(&self) -> Result<ManagedProcessRecord> {
        let python = self.config.backend_python();
        if !python.exists() {
            return Err(Error::MissingInterpreter { path: python });
        }

        let log_dir = self.config.backend_log_dir();
        std::fs::create_dir_all(&log_dir)?;
        let log_path = log_dir.join(format!(
            "backend_{}.log",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        let log_file = OpenOptions::new().create(true).append(true).open(&log_path)?;
        let log_file_err = log_file.try_clone()?;

        let mut command = Command::new(&python);
        command
            .args(["-m", &self.config.service_module, "server"])
            .args(["--host", &self.config.host])
            .args(["--port", &self.config.port.to_string()])
            .current_dir(&self.config.service_root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(log_file_err));
        for (key, value) in &self.config.env_overrides {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|err| Error::SpawnFailed(err.to_string()))?;
        let record = ManagedProcessRecord {
            pid: child.id(),
            started_at: Utc::now(),
            log_path: log_path.clone(),
        };
        self.store.save(&record)?;
        info!(pid = record.pid, log = %log_path.display(), "backend started");
        Ok(record)
    }

    /// Stop the backend: terminate every port owner (gated by the allowlist)
    /// plus the recorded pid, then clear the record.
    ///
    /// Idempotent: with no owners and no live record this is a no-op success.
    /// A stale record (dead pid) is deleted, never an error.
    pub fn stop(&self, force: bool) -> Result<StopOutcome> {
        let owners = self.owners()?;

        let blocked: Vec<&ProcessOwner> =
            owners.iter().filter(|owner| !owner.safe_to_terminate).collect();
        if !blocked.is_empty() {
            if !force {
                let owner = blocked[0];
                return Err(Error::OwnershipBlocked {
                    pid: owner.pid,
                    cmdline: owner.command_line.clone(),
                });
            }
            for owner in &blocked {
                warn!(
                    pid = owner.pid,
                    cmdline = %owner.command_line,
                    "force-terminating owner outside the allowlist"
                );
            }
        }

        let term_config = TerminateConfig::with_grace(self.config.terminate_grace);
        let mut terminated = Vec::new();
        for owner in &owners {
            match terminate(owner.pid, &term_config) {
                TerminateOutcome::StillRunning => {
                    return Err(Error::TerminateFailed { pid: owner.pid });
                }
                outcome => {
                    debug!(pid = owner.pid, ?outcome, "owner terminated");
                    terminated.push(owner.pid);
                }
            }
        }

        let mut stale_record_cleared = false;
        if let Some(pid) = self.store.load()? {
            if process_alive(pid) {
                if terminate(pid, &term_config) == TerminateOutcome::StillRunning {
                    return Err(Error::TerminateFailed { pid });
                }
                if !terminated.contains(&pid) {
                    terminated.push(pid);
                }
            } else if !owners.iter().any(|owner| owner.pid == pid) {
                debug!(pid, "clearing stale pid record");
                stale_record_cleared = true;
            }
        }
        self.store.clear()?;

        if !owners.is_empty() && !self.wait_port_clear(self.config.takeover_wait)? {
            return Err(Error::PortBusy { port: self.config.port });
        }

        Ok(StopOutcome { terminated, stale_record_cleared })
    }

    /// Clear the managed port by force, in bounded rounds of
    /// enumerate -> terminate -> wait. Returns whether the port ended free.
    ///
    /// No allowlist gate here; callers decide whether force applies.
    pub fn takeover_port(&self) -> Result<bool> {
        let term_config = TerminateConfig::with_grace(self.config.terminate_grace);
        for round in 1..=self.config.takeover_rounds {
            let pids = self.inspector.listening_pids(self.config.port)?;
            if pids.is_empty() {
                return Ok(true);
            }
            info!(round, ?pids, port = self.config.port, "terminating port owners");
            for pid in &pids {
                terminate(*pid, &term_config);
            }
            if self.wait_port_clear(self.config.takeover_wait)? {
                return Ok(true);
            }
        }
        Ok(self.inspector.listening_pids(self.config.port)?.is_empty())
    }

    /// Combined health + ownership + record snapshot.
    pub fn status(&self, probe: &HttpProbe) -> Result<StatusReport> {
        let (health_ok, health_detail) = health::health_once(probe, &self.config.base_url);
        let owners = self.owners()?;
        let recorded_pid = self.store.load()?;
        let recorded_alive = recorded_pid.map(process_alive).unwrap_or(false);
        Ok(StatusReport { health_ok, health_detail, owners, recorded_pid, recorded_alive })
    }

    fn wait_port_clear(&self, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            if self.inspector.listening_pids(self.config.port)?.is_empty() {
                return Ok(true);
            }
            if start.elapsed() >= timeout {
                return Ok(false);
            }
            thread::sleep(TAKEOVER_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::MockInspector;
    use std::path::PathBuf;

    fn test_config() -> OpsConfig {
        let mut config = OpsConfig::new("127.0.0.1", 8420)
            .with_service_root(PathBuf::from("/home/dev/dpolaris_ai"));
        config.takeover_wait = Duration::ZERO;
        config.terminate_grace = Duration::from_millis(100);
        config
    }

    /// Pid of a child that has already exited and been reaped.
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_cmdline_matches_both_fragments() {
        assert!(cmdline_matches(
            "/home/dev/dpolaris_ai/.venv/bin/python -m cli.main server --port 8420",
            "cli.main",
            "dpolaris_ai"
        ));
        // Missing repo fragment
        assert!(!cmdline_matches("python -m cli.main server", "cli.main", "dpolaris_ai"));
        // Missing service fragment
        assert!(!cmdline_matches("/home/dev/dpolaris_ai/.venv/bin/python", "cli.main", "dpolaris_ai"));
        assert!(!cmdline_matches("", "cli.main", "dpolaris_ai"));
    }

    #[test]
    fn test_cmdline_matches_case_and_separator_insensitive() {
        assert!(cmdline_matches(
            r"C:\my-git\dPolaris_AI\.venv\Scripts\python.exe -m Cli.Main server",
            "cli.main",
            "dpolaris_ai"
        ));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let config = test_config();
        let inspector = MockInspector::new();
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        let first = controller.stop(false).unwrap();
        assert!(first.terminated.is_empty());
        assert!(!first.stale_record_cleared);

        let second = controller.stop(false).unwrap();
        assert!(second.terminated.is_empty());
    }

    #[test]
    fn test_stop_refuses_unsafe_owner_without_force() {
        let config = test_config();
        let inspector = MockInspector::with_owner(4242, "java -jar trader.jar");
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        let err = controller.stop(false).unwrap_err();
        match err {
            Error::OwnershipBlocked { pid, cmdline } => {
                assert_eq!(pid, 4242);
                assert!(cmdline.contains("trader.jar"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_stop_with_force_kills_unsafe_owner() {
        let config = test_config();
        let pid = dead_pid();
        // Owner listed once, port free afterwards.
        let inspector = MockInspector::scripted(vec![vec![pid]], vec![]);
        inspector.set_cmdline(pid, "java -jar trader.jar");
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        let outcome = controller.stop(true).unwrap();
        assert_eq!(outcome.terminated, vec![pid]);
    }

    #[test]
    fn test_stop_clears_stale_record() {
        let config = test_config();
        let inspector = MockInspector::new();
        let store = MemoryRecordStore::with_pid(dead_pid());
        let controller = LifecycleController::new(&config, &inspector, &store);

        let outcome = controller.stop(false).unwrap();
        assert!(outcome.stale_record_cleared);
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_stop_skips_owner_that_exited_mid_inspection() {
        let config = test_config();
        // Pid listed but cmdline lookup fails with ProcessNotFound.
        let inspector = MockInspector::scripted(vec![vec![31337]], vec![]);
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        let outcome = controller.stop(false).unwrap();
        assert!(outcome.terminated.is_empty());
    }

    #[test]
    fn test_takeover_succeeds_once_port_clears() {
        let config = test_config();
        let pid = dead_pid();
        let inspector = MockInspector::scripted(vec![vec![pid], vec![]], vec![]);
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        assert!(controller.takeover_port().unwrap());
    }

    #[test]
    fn test_takeover_gives_up_after_rounds() {
        let config = test_config();
        let pid = dead_pid();
        let inspector = MockInspector::scripted(vec![], vec![pid]);
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        assert!(!controller.takeover_port().unwrap());
    }

    #[test]
    fn test_start_refuses_missing_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config().with_service_root(dir.path().to_path_buf());
        config.state_dir = dir.path().join("state");
        let inspector = MockInspector::new();
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        let err = controller.start().unwrap_err();
        assert!(matches!(err, Error::MissingInterpreter { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_start_spawns_and_records_pid() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join(".venv/bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let fake_python = bin_dir.join("python");
        std::fs::write(&fake_python, "#!/bin/sh\nsleep 60\n").unwrap();
        std::fs::set_permissions(&fake_python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = test_config().with_service_root(dir.path().to_path_buf());
        config.state_dir = dir.path().join("state");
        let inspector = MockInspector::new();
        let store = MemoryRecordStore::new();
        let controller = LifecycleController::new(&config, &inspector, &store);

        let record = controller.start().unwrap();
        assert!(process_alive(record.pid));
        assert_eq!(store.load().unwrap(), Some(record.pid));
        assert!(record.log_path.exists());

        // The child was detached by start(); reap it here so it does not
        // linger as a zombie for the rest of the test run.
        unsafe {
            libc::kill(record.pid as i32, libc::SIGKILL);
            let mut status = 0;
            libc::waitpid(record.pid as i32, &mut status, 0);
        }
        assert!(!process_alive(record.pid));
    }
}
