//! Supervisor configuration.
//!
//! One explicit [`OpsConfig`] value is threaded through every component; there
//! is no global state. Defaults target a local backend on 127.0.0.1:8420 and
//! are overridden by CLI flags in `main.rs`.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default backend host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default backend port.
pub const DEFAULT_PORT: u16 = 8420;

/// Python module started as `python -m <module> server`.
pub const DEFAULT_SERVICE_MODULE: &str = "cli.main";

/// Supervisor configuration shared by all components.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// Backend host for both probing and spawning.
    pub host: String,

    /// Backend TCP port.
    pub port: u16,

    /// Base URL for HTTP probes, e.g. `http://127.0.0.1:8420`.
    pub base_url: String,

    /// Root of the backend service checkout (contains `.venv/`).
    pub service_root: PathBuf,

    /// Python module invoked to start the backend server.
    pub service_module: String,

    /// Command-line fragment identifying the service invocation.
    /// An owner is safe to terminate only when its command line contains
    /// both this and `repo_fragment`.
    pub service_fragment: String,

    /// Command-line fragment identifying the repository path.
    pub repo_fragment: String,

    /// Directory holding the pid record and backend logs.
    pub state_dir: PathBuf,

    /// Directory for doctor reports and tickets.
    pub reports_dir: PathBuf,

    /// Environment overrides applied to the spawned backend.
    pub env_overrides: Vec<(String, String)>,

    /// How long `wait_healthy` keeps polling after start.
    pub health_wait: Duration,

    /// SIGTERM grace period before escalating to SIGKILL.
    pub terminate_grace: Duration,

    /// Rounds of enumerate-terminate-wait when clearing a port.
    pub takeover_rounds: u32,

    /// How long each takeover round waits for the port to clear.
    pub takeover_wait: Duration,

    /// Deadline for a deep-learning job to reach a terminal state.
    pub job_timeout: Duration,

    /// Delay between job status polls.
    pub poll_interval: Duration,
}

impl OpsConfig {
    /// Build a config with defaults for the given host/port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let base_url = format!("http://{}:{}", host, port);
        let service_root = default_service_root();
        let repo_fragment = repo_fragment_of(&service_root);
        OpsConfig {
            host,
            port,
            base_url,
            service_root,
            service_module: DEFAULT_SERVICE_MODULE.to_string(),
            service_fragment: DEFAULT_SERVICE_MODULE.to_string(),
            repo_fragment,
            state_dir: default_state_dir(),
            reports_dir: default_reports_dir(),
            env_overrides: vec![("LLM_PROVIDER".to_string(), "none".to_string())],
            health_wait: Duration::from_secs(30),
            terminate_grace: Duration::from_secs(5),
            takeover_rounds: 3,
            takeover_wait: Duration::from_secs(10),
            job_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(2),
        }
    }

    /// Override the service root and re-derive the repository fragment.
    pub fn with_service_root(mut self, root: PathBuf) -> Self {
        self.repo_fragment = repo_fragment_of(&root);
        self.service_root = root;
        self
    }

    /// Replace the base URL (e.g. when probing a remote host).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Path of the backend Python interpreter inside the venv.
    pub fn backend_python(&self) -> PathBuf {
        if cfg!(windows) {
            self.service_root.join(".venv").join("Scripts").join("python.exe")
        } else {
            self.service_root.join(".venv").join("bin").join("python")
        }
    }

    /// Path of the single-line pid record file.
    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join("backend.pid")
    }

    /// Directory where backend stdout/stderr logs are appended.
    pub fn backend_log_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

impl Default for OpsConfig {
    fn default() -> Self {
        OpsConfig::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

fn default_service_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dpolaris_ai")
}

fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".opsctl")
}

fn default_reports_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dpolaris_data")
        .join("reports")
}

/// Last path component, lowercased, used as the repository-name fragment.
fn repo_fragment_of(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "dpolaris_ai".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpsConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8420);
        assert_eq!(config.base_url, "http://127.0.0.1:8420");
        assert_eq!(config.service_module, "cli.main");
        assert!(config
            .env_overrides
            .contains(&("LLM_PROVIDER".to_string(), "none".to_string())));
    }

    #[test]
    fn test_with_service_root_rederives_fragment() {
        let config =
            OpsConfig::default().with_service_root(PathBuf::from("/srv/checkouts/Trader_AI"));
        assert_eq!(config.repo_fragment, "trader_ai");
        assert!(config.backend_python().starts_with("/srv/checkouts/Trader_AI"));
    }

    #[test]
    fn test_paths_derive_from_state_dir() {
        let mut config = OpsConfig::default();
        config.state_dir = PathBuf::from("/tmp/opsctl-test");
        assert_eq!(config.pid_file(), PathBuf::from("/tmp/opsctl-test/backend.pid"));
        assert_eq!(config.backend_log_dir(), PathBuf::from("/tmp/opsctl-test/logs"));
    }
}
