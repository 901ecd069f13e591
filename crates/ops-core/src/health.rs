//! Backend health monitor.
//!
//! A backend is healthy when `GET /health` succeeds and its payload either
//! has no `status` field or the field normalizes into the allow set. All
//! waiting is sleep-poll with an explicit deadline.

use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::probe::{join_url, HttpProbe};

/// Per-probe timeout for `GET /health`.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(4);

/// Delay between health probes while waiting.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(800);

/// Status values accepted as healthy after trim + lowercase.
const HEALTHY_STATUSES: [&str; 3] = ["healthy", "ok", "running"];

/// Outcome of a bounded health wait.
#[derive(Debug, Clone)]
pub struct HealthWait {
    /// True when a probe reported healthy before the deadline.
    pub ok: bool,
    /// Time spent waiting when the outcome was decided.
    pub elapsed: Duration,
    /// Detail string from the last probe.
    pub last_detail: String,
}

/// Evaluate a health payload. A missing `status` field counts as healthy.
pub fn health_detail(payload: &Value) -> (bool, String) {
    match payload.get("status") {
        None => (true, "no status field".to_string()),
        Some(value) => {
            let raw = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let normalized = raw.trim().to_lowercase();
            if HEALTHY_STATUSES.contains(&normalized.as_str()) {
                (true, format!("status={}", normalized))
            } else {
                (false, format!("unexpected status={}", raw.trim()))
            }
        }
    }
}

/// Probe `GET /health` once.
pub fn health_once(probe: &HttpProbe, base_url: &str) -> (bool, String) {
    let result = probe.get(&join_url(base_url, "/health"), HEALTH_TIMEOUT);
    if !result.success {
        return (false, result.error);
    }
    health_detail(&result.payload)
}

/// Poll `/health` until healthy or the deadline passes.
///
/// The deadline is clamped to a minimum of one second so a misconfigured
/// zero timeout still gets at least one probe.
pub fn wait_healthy(probe: &HttpProbe, base_url: &str, timeout: Duration) -> HealthWait {
    let deadline = timeout.max(Duration::from_secs(1));
    let start = Instant::now();
    let mut last_detail = String::new();

    loop {
        let (ok, detail) = health_once(probe, base_url);
        last_detail = detail;
        if ok {
            return HealthWait { ok: true, elapsed: start.elapsed(), last_detail };
        }
        debug!(detail = %last_detail, "health probe not ready");
        if start.elapsed() >= deadline {
            break;
        }
        thread::sleep(HEALTH_POLL_INTERVAL);
    }

    HealthWait { ok: false, elapsed: start.elapsed(), last_detail }
}
