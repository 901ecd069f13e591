//! Deep-learning job orchestration.
//!
//! One job lifecycle: enqueue -> poll -> terminal. The backend only ever
//! reports success or failure; timeout is applied here when the deadline
//! passes without a terminal state. Probe failures during polling are
//! recorded and the loop continues; only the deadline aborts it.

pub mod extract;

pub use extract::{
    extract_artifact_path, extract_error_text, extract_job_id, extract_log_lines,
};

use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ops_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::probe::{join_url, HttpProbe, ProbeResult};

/// Enqueue endpoint, relative to the base URL.
pub const ENQUEUE_PATH: &str = "/api/jobs/deep-learning/train";

/// Per-request timeout for the enqueue POST.
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request timeout for a status poll.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(20);

/// Training job parameters sent to the enqueue endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobSpec {
    pub symbol: String,
    pub model_type: String,
    pub epochs: u32,
}

impl Default for JobSpec {
    fn default() -> Self {
        JobSpec { symbol: "AAPL".to_string(), model_type: "lstm".to_string(), epochs: 1 }
    }
}

/// An accepted job. Immutable once created.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: String,
    pub enqueue_time: DateTime<Utc>,
}

/// Normalized job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    /// Non-object payload or missing status field.
    Unknown,
}

impl JobStatus {
    /// Normalize raw status text: trim, lowercase, then match vocabularies.
    /// Anything non-empty that is neither success nor failure counts as
    /// still in flight.
    pub fn from_text(raw: &str) -> JobStatus {
        match raw.trim().to_lowercase().as_str() {
            "completed" | "success" => JobStatus::Success,
            "failed" | "error" | "cancelled" => JobStatus::Failed,
            "pending" | "queued" => JobStatus::Pending,
            "" => JobStatus::Unknown,
            _ => JobStatus::Running,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// What one status poll observed. Recomputed on every poll, never cached.
#[derive(Debug, Clone)]
pub struct JobObservation {
    pub status: JobStatus,
    /// Raw status text before normalization, when present.
    pub raw_status: Option<String>,
    pub error_text: Option<String>,
    pub artifact_path: Option<String>,
    pub log_lines: Vec<String>,
    pub status_code: Option<u16>,
    /// Transport/contract failure of the poll itself.
    pub probe_error: Option<String>,
    pub raw_payload: Value,
}

/// Terminal outcome of a supervised job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalStatus {
    Success,
    Failed,
    /// Deadline passed without a terminal state.
    Timeout,
}

impl FinalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalStatus::Success => "success",
            FinalStatus::Failed => "failed",
            FinalStatus::Timeout => "timeout",
        }
    }
}

/// Aggregated result of `await_terminal`.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub final_status: FinalStatus,
    pub error_text: Option<String>,
    pub artifact_path: Option<String>,
    pub poll_count: u32,
    pub log_lines: Vec<String>,
    pub last_payload: Value,
}

/// Submit a training job. A rejected enqueue or a response without a job id
/// is fatal; there is no retry.
pub fn enqueue(probe: &HttpProbe, base_url: &str, spec: &JobSpec) -> Result<JobHandle> {
    let body = serde_json::to_value(spec)?;
    let result = probe.post(&join_url(base_url, ENQUEUE_PATH), ENQUEUE_TIMEOUT, &body);
    if !result.success {
        return Err(Error::EnqueueRejected(result.error));
    }
    let job_id = extract_job_id(&result.payload).ok_or(Error::MissingJobId)?;
    debug!(%job_id, "job enqueued");
    Ok(JobHandle { job_id, enqueue_time: Utc::now() })
}

/// Poll job status once. Failures come back as data inside the observation.
pub fn poll(probe: &HttpProbe, base_url: &str, job_id: &str) -> JobObservation {
    let url = join_url(base_url, &format!("/api/jobs/{}", job_id));
    let result = probe.get(&url, POLL_TIMEOUT);
    observe(&result)
}

fn observe(result: &ProbeResult) -> JobObservation {
    if !result.success || !result.is_object() {
        let probe_error = if result.error.is_empty() {
            "status payload was not a JSON object".to_string()
        } else {
            result.error.clone()
        };
        return JobObservation {
            status: JobStatus::Unknown,
            raw_status: None,
            error_text: None,
            artifact_path: None,
            log_lines: Vec::new(),
            status_code: result.status_code,
            probe_error: Some(probe_error),
            raw_payload: result.payload.clone(),
        };
    }

    let raw_status = result
        .payload
        .get("status")
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
    let status = raw_status
        .as_deref()
        .map(JobStatus::from_text)
        .unwrap_or(JobStatus::Unknown);

    JobObservation {
        status,
        raw_status,
        error_text: extract_error_text(&result.payload),
        artifact_path: extract_artifact_path(&result.payload),
        log_lines: extract_log_lines(&result.payload),
        status_code: result.status_code,
        probe_error: None,
        raw_payload: result.payload.clone(),
    }
}

/// Poll until a terminal state or the deadline, whichever comes first.
pub fn await_terminal(
    probe: &HttpProbe,
    base_url: &str,
    job_id: &str,
    deadline: Duration,
    interval: Duration,
) -> JobOutcome {
    await_terminal_with(probe, base_url, job_id, deadline, interval, |_, _| {})
}

/// `await_terminal` with a per-poll observer (used by the doctor to record
/// each poll as a check).
pub fn await_terminal_with<F>(
    probe: &HttpProbe,
    base_url: &str,
    job_id: &str,
    deadline: Duration,
    interval: Duration,
    mut on_poll: F,
) -> JobOutcome
where
    F: FnMut(&JobObservation, Duration),
{
    let start = Instant::now();
    let mut poll_count = 0u32;
    let mut last_error: Option<String> = None;
    let mut artifact_path: Option<String> = None;
    let mut log_lines: Vec<String> = Vec::new();
    let mut last_payload = Value::Null;

    loop {
        let poll_start = Instant::now();
        let observation = poll(probe, base_url, job_id);
        poll_count += 1;
        on_poll(&observation, poll_start.elapsed());

        last_payload = observation.raw_payload.clone();
        if let Some(error) = &observation.error_text {
            last_error = Some(error.clone());
        }
        if let Some(path) = &observation.artifact_path {
            artifact_path = Some(path.clone());
        }
        for line in &observation.log_lines {
            if !log_lines.contains(line) {
                log_lines.push(line.clone());
            }
        }

        match observation.status {
            JobStatus::Success => {
                return JobOutcome {
                    final_status: FinalStatus::Success,
                    error_text: None,
                    artifact_path,
                    poll_count,
                    log_lines,
                    last_payload,
                };
            }
            JobStatus::Failed => {
                return JobOutcome {
                    final_status: FinalStatus::Failed,
                    error_text: last_error.clone().or(Some("job failed".to_string())),
                    artifact_path,
                    poll_count,
                    log_lines,
                    last_payload,
                };
            }
            _ => {}
        }

        // Transport and contract errors never abort the loop.
        if let Some(probe_error) = &observation.probe_error {
            warn!(%job_id, error = %probe_error, "job poll failed, retrying until deadline");
            last_error = Some(probe_error.clone());
        }

        if start.elapsed() >= deadline {
            return JobOutcome {
                final_status: FinalStatus::Timeout,
                error_text: last_error,
                artifact_path,
                poll_count,
                log_lines,
                last_payload,
            };
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success_vocab() {
        assert_eq!(JobStatus::from_text("completed"), JobStatus::Success);
        assert_eq!(JobStatus::from_text(" SUCCESS "), JobStatus::Success);
    }

    #[test]
    fn test_status_failure_vocab() {
        assert_eq!(JobStatus::from_text("failed"), JobStatus::Failed);
        assert_eq!(JobStatus::from_text("Error"), JobStatus::Failed);
        assert_eq!(JobStatus::from_text("cancelled"), JobStatus::Failed);
    }

    #[test]
    fn test_status_in_flight_vocab() {
        assert_eq!(JobStatus::from_text("pending"), JobStatus::Pending);
        assert_eq!(JobStatus::from_text("queued"), JobStatus::Pending);
        assert_eq!(JobStatus::from_text("running"), JobStatus::Running);
        // Unrecognized non-empty text counts as still in flight.
        assert_eq!(JobStatus::from_text("warming_up"), JobStatus::Running);
        assert_eq!(JobStatus::from_text(""), JobStatus::Unknown);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_default_job_spec() {
        let spec = JobSpec::default();
        assert_eq!(spec.symbol, "AAPL");
        assert_eq!(spec.model_type, "lstm");
        assert_eq!(spec.epochs, 1);
    }
}
