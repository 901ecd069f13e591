//! Diagnostic classifier.
//!
//! Runs a fixed, ordered sequence of checks against the backend and folds
//! the evidence into a deduplicated classification set. The order never
//! changes: A_HEALTH, B_API_STATUS, C_DL_STATUS, D_START_DL_JOB, then one
//! D_POLL_DL_JOB entry per status poll. A failed health check short-circuits
//! the run; everything after it would only measure the same outage.

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::job::{self, FinalStatus, JobSpec};
use crate::probe::{join_url, HttpProbe, ProbeResult};

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(15);
const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(20);

/// Failure classifications, ordered so a BTreeSet serializes the same way
/// a sorted list of the names would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    ApiContractInconsistent,
    BackendDown,
    DlJobTimeout,
    MissingTorch,
}

impl Classification {
    pub fn as_str(self) -> &'static str {
        match self {
            Classification::ApiContractInconsistent => "API_CONTRACT_INCONSISTENT",
            Classification::BackendDown => "BACKEND_DOWN",
            Classification::DlJobTimeout => "DL_JOB_TIMEOUT",
            Classification::MissingTorch => "MISSING_TORCH",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub endpoint: String,
    pub ok: bool,
    pub status_code: Option<u16>,
    pub details: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    pub duration_seconds: f64,
}

/// Inputs echoed into the report.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorInputs {
    pub symbol: String,
    pub model_type: String,
    pub epochs: u32,
    pub timeout: u64,
}

/// Job section of the report.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: Option<String>,
    pub final_status: String,
    pub error: Option<String>,
    pub poll_count: u32,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub last_payload: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub ok: bool,
    pub reason: String,
}

/// Complete doctor run output.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub schema_version: &'static str,
    pub started_at: DateTime<Utc>,
    pub base_url: String,
    pub inputs: DoctorInputs,
    pub checks: Vec<CheckResult>,
    pub classifications: BTreeSet<Classification>,
    pub job: JobReport,
    pub summary: Summary,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tickets: Vec<String>,
}

/// Doctor run parameters.
#[derive(Debug, Clone)]
pub struct DoctorOptions {
    pub spec: JobSpec,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for DoctorOptions {
    fn default() -> Self {
        DoctorOptions {
            spec: JobSpec::default(),
            job_timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// True when a job error text indicates the torch import failed.
pub fn torch_missing(error_text: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)no module named ['"]?torch['"]?"#).expect("static regex")
    });
    pattern.is_match(error_text)
}

fn timed(probe_call: impl FnOnce() -> ProbeResult) -> (ProbeResult, f64) {
    let started = Instant::now();
    let result = probe_call();
    let seconds = (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;
    (result, seconds)
}

fn record(
    checks: &mut Vec<CheckResult>,
    name: &str,
    endpoint: String,
    ok: bool,
    result: &ProbeResult,
    details: String,
    duration_seconds: f64,
) {
    checks.push(CheckResult {
        name: name.to_string(),
        endpoint,
        ok,
        status_code: result.status_code,
        details,
        payload: result.payload.clone(),
        duration_seconds,
    });
}

/// Run the full ordered check sequence.
pub fn run_checks(probe: &HttpProbe, base_url: &str, options: &DoctorOptions) -> DiagnosticReport {
    let base = base_url.trim_end_matches('/').to_string();
    let started_at = Utc::now();
    let inputs = DoctorInputs {
        symbol: options.spec.symbol.clone(),
        model_type: options.spec.model_type.clone(),
        epochs: options.spec.epochs,
        timeout: options.job_timeout.as_secs(),
    };
    let mut checks: Vec<CheckResult> = Vec::new();
    let mut classifications: BTreeSet<Classification> = BTreeSet::new();

    // A) GET /health
    let (result, seconds) = timed(|| probe.get(&join_url(&base, "/health"), HEALTH_CHECK_TIMEOUT));
    let health_ok = result.success && result.is_object();
    let details = if health_ok {
        "healthy".to_string()
    } else if result.error.is_empty() {
        "health check failed".to_string()
    } else {
        result.error.clone()
    };
    record(&mut checks, "A_HEALTH", "GET /health".to_string(), health_ok, &result, details, seconds);
    if !health_ok {
        classifications.insert(Classification::BackendDown);
        return DiagnosticReport {
            schema_version: ops_common::SCHEMA_VERSION,
            started_at,
            base_url: base,
            inputs,
            checks,
            classifications,
            job: JobReport {
                job_id: None,
                final_status: "not_started".to_string(),
                error: None,
                poll_count: 0,
                last_payload: Value::Null,
            },
            summary: Summary { ok: false, reason: "backend down".to_string() },
            tickets: Vec::new(),
        };
    }

    // B/C) status endpoints; a malformed response is recorded and classified
    // but never stops the run.
    for (name, path) in [("B_API_STATUS", "/api/status"), ("C_DL_STATUS", "/api/deep-learning/status")] {
        let (result, seconds) = timed(|| probe.get(&join_url(&base, path), STATUS_CHECK_TIMEOUT));
        let ok = result.success && result.is_object();
        let details = if ok {
            "ok".to_string()
        } else if result.error.is_empty() {
            "unexpected response".to_string()
        } else {
            result.error.clone()
        };
        record(&mut checks, name, format!("GET {}", path), ok, &result, details, seconds);
        if !ok {
            classifications.insert(Classification::ApiContractInconsistent);
        }
    }

    // D) enqueue the training job
    let body = serde_json::to_value(&options.spec).unwrap_or(Value::Null);
    let (result, seconds) =
        timed(|| probe.post(&join_url(&base, job::ENQUEUE_PATH), job::ENQUEUE_TIMEOUT, &body));
    let start_ok = result.success && result.is_object();
    let job_id = job::extract_job_id(&result.payload);
    let started_ok = start_ok && job_id.is_some();
    let details = if started_ok {
        "job started".to_string()
    } else if !result.error.is_empty() {
        result.error.clone()
    } else {
        "missing job id".to_string()
    };
    let start_error = if started_ok { None } else { Some(details.clone()) };
    record(
        &mut checks,
        "D_START_DL_JOB",
        format!("POST {}", job::ENQUEUE_PATH),
        started_ok,
        &result,
        details,
        seconds,
    );
    let Some(job_id) = job_id.filter(|_| start_ok) else {
        classifications.insert(Classification::ApiContractInconsistent);
        return DiagnosticReport {
            schema_version: ops_common::SCHEMA_VERSION,
            started_at,
            base_url: base,
            inputs,
            checks,
            classifications,
            job: JobReport {
                job_id: None,
                final_status: "start_failed".to_string(),
                error: start_error,
                poll_count: 0,
                last_payload: result.payload,
            },
            summary: Summary { ok: false, reason: "job start failed".to_string() },
            tickets: Vec::new(),
        };
    };

    info!(%job_id, timeout = ?options.job_timeout, "polling deep-learning job");

    // Poll to terminal, recording each poll as a check.
    let outcome = job::await_terminal_with(
        probe,
        &base,
        &job_id,
        options.job_timeout,
        options.poll_interval,
        |observation, elapsed| {
            let ok = observation.probe_error.is_none();
            let details = observation
                .raw_status
                .clone()
                .filter(|status| !status.is_empty())
                .or_else(|| observation.probe_error.clone())
                .unwrap_or_else(|| "poll error".to_string());
            let seconds = (elapsed.as_secs_f64() * 1000.0).round() / 1000.0;
            checks.push(CheckResult {
                name: "D_POLL_DL_JOB".to_string(),
                endpoint: format!("GET /api/jobs/{}", job_id),
                ok,
                status_code: observation.status_code,
                details,
                payload: observation.raw_payload.clone(),
                duration_seconds: seconds,
            });
            if !ok {
                classifications.insert(Classification::ApiContractInconsistent);
            }
        },
    );

    if outcome.final_status == FinalStatus::Timeout {
        classifications.insert(Classification::DlJobTimeout);
    }
    if outcome.final_status == FinalStatus::Failed {
        if let Some(error) = &outcome.error_text {
            if torch_missing(error) {
                classifications.insert(Classification::MissingTorch);
            }
        }
    }

    let success = outcome.final_status == FinalStatus::Success && classifications.is_empty();
    let summary = Summary {
        ok: success,
        reason: if success { "success".to_string() } else { "issues detected".to_string() },
    };

    DiagnosticReport {
        schema_version: ops_common::SCHEMA_VERSION,
        started_at,
        base_url: base,
        inputs,
        checks,
        classifications,
        job: JobReport {
            job_id: Some(job_id),
            final_status: outcome.final_status.as_str().to_string(),
            error: outcome.error_text,
            poll_count: outcome.poll_count,
            last_payload: outcome.last_payload,
        },
        summary,
        tickets: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_serializes_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&Classification::BackendDown).unwrap(),
            "\"BACKEND_DOWN\""
        );
        assert_eq!(
            serde_json::to_string(&Classification::ApiContractInconsistent).unwrap(),
            "\"API_CONTRACT_INCONSISTENT\""
        );
    }

    #[test]
    fn test_classification_set_orders_like_sorted_names() {
        let mut set = BTreeSet::new();
        set.insert(Classification::MissingTorch);
        set.insert(Classification::ApiContractInconsistent);
        set.insert(Classification::DlJobTimeout);

        let names: Vec<&str> = set.iter().map(|c| c.as_str()).collect();
        assert_eq!(
            names,
            vec!["API_CONTRACT_INCONSISTENT", "DL_JOB_TIMEOUT", "MISSING_TORCH"]
        );
    }

    #[test]
    fn test_torch_missing_variants() {
        assert!(torch_missing("No module named 'torch'"));
        assert!(torch_missing("no module named \"torch\""));
        assert!(torch_missing("ModuleNotFoundError: No module named torch"));
        assert!(!torch_missing("no module named 'numpy'"));
        assert!(!torch_missing("torch out of memory"));
    }
}
