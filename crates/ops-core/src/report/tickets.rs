//! Ticket generation.
//!
//! For each classification present in a report, write a timestamped text
//! ticket a maintainer (or an agent) can pick up. The BACKEND_DOWN ticket
//! embeds live port-ownership evidence gathered through the inspector at
//! generation time.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ops_common::Result;
use tracing::info;

use crate::doctor::{Classification, DiagnosticReport};
use crate::inspect::ProcessInspector;

fn timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Current owners of the port, rendered as ticket evidence.
fn port_owner_evidence(inspector: &dyn ProcessInspector, port: u16) -> String {
    let pids = match inspector.listening_pids(port) {
        Ok(pids) => pids,
        Err(err) => return format!("(failed to inspect port {}: {})", port, err),
    };
    if pids.is_empty() {
        return format!("(no listeners on port {})", port);
    }
    let mut lines = Vec::with_capacity(pids.len());
    for pid in pids {
        let cmdline = inspector
            .cmdline(pid)
            .unwrap_or_else(|err| format!("<cmdline unavailable: {}>", err));
        lines.push(format!("pid={} cmdline={}", pid, cmdline));
    }
    lines.join("\n")
}

fn write_ticket(dir: &Path, prefix: &str, content: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_{}.txt", prefix, timestamp()));
    fs::write(&path, content)?;
    info!(path = %path.display(), "ticket written");
    Ok(path)
}

/// Generate one ticket per classification present in the report.
pub fn generate_tickets(
    report: &DiagnosticReport,
    inspector: &dyn ProcessInspector,
    port: u16,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let mut created = Vec::new();

    if report.classifications.contains(&Classification::BackendDown) {
        let evidence = port_owner_evidence(inspector, port);
        let content = format!(
            "Title: Backend down on {base}\n\n\
             Doctor classification: BACKEND_DOWN\n\
             Base URL: {base}\n\
             Symptom: GET /health failed before other checks.\n\n\
             Observed owners of port {port}:\n{evidence}\n\n\
             Requested fix:\n\
             - Verify backend process ownership for port {port}.\n\
             - Ensure the backend responds at GET /health.\n\
             - If a stale process is holding the port, stop it and restart via the project venv.\n",
            base = report.base_url,
            port = port,
            evidence = evidence,
        );
        created.push(write_ticket(dir, "backend_down", &content)?);
    }

    if report.classifications.contains(&Classification::MissingTorch) {
        let content = format!(
            "Title: Deep-learning job failed due to missing torch\n\n\
             Doctor classification: MISSING_TORCH\n\
             Endpoint: POST {base}/api/jobs/deep-learning/train\n\
             Job ID: {job_id}\n\
             Error: {error}\n\n\
             Requested fix:\n\
             - Install torch in the backend runtime/venv.\n\
             - Confirm /api/deep-learning/status reports torch/cuda availability flags.\n\
             - Re-run doctor to verify the job reaches status=success.\n",
            base = report.base_url,
            job_id = report.job.job_id.as_deref().unwrap_or("none"),
            error = report.job.error.as_deref().unwrap_or("none"),
        );
        created.push(write_ticket(dir, "missing_torch", &content)?);
    }

    if report
        .classifications
        .contains(&Classification::ApiContractInconsistent)
    {
        let content = format!(
            "Title: API contract inconsistency detected\n\n\
             Doctor classification: API_CONTRACT_INCONSISTENT\n\
             Base URL: {base}\n\
             Symptom: one or more endpoints returned an unexpected JSON structure or a non-JSON payload.\n\
             Expected endpoints:\n\
             - GET /api/status\n\
             - GET /api/deep-learning/status\n\
             - POST /api/jobs/deep-learning/train (returns job id)\n\
             - GET /api/jobs/{{job_id}} (returns job status)\n\n\
             Requested fix:\n\
             - Normalize response payloads to stable JSON objects.\n\
             - Ensure the job-start response always includes a job id.\n\
             - Ensure the job-poll response always includes a status field.\n",
            base = report.base_url,
        );
        created.push(write_ticket(dir, "api_contract", &content)?);
    }

    if report.classifications.contains(&Classification::DlJobTimeout) {
        let content = format!(
            "Title: Deep-learning job did not reach a terminal state\n\n\
             Doctor classification: DL_JOB_TIMEOUT\n\
             Job ID: {job_id}\n\
             Polls issued: {polls}\n\
             Deadline: {timeout}s\n\n\
             Requested fix:\n\
             - Check backend worker logs for a stuck or starved training job.\n\
             - Confirm job status transitions are being persisted and served.\n",
            job_id = report.job.job_id.as_deref().unwrap_or("none"),
            polls = report.job.poll_count,
            timeout = report.inputs.timeout,
        );
        created.push(write_ticket(dir, "dl_job_timeout", &content)?);
    }

    Ok(created)
}
