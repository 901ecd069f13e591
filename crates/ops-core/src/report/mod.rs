//! Report persistence and rendering.
//!
//! The doctor report is written twice: pretty JSON for machines and a
//! fixed-layout text file for humans. Ticket generation lives in the
//! `tickets` submodule.

pub mod tickets;

pub use tickets::generate_tickets;

use std::fs;
use std::path::{Path, PathBuf};

use ops_common::Result;

use crate::doctor::DiagnosticReport;

/// Write `doctor_report.json` and `doctor_report.txt` under `dir`.
pub fn write_report(report: &DiagnosticReport, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir)?;
    let json_path = dir.join("doctor_report.json");
    let txt_path = dir.join("doctor_report.txt");

    fs::write(&json_path, serde_json::to_string_pretty(report)?)?;
    fs::write(&txt_path, format_report_text(report))?;
    Ok((json_path, txt_path))
}

/// Fixed-layout human rendering of a report.
pub fn format_report_text(report: &DiagnosticReport) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("opsctl Doctor Report".to_string());
    lines.push(format!("Generated: {}", report.started_at.format("%Y-%m-%dT%H:%M:%S%Z")));
    lines.push(format!("Base URL: {}", report.base_url));
    lines.push(String::new());

    lines.push(format!("Overall OK: {}", report.summary.ok));
    lines.push(format!("Reason: {}", report.summary.reason));

    lines.push(String::new());
    lines.push("Classifications:".to_string());
    if report.classifications.is_empty() {
        lines.push("- none".to_string());
    } else {
        for classification in &report.classifications {
            lines.push(format!("- {}", classification));
        }
    }

    lines.push(String::new());
    lines.push("Checks:".to_string());
    for check in &report.checks {
        let status_code = check
            .status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string());
        lines.push(format!(
            "- {}: {} | {} | HTTP={} | {}",
            check.name,
            if check.ok { "PASS" } else { "FAIL" },
            check.endpoint,
            status_code,
            check.details
        ));
    }

    lines.push(String::new());
    lines.push("Deep Learning Job:".to_string());
    lines.push(format!("- job_id: {}", report.job.job_id.as_deref().unwrap_or("none")));
    lines.push(format!("- final_status: {}", report.job.final_status));
    lines.push(format!("- error: {}", report.job.error.as_deref().unwrap_or("none")));
    lines.push(format!("- poll_count: {}", report.job.poll_count));

    lines.push(String::new());
    lines.push("Tickets:".to_string());
    if report.tickets.is_empty() {
        lines.push("- none".to_string());
    } else {
        for ticket in &report.tickets {
            lines.push(format!("- {}", ticket));
        }
    }

    lines.join("\n") + "\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctor::{CheckResult, DiagnosticReport, DoctorInputs, JobReport, Summary};
    use std::collections::BTreeSet;

    fn sample_report() -> DiagnosticReport {
        DiagnosticReport {
            schema_version: ops_common::SCHEMA_VERSION,
            started_at: chrono::Utc::now(),
            base_url: "http://127.0.0.1:8420".to_string(),
            inputs: DoctorInputs {
                symbol: "AAPL".to_string(),
                model_type: "lstm".to_string(),
                epochs: 1,
                timeout: 600,
            },
            checks: vec![CheckResult {
                name: "A_HEALTH".to_string(),
                endpoint: "GET /health".to_string(),
                ok: false,
                status_code: None,
                details: "connection refused".to_string(),
                payload: serde_json::Value::Null,
                duration_seconds: 0.021,
            }],
            classifications: {
                let mut set = BTreeSet::new();
                set.insert(crate::doctor::Classification::BackendDown);
                set
            },
            job: JobReport {
                job_id: None,
                final_status: "not_started".to_string(),
                error: None,
                poll_count: 0,
                last_payload: serde_json::Value::Null,
            },
            summary: Summary { ok: false, reason: "backend down".to_string() },
            tickets: Vec::new(),
        }
    }

    #[test]
    fn test_format_report_text_layout() {
        let text = format_report_text(&sample_report());
        assert!(text.starts_with("opsctl Doctor Report"));
        assert!(text.contains("Overall OK: false"));
        assert!(text.contains("- BACKEND_DOWN"));
        assert!(text.contains("- A_HEALTH: FAIL | GET /health | HTTP=none | connection refused"));
        assert!(text.contains("- job_id: none"));
        assert!(text.contains("Tickets:\n- none"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_write_report_creates_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let (json_path, txt_path) = write_report(&sample_report(), dir.path()).unwrap();

        assert!(json_path.exists());
        assert!(txt_path.exists());
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["summary"]["ok"], serde_json::json!(false));
        assert_eq!(json["classifications"][0], serde_json::json!("BACKEND_DOWN"));
    }
}
