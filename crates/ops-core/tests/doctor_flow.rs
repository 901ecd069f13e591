//! End-to-end doctor runs against scripted backends.

mod common;

use std::time::Duration;

use common::{closed_port_url, Scripted, ScriptedBackend};
use ops_core::doctor::{self, Classification, DoctorOptions};
use ops_core::probe::HttpProbe;

fn fast_options() -> DoctorOptions {
    DoctorOptions {
        job_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(10),
        ..DoctorOptions::default()
    }
}

/// The four checks up to and including a successful enqueue.
fn happy_preamble() -> Vec<Scripted> {
    vec![
        Scripted::json(200, r#"{"status":"healthy"}"#),
        Scripted::json(200, r#"{"service":"backend","uptime":12}"#),
        Scripted::json(200, r#"{"torch_available":true,"cuda_available":false}"#),
        Scripted::json(200, r#"{"job_id":"7"}"#),
    ]
}

#[test]
fn test_down_backend_short_circuits_after_health() {
    let probe = HttpProbe::new();

    let report = doctor::run_checks(&probe, &closed_port_url(), &fast_options());

    assert_eq!(report.checks.len(), 1);
    assert_eq!(report.checks[0].name, "A_HEALTH");
    assert!(!report.checks[0].ok);
    assert_eq!(
        report.classifications.iter().collect::<Vec<_>>(),
        vec![&Classification::BackendDown]
    );
    assert_eq!(report.job.job_id, None);
    assert_eq!(report.job.final_status, "not_started");
    assert!(!report.summary.ok);
    assert_eq!(report.summary.reason, "backend down");
}

#[test]
fn test_clean_run_passes_all_checks_in_order() {
    let mut script = happy_preamble();
    script.push(Scripted::json(200, r#"{"status":"RUNNING"}"#));
    script.push(Scripted::json(200, r#"{"status":"completed","model_path":"/tmp/m.pt"}"#));
    let backend =
        ScriptedBackend::start(script, Scripted::json(200, r#"{"status":"completed"}"#));
    let probe = HttpProbe::new();

    let report = doctor::run_checks(&probe, &backend.base_url, &fast_options());

    let names: Vec<&str> = report.checks.iter().map(|check| check.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "A_HEALTH",
            "B_API_STATUS",
            "C_DL_STATUS",
            "D_START_DL_JOB",
            "D_POLL_DL_JOB",
            "D_POLL_DL_JOB",
        ]
    );
    assert!(report.checks.iter().all(|check| check.ok));
    assert!(report.classifications.is_empty());
    assert_eq!(report.job.job_id.as_deref(), Some("7"));
    assert_eq!(report.job.final_status, "success");
    assert_eq!(report.job.poll_count, 2);
    assert!(report.summary.ok);
    assert_eq!(report.summary.reason, "success");
}

#[test]
fn test_missing_torch_classified_from_job_error() {
    let mut script = happy_preamble();
    script.push(Scripted::json(
        200,
        r#"{"status":"failed","error":"ModuleNotFoundError: No module named 'torch'"}"#,
    ));
    let backend = ScriptedBackend::start(script, Scripted::json(200, r#"{"status":"failed"}"#));
    let probe = HttpProbe::new();

    let report = doctor::run_checks(&probe, &backend.base_url, &fast_options());

    assert!(report.classifications.contains(&Classification::MissingTorch));
    assert!(!report.classifications.contains(&Classification::ApiContractInconsistent));
    assert_eq!(report.job.final_status, "failed");
    assert!(report.job.error.as_deref().unwrap().contains("torch"));
    assert!(!report.summary.ok);
}

#[test]
fn test_stuck_job_classified_as_timeout() {
    let backend = ScriptedBackend::start(
        happy_preamble(),
        Scripted::json(200, r#"{"status":"RUNNING"}"#),
    );
    let probe = HttpProbe::new();

    let options = DoctorOptions {
        job_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(50),
        ..DoctorOptions::default()
    };
    let report = doctor::run_checks(&probe, &backend.base_url, &options);

    assert!(report.classifications.contains(&Classification::DlJobTimeout));
    assert_eq!(report.job.final_status, "timeout");
    assert!(report.job.poll_count >= 1);
    assert!(!report.summary.ok);
}

#[test]
fn test_malformed_status_endpoint_is_recorded_but_not_fatal() {
    let script = vec![
        Scripted::json(200, r#"{"status":"healthy"}"#),
        Scripted::text(200, "<html>login page</html>"),
        Scripted::json(200, r#"{"torch_available":false}"#),
        Scripted::json(200, r#"{"job_id":"7"}"#),
        Scripted::json(200, r#"{"status":"completed"}"#),
    ];
    let backend =
        ScriptedBackend::start(script, Scripted::json(200, r#"{"status":"completed"}"#));
    let probe = HttpProbe::new();

    let report = doctor::run_checks(&probe, &backend.base_url, &fast_options());

    let api_status = report.checks.iter().find(|check| check.name == "B_API_STATUS").unwrap();
    assert!(!api_status.ok);
    assert!(report.classifications.contains(&Classification::ApiContractInconsistent));
    // The run still reached the job and saw it complete.
    assert_eq!(report.job.final_status, "success");
    assert!(!report.summary.ok);
    assert_eq!(report.summary.reason, "issues detected");
}

#[test]
fn test_enqueue_rejection_marks_start_failed() {
    let script = vec![
        Scripted::json(200, r#"{"status":"healthy"}"#),
        Scripted::json(200, "{}"),
        Scripted::json(200, "{}"),
        Scripted::json(503, r#"{"error":"queue full"}"#),
    ];
    let backend = ScriptedBackend::start(script, Scripted::json(503, "{}"));
    let probe = HttpProbe::new();

    let report = doctor::run_checks(&probe, &backend.base_url, &fast_options());

    assert!(report.classifications.contains(&Classification::ApiContractInconsistent));
    assert_eq!(report.job.job_id, None);
    assert_eq!(report.job.final_status, "start_failed");
    assert_eq!(report.job.error.as_deref(), Some("HTTP 503"));
    assert_eq!(report.summary.reason, "job start failed");
}
