//! Probe behavior against a live loopback server.

mod common;

use std::time::Duration;

use common::{closed_port_url, Scripted, ScriptedBackend};
use ops_core::health;
use ops_core::probe::{join_url, HttpProbe};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_json_object_response_succeeds() {
    let backend = ScriptedBackend::start(
        Vec::new(),
        Scripted::json(200, r#"{"status":"healthy","version":"1.2.3"}"#),
    );
    let probe = HttpProbe::new();

    let result = probe.get(&join_url(&backend.base_url, "/health"), TIMEOUT);
    assert!(result.success);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.payload["status"], "healthy");
    assert!(result.error.is_empty());
}

#[test]
fn test_non_json_body_is_wrapped_in_raw() {
    let backend =
        ScriptedBackend::start(Vec::new(), Scripted::text(200, "<html>Internal proxy page</html>"));
    let probe = HttpProbe::new();

    let result = probe.get(&backend.base_url, TIMEOUT);
    assert!(!result.success);
    assert_eq!(result.status_code, Some(200));
    assert_eq!(result.payload["raw"], "<html>Internal proxy page</html>");
    assert_eq!(result.error, "response was not valid JSON");
}

#[test]
fn test_error_status_keeps_parsed_payload() {
    let backend =
        ScriptedBackend::start(Vec::new(), Scripted::json(500, r#"{"detail":"boom"}"#));
    let probe = HttpProbe::new();

    let result = probe.get(&backend.base_url, TIMEOUT);
    assert!(!result.success);
    assert_eq!(result.status_code, Some(500));
    assert_eq!(result.error, "HTTP 500");
    assert_eq!(result.payload["detail"], "boom");
}

#[test]
fn test_empty_body_parses_as_empty_object() {
    let backend = ScriptedBackend::start(Vec::new(), Scripted::json(200, ""));
    let probe = HttpProbe::new();

    let result = probe.get(&backend.base_url, TIMEOUT);
    assert!(result.success);
    assert!(result.is_object());
    assert_eq!(result.payload, serde_json::json!({}));
}

#[test]
fn test_connection_refused_is_data_not_panic() {
    let probe = HttpProbe::new();

    let result = probe.get(&join_url(&closed_port_url(), "/health"), TIMEOUT);
    assert!(!result.success);
    assert_eq!(result.status_code, None);
    assert!(result.payload.is_null());
    assert!(!result.error.is_empty());
}

#[test]
fn test_wait_healthy_recovers_after_startup() {
    let backend = ScriptedBackend::start(
        vec![
            Scripted::json(200, r#"{"status":"starting"}"#),
            Scripted::json(200, r#"{"status":"starting"}"#),
        ],
        Scripted::json(200, r#"{"status":"healthy"}"#),
    );
    let probe = HttpProbe::new();

    let wait = health::wait_healthy(&probe, &backend.base_url, Duration::from_secs(20));
    assert!(wait.ok);
    assert_eq!(wait.last_detail, "status=healthy");
}

#[test]
fn test_wait_healthy_gives_up_at_deadline() {
    let backend =
        ScriptedBackend::start(Vec::new(), Scripted::json(200, r#"{"status":"starting"}"#));
    let probe = HttpProbe::new();

    // Sub-second deadlines clamp up to one second.
    let wait = health::wait_healthy(&probe, &backend.base_url, Duration::from_millis(1));
    assert!(!wait.ok);
    assert!(wait.elapsed >= Duration::from_secs(1));
    assert_eq!(wait.last_detail, "unexpected status=starting");
}

#[test]
fn test_wait_healthy_down_backend_reports_transport_detail() {
    let probe = HttpProbe::new();

    let wait = health::wait_healthy(&probe, &closed_port_url(), Duration::from_millis(1));
    assert!(!wait.ok);
    assert!(!wait.last_detail.is_empty());
}
