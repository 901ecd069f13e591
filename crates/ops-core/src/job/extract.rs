//! Pure field-extraction helpers for job payloads.
//!
//! The backend's job responses vary across versions, so every field is
//! read through an alias list in priority order. These functions never
//! touch the network; the state machine in the parent module composes them.

use serde_json::Value;

/// Job id aliases, priority order. `job_id` wins over `id`.
pub const JOB_ID_ALIASES: [&str; 3] = ["job_id", "id", "jobId"];

/// Error-text aliases, priority order.
pub const ERROR_ALIASES: [&str; 4] = ["error", "detail", "message", "reason"];

/// Artifact-path aliases, priority order.
pub const ARTIFACT_ALIASES: [&str; 2] = ["model_path", "artifact_path"];

const LOG_LIST_ALIASES: [&str; 4] = ["logs", "log_lines", "history", "messages"];
const LOG_TEXT_ALIASES: [&str; 2] = ["log", "output"];

/// First alias whose value stringifies to non-empty text.
pub fn first_alias_text(payload: &Value, aliases: &[&str]) -> Option<String> {
    let obj = payload.as_object()?;
    for key in aliases {
        let Some(value) = obj.get(*key) else { continue };
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if !text.is_empty() {
            return Some(text);
        }
    }
    None
}

pub fn extract_job_id(payload: &Value) -> Option<String> {
    first_alias_text(payload, &JOB_ID_ALIASES)
}

pub fn extract_error_text(payload: &Value) -> Option<String> {
    first_alias_text(payload, &ERROR_ALIASES)
}

pub fn extract_artifact_path(payload: &Value) -> Option<String> {
    first_alias_text(payload, &ARTIFACT_ALIASES)
}

/// Collect log lines from list-valued and text-valued log fields.
pub fn extract_log_lines(payload: &Value) -> Vec<String> {
    let Some(obj) = payload.as_object() else {
        return Vec::new();
    };

    let mut lines = Vec::new();
    for key in LOG_LIST_ALIASES {
        if let Some(Value::Array(items)) = obj.get(key) {
            for item in items {
                let line = match item {
                    Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                if !line.is_empty() {
                    lines.push(line);
                }
            }
        }
    }

    for key in LOG_TEXT_ALIASES {
        if let Some(Value::String(text)) = obj.get(key) {
            lines.extend(
                text.lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(|line| line.to_string()),
            );
            break;
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_priority() {
        // job_id wins over id
        assert_eq!(
            extract_job_id(&json!({"job_id": "x", "id": "y"})),
            Some("x".to_string())
        );
        assert_eq!(extract_job_id(&json!({"id": "y"})), Some("y".to_string()));
        assert_eq!(extract_job_id(&json!({"jobId": "z"})), Some("z".to_string()));
    }

    #[test]
    fn test_job_id_skips_empty_and_null() {
        assert_eq!(
            extract_job_id(&json!({"job_id": "", "id": "y"})),
            Some("y".to_string())
        );
        assert_eq!(
            extract_job_id(&json!({"job_id": null, "id": "y"})),
            Some("y".to_string())
        );
        assert_eq!(extract_job_id(&json!({"job_id": "   "})), None);
    }

    #[test]
    fn test_job_id_stringifies_numbers() {
        assert_eq!(extract_job_id(&json!({"id": 42})), Some("42".to_string()));
    }

    #[test]
    fn test_job_id_non_object_payload() {
        assert_eq!(extract_job_id(&json!("42")), None);
        assert_eq!(extract_job_id(&json!(null)), None);
    }

    #[test]
    fn test_error_alias_order() {
        assert_eq!(
            extract_error_text(&json!({"detail": "d", "error": "e"})),
            Some("e".to_string())
        );
        assert_eq!(
            extract_error_text(&json!({"reason": "r", "message": "m"})),
            Some("m".to_string())
        );
        assert_eq!(extract_error_text(&json!({"status": "failed"})), None);
    }

    #[test]
    fn test_artifact_alias_order() {
        assert_eq!(
            extract_artifact_path(&json!({"artifact_path": "a", "model_path": "m"})),
            Some("m".to_string())
        );
    }

    #[test]
    fn test_log_lines_from_lists() {
        let payload = json!({
            "logs": ["epoch 1", "  ", "epoch 2"],
            "messages": ["saved"],
        });
        assert_eq!(extract_log_lines(&payload), vec!["epoch 1", "epoch 2", "saved"]);
    }

    #[test]
    fn test_log_lines_from_text_field() {
        let payload = json!({"log": "line one\n\nline two\n"});
        assert_eq!(extract_log_lines(&payload), vec!["line one", "line two"]);
    }

    #[test]
    fn test_log_lines_non_object() {
        assert!(extract_log_lines(&json!("nope")).is_empty());
    }
}
