//! HTTP probe client.
//!
//! Every endpoint interaction goes through [`HttpProbe`]. A probe never
//! returns `Err`: transport failures, non-2xx statuses, and non-JSON bodies
//! are all folded into the returned [`ProbeResult`] so callers can treat
//! outcomes as data. Probes are single-shot; retry policy belongs to the
//! polling loops that call them.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};

/// Outcome of a single HTTP probe. Immutable once returned.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// True only for a 2xx/3xx response with a JSON (or empty) body.
    pub success: bool,
    /// HTTP status, when a response was received at all.
    pub status_code: Option<u16>,
    /// Parsed body; `{"raw": <text>}` when the body was not JSON, `{}` when
    /// the body was empty, `null` when no body was received.
    pub payload: Value,
    /// Failure description; empty on success.
    pub error: String,
}

impl ProbeResult {
    fn transport(error: String) -> Self {
        ProbeResult { success: false, status_code: None, payload: Value::Null, error }
    }

    /// True when the payload is a JSON object.
    pub fn is_object(&self) -> bool {
        self.payload.is_object()
    }
}

/// Synchronous HTTP client for backend probing.
pub struct HttpProbe {
    client: Client,
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpProbe {
    pub fn new() -> Self {
        HttpProbe { client: Client::new() }
    }

    /// GET `url` with a per-call timeout.
    pub fn get(&self, url: &str, timeout: Duration) -> ProbeResult {
        self.call(Method::GET, url, timeout, None)
    }

    /// POST a JSON body to `url` with a per-call timeout.
    pub fn post(&self, url: &str, timeout: Duration, body: &Value) -> ProbeResult {
        self.call(Method::POST, url, timeout, Some(body))
    }

    /// Issue a single request. Never returns `Err`.
    pub fn call(
        &self,
        method: Method,
        url: &str,
        timeout: Duration,
        body: Option<&Value>,
    ) -> ProbeResult {
        let mut request = self
            .client
            .request(method, url)
            .timeout(timeout)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send() {
            Ok(response) => response,
            Err(err) => return ProbeResult::transport(err.to_string()),
        };

        let status = response.status().as_u16();
        let text = match response.text() {
            Ok(text) => text,
            Err(err) => {
                return ProbeResult {
                    success: false,
                    status_code: Some(status),
                    payload: Value::Null,
                    error: format!("failed to read response body: {}", err),
                }
            }
        };

        let (payload, json_ok) = if text.trim().is_empty() {
            (json!({}), true)
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => (value, true),
                Err(_) => (json!({ "raw": text }), false),
            }
        };

        if status >= 400 {
            return ProbeResult {
                success: false,
                status_code: Some(status),
                payload,
                error: format!("HTTP {}", status),
            };
        }
        if !json_ok {
            return ProbeResult {
                success: false,
                status_code: Some(status),
                payload,
                error: "response was not valid JSON".to_string(),
            };
        }

        ProbeResult { success: true, status_code: Some(status), payload, error: String::new() }
    }
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
