#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;

use tiny_http::{Header, Response, Server};

/// One canned HTTP response.
#[derive(Clone)]
pub struct Scripted {
    pub status: u16,
    pub body: String,
    pub content_type: &'static str,
}

impl Scripted {
    pub fn json(status: u16, body: &str) -> Scripted {
        Scripted { status, body: body.to_string(), content_type: "application/json" }
    }

    pub fn text(status: u16, body: &str) -> Scripted {
        Scripted { status, body: body.to_string(), content_type: "text/plain" }
    }
}

/// Scripted loopback backend.
///
/// Serves each queued response once, in order, regardless of path; after the
/// script runs out, the fallback response is served forever. Command flows
/// issue requests in a deterministic order, so path-agnostic scripting keeps
/// the fixture small. The serving thread blocks on the listener and is
/// dropped with the process.
pub struct ScriptedBackend {
    pub base_url: String,
}

impl ScriptedBackend {
    pub fn start(script: Vec<Scripted>, fallback: Scripted) -> ScriptedBackend {
        let server = Server::http("127.0.0.1:0").expect("bind loopback server");
        let addr = server.server_addr().to_ip().expect("loopback ip");
        let base_url = format!("http://{}", addr);

        let queue: Arc<Mutex<VecDeque<Scripted>>> = Arc::new(Mutex::new(script.into()));
        thread::spawn(move || {
            for request in server.incoming_requests() {
                let scripted =
                    queue.lock().unwrap().pop_front().unwrap_or_else(|| fallback.clone());
                let header =
                    Header::from_bytes(&b"Content-Type"[..], scripted.content_type.as_bytes())
                        .expect("static header");
                let response = Response::from_string(scripted.body)
                    .with_status_code(scripted.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        ScriptedBackend { base_url }
    }
}

/// A loopback URL nothing is listening on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}
