//! Shared fixtures for app integration tests.

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stepcoach_app::{LoopEvent, RetryPolicy};
use stepcoach_transport::{BackendClient, HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Pending verdict used once a script runs dry.
#[allow(dead_code)]
pub const PENDING: &str = r#"{"status":"not_completed","completed":false}"#;

/// Start-step answer once no step is left.
#[allow(dead_code)]
pub const LESSON_END: &str = r#"{"status":"end","message":"Lesson or step not found"}"#;

type Hook = Box<dyn Fn(usize) + Send + Sync>;

/// Scripted analysis backend answering by request path.
pub struct ScriptedBackend {
    screenshots: Mutex<VecDeque<(u16, String)>>,
    start_steps: Mutex<VecDeque<String>>,
    submitted: Mutex<Vec<serde_json::Value>>,
    start_calls: Mutex<usize>,
    on_screenshot: Option<Hook>,
}

#[allow(dead_code)]
impl ScriptedBackend {
    /// Backend answering `/screenshot` with `verdicts` in order (status 200).
    pub fn new(verdicts: &[&str]) -> Self {
        Self {
            screenshots: Mutex::new(
                verdicts
                    .iter()
                    .map(|verdict| (200, (*verdict).to_string()))
                    .collect(),
            ),
            start_steps: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            start_calls: Mutex::new(0),
            on_screenshot: None,
        }
    }

    /// Answers `/screenshot` with `(status, body)` pairs in order.
    pub fn with_responses(responses: &[(u16, &str)]) -> Self {
        let backend = Self::new(&[]);
        *backend.screenshots.lock().expect("script lock") = responses
            .iter()
            .map(|(status, body)| (*status, (*body).to_string()))
            .collect();
        backend
    }

    /// Answers `/api/start-step` with `steps` in order.
    pub fn with_start_steps(self, steps: &[&str]) -> Self {
        *self.start_steps.lock().expect("script lock") =
            steps.iter().map(|step| (*step).to_string()).collect();
        self
    }

    /// Runs `hook` with the one-based submission number before answering.
    pub fn on_screenshot(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_screenshot = Some(Box::new(hook));
        self
    }

    /// Bodies of every `/screenshot` request, in order.
    pub fn submitted(&self) -> Vec<serde_json::Value> {
        self.submitted.lock().expect("submitted lock").clone()
    }

    /// Number of `/api/start-step` calls.
    pub fn start_calls(&self) -> usize {
        *self.start_calls.lock().expect("start lock")
    }
}

impl HttpTransport for ScriptedBackend {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        match request.url.path() {
            "/screenshot" => {
                let body = request
                    .body
                    .as_deref()
                    .and_then(|body| serde_json::from_slice(body).ok())
                    .unwrap_or(serde_json::Value::Null);
                let count = {
                    let mut submitted = self.submitted.lock().expect("submitted lock");
                    submitted.push(body);
                    submitted.len()
                };
                if let Some(hook) = &self.on_screenshot {
                    hook(count);
                }
                let (status, body) = self
                    .screenshots
                    .lock()
                    .expect("script lock")
                    .pop_front()
                    .unwrap_or((200, PENDING.to_string()));
                Ok(HttpResponse { status, body })
            }
            "/api/start-step" => {
                *self.start_calls.lock().expect("start lock") += 1;
                let body = self
                    .start_steps
                    .lock()
                    .expect("script lock")
                    .pop_front()
                    .unwrap_or_else(|| LESSON_END.to_string());
                Ok(HttpResponse { status: 200, body })
            }
            other => Ok(HttpResponse {
                status: 404,
                body: format!("no route for {other}"),
            }),
        }
    }
}

/// Client over `backend`.
#[allow(dead_code)]
pub fn client(backend: Arc<ScriptedBackend>) -> BackendClient {
    BackendClient::new("http://backend.test", backend).expect("client should build")
}

/// Unbounded fixed policy with a 1 ms interval.
#[allow(dead_code)]
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(1))
}

/// Drains every event already sent.
#[allow(dead_code)]
pub fn drain(events: &Receiver<LoopEvent>) -> Vec<LoopEvent> {
    events.try_iter().collect()
}

/// Number of captures taken per started step, in order.
#[allow(dead_code)]
pub fn captures_per_step(events: &[LoopEvent]) -> Vec<usize> {
    let mut counts = Vec::new();
    for event in events {
        match event {
            LoopEvent::StepStarted(_) => counts.push(0),
            LoopEvent::CaptureTaken { .. } => {
                if let Some(last) = counts.last_mut() {
                    *last += 1;
                }
            }
            _ => {}
        }
    }
    counts
}
