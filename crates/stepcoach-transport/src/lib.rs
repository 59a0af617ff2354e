#![warn(missing_docs)]
//! # stepcoach-transport
//!
//! ## Purpose
//! Request/response client for the analysis backend.
//!
//! ## Responsibilities
//! - Define the injectable [`HttpTransport`] abstraction.
//! - Provide a blocking `reqwest` transport with a fixed per-request timeout.
//! - Log every request/response pair through [`LoggingTransport`].
//! - Expose typed backend operations on [`BackendClient`]: capture
//!   submission, step start, health check, lesson-plan generation.
//!
//! ## Data flow
//! Progress loop -> [`BackendClient::submit_capture`] -> JSON body ->
//! [`LoggingTransport`] -> [`ReqwestTransport`] -> response body ->
//! `stepcoach-analysis-contract` parser -> [`ProgressSignal`].
//!
//! ## Error model
//! Timeouts, network failures, and non-2xx answers become [`TransportError`].
//! Local validation failures (empty capture, blank topic) never touch the
//! network.
//!
//! ## Security and privacy notes
//! Logged bodies are summarized: screenshot payloads are fingerprinted and
//! credential headers redacted.

mod logging;

use std::sync::Arc;
use std::time::Duration;

use stepcoach_analysis_contract::{
    AnalysisContractError, HealthStatus, LessonPlanEntry, parse_analysis_response,
    parse_health_response, parse_lesson_plan_response, parse_start_step_response,
};
use stepcoach_core::{AnalysisRequest, Capture, CoreError, ProgressSignal, StepInfo};
use thiserror::Error;
use url::Url;

pub use logging::{LoggingTransport, redact_header, summarize_body};

/// Analysis endpoint path.
pub const SCREENSHOT_PATH: &str = "/screenshot";
/// Step activation endpoint path.
pub const START_STEP_PATH: &str = "/api/start-step";
/// Liveness endpoint path.
pub const HEALTH_PATH: &str = "/health";
/// Lesson-plan generation endpoint path.
pub const LESSON_PLAN_PATH: &str = "/api/generate-lesson-plan";
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP methods used by the backend contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PATCH`
    Patch,
}

impl HttpMethod {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

/// Outgoing request handed to an [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method.
    pub method: HttpMethod,
    /// Absolute request URL.
    pub url: Url,
    /// Extra headers as `(name, value)` pairs.
    pub headers: Vec<(String, String)>,
    /// Optional JSON body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request without headers or body.
    pub fn new(method: HttpMethod, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Adds one header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    pub fn with_json_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }
}

/// Raw response returned by an [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstract request/response transport.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; status classification happens in [`BackendClient`].
pub trait HttpTransport: Send + Sync {
    /// Sends one request and waits for its response.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking `reqwest` transport with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Builds a transport applying `timeout` to every request.
    ///
    /// # Errors
    /// Returns [`TransportError::Network`] when the HTTP client cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Network(format!("client init failed: {error}")))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        let response = builder.send().map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(error.to_string())
    }
}

/// Typed client for the analysis backend.
#[derive(Clone)]
pub struct BackendClient {
    base_url: Url,
    transport: LoggingTransport,
}

impl BackendClient {
    /// Creates a client for `base_url`; every exchange is logged.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidEndpoint`] when the URL does not parse
    /// or is not `http`/`https`.
    pub fn new(base_url: &str, transport: Arc<dyn HttpTransport>) -> Result<Self, TransportError> {
        let base_url = validate_base_url(base_url)?;
        Ok(Self {
            base_url,
            transport: LoggingTransport::new(transport),
        })
    }

    /// Returns the configured base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Submits one capture for analysis.
    ///
    /// # Errors
    /// Returns [`TransportError::EmptyCapture`] without any network call when
    /// the payload is empty; otherwise see [`BackendClient::submit_request`].
    pub fn submit_capture(
        &self,
        capture: &Capture,
        finish_criteria: Option<&str>,
    ) -> Result<ProgressSignal, TransportError> {
        if capture.is_empty() {
            return Err(TransportError::EmptyCapture);
        }
        self.submit_request(&AnalysisRequest::from_capture(capture, finish_criteria))
    }

    /// Submits a prepared analysis body.
    ///
    /// # Errors
    /// Returns [`TransportError::EmptyCapture`] for a blank image, transport
    /// failures, or [`TransportError::Contract`] when the response is not a
    /// valid verdict.
    pub fn submit_request(&self, request: &AnalysisRequest) -> Result<ProgressSignal, TransportError> {
        if request.image.trim().is_empty() {
            return Err(TransportError::EmptyCapture);
        }
        let body = request.to_json_bytes().map_err(TransportError::Encode)?;
        let raw = self.exchange(HttpMethod::Post, SCREENSHOT_PATH, Some(body))?;
        parse_analysis_response(&raw).map_err(TransportError::Contract)
    }

    /// Asks the backend to activate the next step.
    ///
    /// # Errors
    /// Transport failures or [`TransportError::Contract`].
    pub fn start_step(&self) -> Result<StepInfo, TransportError> {
        let raw = self.exchange(HttpMethod::Post, START_STEP_PATH, Some(b"{}".to_vec()))?;
        parse_start_step_response(&raw).map_err(TransportError::Contract)
    }

    /// Queries backend liveness.
    ///
    /// # Errors
    /// Transport failures or [`TransportError::Contract`].
    pub fn health_check(&self) -> Result<HealthStatus, TransportError> {
        let raw = self.exchange(HttpMethod::Get, HEALTH_PATH, None)?;
        parse_health_response(&raw).map_err(TransportError::Contract)
    }

    /// Requests a generated lesson plan for `topic`.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidRequest`] for a blank topic without a
    /// network call; otherwise transport or contract failures.
    pub fn generate_lesson_plan(&self, topic: &str) -> Result<Vec<LessonPlanEntry>, TransportError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TransportError::InvalidRequest("topic is empty".to_string()));
        }
        let body = serde_json::to_vec(&serde_json::json!({ "topic": topic }))
            .map_err(|error| TransportError::Encode(CoreError::Codec(error)))?;
        let raw = self.exchange(HttpMethod::Post, LESSON_PLAN_PATH, Some(body))?;
        parse_lesson_plan_response(&raw).map_err(TransportError::Contract)
    }

    fn exchange(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<String, TransportError> {
        let mut request = HttpRequest::new(method, endpoint_url(&self.base_url, path));
        request.body = body;

        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(TransportError::ServerError {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response.body)
    }
}

/// Parses and validates an `http`/`https` base URL.
///
/// # Errors
/// Returns [`TransportError::InvalidEndpoint`] for unparsable URLs and other
/// schemes.
pub fn validate_base_url(base_url: &str) -> Result<Url, TransportError> {
    let parsed = Url::parse(base_url)
        .map_err(|error| TransportError::InvalidEndpoint(format!("invalid url: {error}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(TransportError::InvalidEndpoint(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    Ok(parsed)
}

/// Appends `path` to the base URL path, keeping any base prefix.
pub fn endpoint_url(base_url: &Url, path: &str) -> Url {
    let mut url = base_url.clone();
    let joined = format!(
        "{}/{}",
        base_url.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(None);
    url
}

/// Transport layer error type.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded its timeout.
    #[error("request timed out")]
    Timeout,
    /// Connection-level failure.
    #[error("network failure: {0}")]
    Network(String),
    /// Backend answered with a non-2xx status.
    #[error("server error {status}: {body}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },
    /// Base URL is malformed or unsupported.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Capture payload was empty; nothing was sent.
    #[error("capture payload is empty")]
    EmptyCapture,
    /// Request parameters were rejected locally.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Request body could not be encoded.
    #[error("request encoding failed: {0}")]
    Encode(CoreError),
    /// Response violated its contract.
    #[error("contract violation: {0}")]
    Contract(AnalysisContractError),
}

impl TransportError {
    /// Returns `true` for failures that happened on the wire or at the
    /// backend, as opposed to local validation failures.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network(_) | Self::ServerError { .. } | Self::Contract(_)
        )
    }
}
