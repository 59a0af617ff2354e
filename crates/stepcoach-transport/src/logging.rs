//! Request/response logging interceptor.
//!
//! Wraps any [`HttpTransport`] and records method, URL, and a log-safe body
//! summary for every exchange. Logging never alters the result.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::{HttpRequest, HttpResponse, HttpTransport, TransportError};

const MAX_LOGGED_BODY_CHARS: usize = 512;
const SECRET_HEADERS: [&str; 3] = ["authorization", "apikey", "cookie"];

/// Transport decorator that logs every request/response pair.
#[derive(Clone)]
pub struct LoggingTransport {
    inner: Arc<dyn HttpTransport>,
}

impl LoggingTransport {
    /// Wraps `inner` with request/response logging.
    pub fn new(inner: Arc<dyn HttpTransport>) -> Self {
        Self { inner }
    }
}

impl HttpTransport for LoggingTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let headers = request
            .headers
            .iter()
            .map(|(name, value)| format!("{name}={}", redact_header(name, value)))
            .collect::<Vec<_>>()
            .join(",");
        info!(
            stage = "transport",
            action = "request",
            method = request.method.as_str(),
            url = %request.url,
            headers = %headers,
            body = %summarize_body(request.body.as_deref()),
            "sending request"
        );

        let result = self.inner.send(request);
        match &result {
            Ok(response) => info!(
                stage = "transport",
                action = "response",
                method = request.method.as_str(),
                url = %request.url,
                status = response.status,
                body = %truncate(&response.body),
                "response received"
            ),
            Err(error) => warn!(
                stage = "transport",
                action = "error",
                method = request.method.as_str(),
                url = %request.url,
                error = %error,
                "request failed"
            ),
        }
        result
    }
}

/// Returns a log-safe rendering of a JSON request body.
///
/// Base64 `image` fields are replaced by their length and a short SHA-256
/// fingerprint so screen content never reaches the logs.
pub fn summarize_body(body: Option<&[u8]>) -> String {
    let Some(body) = body else {
        return "<empty>".to_string();
    };

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(mut value) => {
            if let Some(image) = value.get_mut("image")
                && let Some(encoded) = image.as_str()
            {
                let digest = hex::encode(Sha256::digest(encoded.as_bytes()));
                let fingerprint =
                    format!("<base64 {} bytes sha256={}>", encoded.len(), &digest[..16]);
                *image = serde_json::Value::String(fingerprint);
            }
            truncate(&value.to_string())
        }
        Err(_) => format!("<{} bytes>", body.len()),
    }
}

/// Redacts credential-bearing header values.
pub fn redact_header(name: &str, value: &str) -> String {
    if SECRET_HEADERS
        .iter()
        .any(|secret| name.eq_ignore_ascii_case(secret))
    {
        "<redacted>".to_string()
    } else {
        value.to_string()
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_LOGGED_BODY_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_LOGGED_BODY_CHARS).collect();
    format!("{kept}…")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_fields_are_fingerprinted() {
        let body = br#"{"image":"aGVsbG8=","finish_criteria":"saved"}"#;
        let summary = summarize_body(Some(body.as_slice()));
        assert!(summary.contains("<base64 8 bytes sha256="));
        assert!(summary.contains("saved"));
        assert!(!summary.contains("aGVsbG8="));
    }

    #[test]
    fn secrets_are_redacted() {
        assert_eq!(redact_header("Authorization", "Bearer abc"), "<redacted>");
        assert_eq!(redact_header("apikey", "abc"), "<redacted>");
        assert_eq!(redact_header("Prefer", "return=minimal"), "return=minimal");
    }

    #[test]
    fn non_json_bodies_report_length_only() {
        assert_eq!(summarize_body(Some(b"\x00\x01".as_slice())), "<2 bytes>");
        assert_eq!(summarize_body(None), "<empty>");
    }
}
