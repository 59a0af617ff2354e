//! Environment-driven runtime configuration.

use std::time::Duration;

use stepcoach_push::PushProtocol;
use stepcoach_transport::validate_base_url;
use stepcoach_ui::PresentationMode;
use url::Url;

use crate::AppError;
use crate::retry::{Backoff, RetryPolicy};

/// Default analysis backend.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";
/// Default push socket.
pub const DEFAULT_PUSH_URL: &str = "ws://localhost:5000";
/// Capture kill-switch variable.
pub const CAPTURE_ENABLED_VAR: &str = "STEPCOACH_CAPTURE_ENABLED";

const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;
const EXPONENTIAL_FACTOR: f64 = 2.0;

/// Credentials for the PostgREST lesson store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    /// Project URL.
    pub url: String,
    /// Service or anon key.
    pub key: String,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Analysis backend base URL.
    pub api_url: Url,
    /// Push socket URL as configured.
    pub push_url: String,
    /// Push framing.
    pub push_protocol: PushProtocol,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Poll pacing.
    pub retry: RetryPolicy,
    /// Overlay presentation.
    pub presentation: PresentationMode,
    /// Capture kill switch.
    pub capture_enabled: bool,
    /// Lesson store credentials, when both are set.
    pub supabase: Option<SupabaseConfig>,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for malformed values.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`; unset or blank values use
    /// defaults.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for malformed values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_url = get("STEPCOACH_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_url = validate_base_url(&api_url)
            .map_err(|error| AppError::Config(format!("STEPCOACH_API_URL: {error}")))?;

        let push_url = get("STEPCOACH_PUSH_URL").unwrap_or_else(|| DEFAULT_PUSH_URL.to_string());
        let push_protocol = match get("STEPCOACH_PUSH_PROTOCOL") {
            Some(value) => value
                .parse::<PushProtocol>()
                .map_err(|error| AppError::Config(format!("STEPCOACH_PUSH_PROTOCOL: {error}")))?,
            None => PushProtocol::default(),
        };
        stepcoach_push::frame::socket_url(&push_url, push_protocol)
            .map_err(|error| AppError::Config(format!("STEPCOACH_PUSH_URL: {error}")))?;

        let interval =
            positive_millis(&get, "STEPCOACH_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?;
        let request_timeout =
            positive_millis(&get, "STEPCOACH_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT_MS)?;
        let max_attempts = match get("STEPCOACH_MAX_ATTEMPTS") {
            Some(value) => match value.parse::<u32>() {
                Ok(0) | Err(_) => {
                    return Err(AppError::Config(format!(
                        "STEPCOACH_MAX_ATTEMPTS: expected a positive integer, got '{value}'"
                    )));
                }
                Ok(max) => Some(max),
            },
            None => None,
        };
        let backoff = match get("STEPCOACH_BACKOFF")
            .map(|value| value.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("fixed") => Backoff::Fixed,
            Some("exponential") => Backoff::Exponential {
                factor: EXPONENTIAL_FACTOR,
                max: positive_millis(&get, "STEPCOACH_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS)?,
            },
            Some(other) => {
                return Err(AppError::Config(format!(
                    "STEPCOACH_BACKOFF: unknown backoff '{other}'"
                )));
            }
        };
        let jitter = millis(&get, "STEPCOACH_JITTER_MS", 0)?;

        let presentation = match get("STEPCOACH_PRESENTATION") {
            Some(value) => value
                .parse::<PresentationMode>()
                .map_err(|error| AppError::Config(format!("STEPCOACH_PRESENTATION: {error}")))?,
            None => PresentationMode::default(),
        };

        let supabase = match (get("SUPABASE_URL"), get("SUPABASE_KEY")) {
            (Some(url), Some(key)) => Some(SupabaseConfig { url, key }),
            _ => None,
        };

        Ok(Self {
            api_url,
            push_url,
            push_protocol,
            request_timeout,
            retry: RetryPolicy {
                interval,
                max_attempts,
                backoff,
                jitter,
            },
            presentation,
            capture_enabled: capture_enabled_from_value(lookup(CAPTURE_ENABLED_VAR).as_deref()),
            supabase,
        })
    }
}

fn millis<G>(get: &G, name: &str, default: u64) -> Result<Duration, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => value.parse::<u64>().map(Duration::from_millis).map_err(|_| {
            AppError::Config(format!("{name}: expected milliseconds, got '{value}'"))
        }),
        None => Ok(Duration::from_millis(default)),
    }
}

fn positive_millis<G>(get: &G, name: &str, default: u64) -> Result<Duration, AppError>
where
    G: Fn(&str) -> Option<String>,
{
    let duration = millis(get, name, default)?;
    if duration.is_zero() {
        return Err(AppError::Config(format!(
            "{name}: expected a positive number of milliseconds, got 0"
        )));
    }
    Ok(duration)
}

/// Checks the runtime kill-switch env var.
///
/// Semantics:
/// - Unset => capture enabled.
/// - `0`, `false`, `off` (case-insensitive) => capture disabled.
/// - Any other value => capture enabled.
pub fn capture_enabled_from_env() -> bool {
    capture_enabled_from_value(std::env::var(CAPTURE_ENABLED_VAR).ok().as_deref())
}

fn capture_enabled_from_value(value: Option<&str>) -> bool {
    match value {
        Some(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_switch_values() {
        assert!(capture_enabled_from_value(None));
        assert!(capture_enabled_from_value(Some("yes")));
        assert!(!capture_enabled_from_value(Some(" OFF ")));
        assert!(!capture_enabled_from_value(Some("0")));
    }
}
