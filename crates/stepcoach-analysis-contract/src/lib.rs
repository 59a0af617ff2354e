#![warn(missing_docs)]
//! # stepcoach-analysis-contract
//!
//! ## Purpose
//! Defines the backend response contracts and maps them into typed values.
//!
//! ## Responsibilities
//! - Parse `POST /screenshot` responses into [`ProgressSignal`].
//! - Parse `POST /api/start-step` responses into [`StepInfo`].
//! - Parse `GET /health` and `POST /api/generate-lesson-plan` responses.
//! - Map legacy `status` strings when the boolean verdict is absent.
//!
//! ## Data flow
//! Raw JSON body from the transport -> `parse_*` -> typed value consumed by
//! the progress loop or the UI projection.
//!
//! ## Error model
//! Invalid JSON or missing mandatory fields return [`AnalysisContractError`].
//! Callers treat these like any other transport failure.

use serde::{Deserialize, Serialize};
use stepcoach_core::{LESSON_END_STATUSES, ProgressSignal, StepInfo};
use thiserror::Error;

/// Backend status reported while a step is still being worked on.
pub const STATUS_NOT_COMPLETED: &str = "not_completed";
/// Backend status for the first screenshot of a step (popup was pushed).
pub const STATUS_POPUP_SENT: &str = "popup_sent";
/// Backend status when the active step completed and the next one started.
pub const STATUS_STEP_ADVANCED: &str = "step_advanced";
/// Backend status when the last step of the lesson completed.
pub const STATUS_LESSON_COMPLETED: &str = "lesson_completed";
/// Backend status when no lesson or step is being tracked anymore.
pub const STATUS_END: &str = "end";

#[derive(Debug, Deserialize)]
struct RawAnalysisResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    lesson_completed: Option<bool>,
    #[serde(default)]
    analysis: Option<serde_json::Value>,
}

/// Parses a `/screenshot` response body into a progress signal.
///
/// An explicit `completed` field always wins over `status`. A signal that
/// reports `lesson_completed` is always `completed` too.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON.
/// Returns [`AnalysisContractError::InvalidContract`] when neither
/// `completed` nor `status` is present.
pub fn parse_analysis_response(raw: &str) -> Result<ProgressSignal, AnalysisContractError> {
    let parsed: RawAnalysisResponse =
        serde_json::from_str(raw).map_err(AnalysisContractError::Decode)?;

    let status = parsed.status.as_deref().map(str::trim);
    let (status_completed, status_lesson_completed) = match status {
        Some(STATUS_STEP_ADVANCED) => (true, false),
        Some(STATUS_LESSON_COMPLETED) | Some(STATUS_END) => (true, true),
        Some(_) => (false, false),
        None if parsed.completed.is_none() => {
            return Err(AnalysisContractError::InvalidContract(
                "response carries neither completed nor status".to_string(),
            ));
        }
        None => (false, false),
    };

    let lesson_completed = parsed.lesson_completed.unwrap_or(status_lesson_completed);
    let completed = parsed.completed.unwrap_or(status_completed) || lesson_completed;

    let analysis = parsed.analysis.and_then(|value| match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) => Some(text),
        other => Some(other.to_string()),
    });

    Ok(ProgressSignal {
        completed,
        lesson_completed,
        analysis,
    })
}

#[derive(Debug, Deserialize)]
struct RawStartStepResponse {
    #[serde(default)]
    status: String,
    step_order: Option<u32>,
    #[serde(default)]
    lesson_id: Option<i64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    finish_criteria: Option<String>,
}

/// Parses a `/api/start-step` response body.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON and
/// [`AnalysisContractError::InvalidContract`] when `status` is blank or
/// `step_order` is missing from a response that is not a lesson end.
pub fn parse_start_step_response(raw: &str) -> Result<StepInfo, AnalysisContractError> {
    let parsed: RawStartStepResponse =
        serde_json::from_str(raw).map_err(AnalysisContractError::Decode)?;

    if parsed.status.trim().is_empty() {
        return Err(AnalysisContractError::InvalidContract(
            "status is empty".to_string(),
        ));
    }
    let ends_lesson = LESSON_END_STATUSES.contains(&parsed.status.as_str());
    let step_order = match parsed.step_order {
        Some(step_order) => step_order,
        None if ends_lesson => 0,
        None => {
            return Err(AnalysisContractError::InvalidContract(
                "step_order is missing".to_string(),
            ));
        }
    };

    Ok(StepInfo {
        status: parsed.status,
        step_order,
        lesson_id: parsed.lesson_id,
        name: parsed.name,
        description: parsed.description,
        finish_criteria: parsed.finish_criteria,
    })
}

/// Backend liveness report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    /// `true` when the backend reported `"healthy"`.
    pub healthy: bool,
    /// Service name, when reported.
    pub service: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHealthResponse {
    status: String,
    #[serde(default)]
    service: Option<String>,
}

/// Parses a `/health` response body.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON.
pub fn parse_health_response(raw: &str) -> Result<HealthStatus, AnalysisContractError> {
    let parsed: RawHealthResponse =
        serde_json::from_str(raw).map_err(AnalysisContractError::Decode)?;
    Ok(HealthStatus {
        healthy: parsed.status.trim().eq_ignore_ascii_case("healthy"),
        service: parsed.service,
    })
}

/// One generated lesson-plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonPlanEntry {
    /// One-based step number.
    #[serde(default)]
    pub step: u32,
    /// Step title.
    #[serde(default)]
    pub title: String,
    /// What the learner should do.
    #[serde(default)]
    pub instruction: String,
    /// Completion condition, when generated.
    #[serde(default, alias = "finished_criteria")]
    pub finish_criteria: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLessonPlanResponse {
    data: RawLessonPlanData,
}

#[derive(Debug, Deserialize)]
struct RawLessonPlanData {
    generated_lesson_plan: Vec<LessonPlanEntry>,
}

/// Parses a `/api/generate-lesson-plan` response body.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] when the body is not JSON or
/// lacks `data.generated_lesson_plan`.
pub fn parse_lesson_plan_response(
    raw: &str,
) -> Result<Vec<LessonPlanEntry>, AnalysisContractError> {
    let parsed: RawLessonPlanResponse =
        serde_json::from_str(raw).map_err(AnalysisContractError::Decode)?;
    Ok(parsed.data.generated_lesson_plan)
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure.
    #[error("response decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Parsed payload violates contract invariants.
    #[error("response contract violation: {0}")]
    InvalidContract(String),
}
