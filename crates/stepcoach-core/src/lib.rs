#![warn(missing_docs)]
//! # stepcoach-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `stepcoach` workspace.
//!
//! ## Responsibilities
//! - Represent lessons, their ordered steps, and optional sub-steps.
//! - Represent transient screen captures and the analysis request body built
//!   from them.
//! - Represent the backend verdict ([`ProgressSignal`]) and the active step
//!   descriptor ([`StepInfo`]).
//! - Validate lesson step ordering (unique, contiguous `lesson_order`).
//!
//! ## Data flow
//! The lesson store yields [`Lesson`] and [`Step`] rows -> the progress loop
//! takes a [`Capture`] per poll -> [`AnalysisRequest`] is serialized for the
//! analysis endpoint -> the response becomes a [`ProgressSignal`].
//!
//! ## Ownership and lifetimes
//! All values own their strings and payloads. Captures are moved into one
//! request and dropped afterwards; nothing here is persisted.
//!
//! ## Error model
//! Validation failures return [`CoreError`] variants.
//!
//! ## Security and privacy notes
//! Capture payloads hold live screen content. Callers must never log
//! [`Capture::image_base64`] directly.
//!
//! ## Example
//! ```rust
//! use stepcoach_core::{Lesson, Step};
//!
//! let steps = vec![
//!     Step::new(11, 1, 2, "Save", "Press save", Some("file saved")),
//!     Step::new(10, 1, 1, "Open", "Open the editor", None),
//! ];
//! let lesson = Lesson::new(1, steps).expect("contiguous ordering");
//! assert_eq!(lesson.steps[0].lesson_order, 1);
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Top-level instructional unit made of ordered steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    /// Datastore identifier.
    pub id: i64,
    /// Steps sorted by ascending `lesson_order`.
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Set once every step of the lesson has completed.
    #[serde(default)]
    pub is_finished: bool,
}

impl Lesson {
    /// Builds an unfinished lesson with validated step ordering.
    ///
    /// # Errors
    /// See [`ordered_steps`].
    pub fn new(id: i64, steps: Vec<Step>) -> Result<Self, CoreError> {
        Ok(Self {
            id,
            steps: ordered_steps(id, steps)?,
            is_finished: false,
        })
    }

    /// Returns the ordinal of the final step, if any.
    pub fn last_order(&self) -> Option<u32> {
        self.steps.last().map(|step| step.lesson_order)
    }
}

/// One actionable unit within a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Datastore identifier.
    pub id: i64,
    /// Parent lesson id (back-reference only).
    pub lesson_id: i64,
    /// Ordinal position inside the lesson.
    #[serde(alias = "step_order")]
    pub lesson_order: u32,
    /// Display name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    /// Display description.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    /// Free-text completion condition, forwarded verbatim to the analysis
    /// endpoint.
    #[serde(default)]
    pub finish_criteria: Option<String>,
    /// Nested sub-steps (one level only).
    #[serde(default)]
    pub sub_steps: Vec<SubStep>,
}

impl Step {
    /// Convenience constructor without sub-steps.
    pub fn new(
        id: i64,
        lesson_id: i64,
        lesson_order: u32,
        name: impl Into<String>,
        description: impl Into<String>,
        finish_criteria: Option<&str>,
    ) -> Self {
        Self {
            id,
            lesson_id,
            lesson_order,
            name: name.into(),
            description: description.into(),
            finish_criteria: finish_criteria.map(str::to_string),
            sub_steps: Vec::new(),
        }
    }
}

/// Display-only child of a [`Step`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStep {
    /// Display name.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    /// Display description.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
}

/// Sorts steps by `lesson_order` and validates lesson invariants.
///
/// # Errors
/// - [`CoreError::ForeignStep`] when a step belongs to another lesson.
/// - [`CoreError::StepOrderViolation`] when ordinals repeat or leave gaps.
pub fn ordered_steps(lesson_id: i64, mut steps: Vec<Step>) -> Result<Vec<Step>, CoreError> {
    if let Some(foreign) = steps.iter().find(|step| step.lesson_id != lesson_id) {
        return Err(CoreError::ForeignStep {
            step_id: foreign.id,
            lesson_id,
        });
    }

    steps.sort_by_key(|step| step.lesson_order);
    for pair in steps.windows(2) {
        if pair[0].lesson_order.checked_add(1) != Some(pair[1].lesson_order) {
            return Err(CoreError::StepOrderViolation {
                lesson_id,
                previous: pair[0].lesson_order,
                next: pair[1].lesson_order,
            });
        }
    }

    Ok(steps)
}

/// Resolution of the captured display in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayResolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Metadata describing one capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    /// Encoded image size in bytes (before base64).
    pub size: usize,
    /// Display resolution at capture time.
    pub display: DisplayResolution,
    /// RFC 3339 capture timestamp.
    pub timestamp: String,
}

/// A single screen snapshot prepared for analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Base64-encoded PNG.
    pub image_base64: String,
    /// Capture metadata.
    pub metadata: CaptureMetadata,
}

impl Capture {
    /// Builds a capture, rejecting empty payloads.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyCapture`] when `image_base64` is blank.
    pub fn new(image_base64: String, metadata: CaptureMetadata) -> Result<Self, CoreError> {
        if image_base64.trim().is_empty() {
            return Err(CoreError::EmptyCapture);
        }
        Ok(Self {
            image_base64,
            metadata,
        })
    }

    /// Returns `true` when the payload carries no image data.
    pub fn is_empty(&self) -> bool {
        self.image_base64.trim().is_empty()
    }
}

/// Body of `POST /screenshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Base64 image payload.
    pub image: String,
    /// Optional capture metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CaptureMetadata>,
    /// Optional opaque completion condition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_criteria: Option<String>,
    /// Asks the backend not to track per-user step state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateless: Option<bool>,
}

impl AnalysisRequest {
    /// Builds a request body from a capture and optional criteria.
    pub fn from_capture(capture: &Capture, finish_criteria: Option<&str>) -> Self {
        Self {
            image: capture.image_base64.clone(),
            metadata: Some(capture.metadata.clone()),
            finish_criteria: finish_criteria.map(str::to_string),
            stateless: None,
        }
    }

    /// Sets the `stateless` flag.
    pub fn with_stateless(mut self, stateless: bool) -> Self {
        self.stateless = Some(stateless);
        self
    }

    /// Serializes the body to compact JSON bytes.
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Codec)
    }
}

/// Backend verdict for one submitted capture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressSignal {
    /// The active step is complete.
    pub completed: bool,
    /// The active lesson's last step just completed.
    pub lesson_completed: bool,
    /// Free-form analysis text, when the backend sends one.
    pub analysis: Option<String>,
}

impl ProgressSignal {
    /// Signal for a step that is still in progress.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Signal for a completed step that is not the last one.
    pub fn step_completed() -> Self {
        Self {
            completed: true,
            ..Self::default()
        }
    }

    /// Signal for the last step of a lesson.
    pub fn lesson_completed() -> Self {
        Self {
            completed: true,
            lesson_completed: true,
            analysis: None,
        }
    }
}

/// Start-step statuses meaning the backend has no step left to work on.
pub const LESSON_END_STATUSES: [&str; 2] = ["end", "lesson_completed"];

/// Descriptor of the step the backend just activated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepInfo {
    /// Backend status string.
    pub status: String,
    /// Ordinal of the active step; `0` when the lesson has ended.
    pub step_order: u32,
    /// Owning lesson, when reported.
    pub lesson_id: Option<i64>,
    /// Display name, when reported.
    pub name: Option<String>,
    /// Display description, when reported.
    pub description: Option<String>,
    /// Completion condition to echo on submissions.
    pub finish_criteria: Option<String>,
}

impl StepInfo {
    /// Returns `true` when the status reports that no step remains.
    pub fn ends_lesson(&self) -> bool {
        LESSON_END_STATUSES.contains(&self.status.as_str())
    }
}

impl From<&Step> for StepInfo {
    fn from(step: &Step) -> Self {
        Self {
            status: "active".to_string(),
            step_order: step.lesson_order,
            lesson_id: Some(step.lesson_id),
            name: Some(step.name.clone()),
            description: Some(step.description.clone()),
            finish_criteria: step.finish_criteria.clone(),
        }
    }
}

/// Error type for model validation and codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Capture payload is empty.
    #[error("capture payload is empty")]
    EmptyCapture,
    /// Step ordinals are duplicated or non-contiguous.
    #[error("lesson {lesson_id}: step order {next} does not follow {previous}")]
    StepOrderViolation {
        /// Lesson being validated.
        lesson_id: i64,
        /// Preceding ordinal.
        previous: u32,
        /// Offending ordinal.
        next: u32,
    },
    /// A step references a different lesson.
    #[error("step {step_id} does not belong to lesson {lesson_id}")]
    ForeignStep {
        /// Offending step.
        step_id: i64,
        /// Lesson being validated.
        lesson_id: i64,
    },
    /// JSON encoding failure.
    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
