#![warn(missing_docs)]
//! # stepcoach-ui
//!
//! ## Purpose
//! Defines the presentation-facing state model for `stepcoach`.
//!
//! ## Responsibilities
//! - Hold the overlay content (`{header, body}`) pushed by the backend.
//! - Track capture, network, and push stage statuses.
//! - Project the active step and lesson-plan results into display text.
//! - Render the state for windowed or headless presentation.
//!
//! ## Data flow
//! Push events and progress-loop notifications mutate [`UiState`]; the host
//! shell renders it after each change.
//!
//! ## Ownership and lifetimes
//! `UiState` owns all of its strings so reducers can run on whichever thread
//! receives the event.
//!
//! ## Error model
//! Only presentation-mode parsing can fail. Failures elsewhere are shown as
//! fixed user-facing strings, never raw error detail.
//!
//! ## Security and privacy notes
//! UI state never holds capture pixels, API keys, or backend error bodies.

use std::fmt::Display;
use std::str::FromStr;

use stepcoach_analysis_contract::LessonPlanEntry;
use stepcoach_core::StepInfo;
use stepcoach_push::PushEvent;
use thiserror::Error;

/// Message shown when lesson-plan generation fails for any reason.
pub const LESSON_PLAN_ERROR: &str = "Failed to generate lesson plan. Please try again.";

/// How the overlay is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentationMode {
    /// Decorated overlay window with a status line.
    #[default]
    Windowed,
    /// Transparent, chrome-less overlay showing only pushed content.
    Headless,
}

impl FromStr for PresentationMode {
    type Err = UnknownPresentationMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "windowed" | "window" => Ok(Self::Windowed),
            "headless" | "transparent" => Ok(Self::Headless),
            other => Err(UnknownPresentationMode(other.to_string())),
        }
    }
}

/// Presentation mode string was not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown presentation mode '{0}'")]
pub struct UnknownPresentationMode(pub String);

/// Generic stage status for capture/network/push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Stage has not started.
    Idle,
    /// Stage is currently running.
    Running,
    /// Last operation succeeded.
    Healthy,
    /// Last operation failed; the loop keeps retrying.
    Degraded,
}

/// Content currently shown in the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayContent {
    /// Short heading.
    pub header: String,
    /// Body text.
    pub body: String,
}

impl From<&PushEvent> for OverlayContent {
    fn from(event: &PushEvent) -> Self {
        Self {
            header: event.header.clone(),
            body: event.body.clone(),
        }
    }
}

/// Aggregate presentation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Presentation mode.
    pub mode: PresentationMode,
    /// Overlay content, `None` until something is pushed.
    pub overlay: Option<OverlayContent>,
    /// Title of the active step.
    pub active_step: Option<String>,
    /// Capture stage status.
    pub capture: StageStatus,
    /// Backend request stage status.
    pub network: StageStatus,
    /// Push channel status.
    pub push: StageStatus,
    /// Human-readable progress status.
    pub status: String,
}

impl UiState {
    /// Creates idle UI state.
    pub fn new(version: impl Into<String>, mode: PresentationMode) -> Self {
        Self {
            version: version.into(),
            mode,
            overlay: None,
            active_step: None,
            capture: StageStatus::Idle,
            network: StageStatus::Idle,
            push: StageStatus::Idle,
            status: "Waiting for a step".to_string(),
        }
    }

    /// Replaces overlay content with a pushed event.
    pub fn apply_push_event(&mut self, event: &PushEvent) {
        self.overlay = Some(OverlayContent::from(event));
    }

    /// Marks the push channel connected or lost.
    pub fn set_push_connected(&mut self, connected: bool) {
        self.push = if connected {
            StageStatus::Healthy
        } else {
            StageStatus::Degraded
        };
    }

    /// Shows a newly activated step.
    pub fn show_step(&mut self, step: &StepInfo) {
        let title = step
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("Step {}", step.step_order));
        self.status = format!("Working on: {title}");
        self.active_step = Some(title);
    }

    /// Records the outcome of one capture attempt.
    pub fn record_capture(&mut self, succeeded: bool) {
        self.capture = if succeeded {
            StageStatus::Healthy
        } else {
            StageStatus::Degraded
        };
    }

    /// Records the outcome of one analysis submission.
    pub fn record_submission(&mut self, succeeded: bool) {
        self.network = if succeeded {
            StageStatus::Healthy
        } else {
            StageStatus::Degraded
        };
    }

    /// Records that the active step is done.
    pub fn step_completed(&mut self) {
        if let Some(title) = self.active_step.take() {
            self.status = format!("Completed: {title}");
        }
    }

    /// Records that the whole lesson is done.
    pub fn lesson_completed(&mut self) {
        self.active_step = None;
        self.status = "Lesson complete".to_string();
    }

    /// Sets free-form status text.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Projects a lesson-plan result into status text.
    ///
    /// Any failure collapses to [`LESSON_PLAN_ERROR`].
    pub fn apply_lesson_plan<E: Display>(&mut self, result: Result<&[LessonPlanEntry], E>) {
        self.status = match result {
            Ok([]) | Err(_) => LESSON_PLAN_ERROR.to_string(),
            Ok(entries) => format!("Lesson plan ready ({} steps)", entries.len()),
        };
    }

    /// Renders the state as display text for the current mode.
    pub fn render(&self) -> String {
        let overlay = self
            .overlay
            .as_ref()
            .map(|content| format!("{}\n{}", content.header, content.body));
        match self.mode {
            PresentationMode::Headless => overlay.unwrap_or_default(),
            PresentationMode::Windowed => {
                let mut text = format!("stepcoach {} | {}", self.version, self.status);
                if let Some(overlay) = overlay {
                    text.push('\n');
                    text.push_str(&overlay);
                }
                text
            }
        }
    }
}
