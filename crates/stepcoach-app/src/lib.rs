#![warn(missing_docs)]
//! # stepcoach-app
//!
//! ## Purpose
//! Orchestrates capture, backend analysis, lessons, and presentation state for
//! `stepcoach`.
//!
//! ## Responsibilities
//! - Resolve runtime configuration from the environment.
//! - Run the step progress loop (start step, capture, submit, interpret).
//! - Drive every unfinished lesson through its steps in order.
//! - Project loop events into UI state.
//!
//! ## Data flow
//! [`StepProgressLoop`] / [`LessonDriver`] -> capture backend -> backend
//! client -> progress signal -> next step or retry. Loop events flow to the
//! host over an `mpsc` channel and are folded into [`UiState`] by
//! [`apply_loop_event`].
//!
//! ## Ownership and lifetimes
//! Loops own their collaborators behind `Arc`s and share only a
//! [`StopHandle`] and an optional event sender with the host thread.
//!
//! ## Error model
//! Capture and submission failures inside the poll cycle are logged and
//! retried. Setup failures and lost capture environments end the run as
//! [`LoopOutcome::Failed`] carrying an [`AppError`]; nothing panics.
//!
//! ## Security and privacy notes
//! - Capture is blocked when the kill switch is off.
//! - Capture payloads leave the process only through the logging transport,
//!   which fingerprints them instead of logging their content.

mod config;
mod driver;
mod progress;
mod retry;

use stepcoach_capture::CaptureError;
use stepcoach_lessons::LessonError;
use stepcoach_push::PushError;
use stepcoach_transport::TransportError;
use stepcoach_ui::UiState;
use thiserror::Error;

pub use config::{
    AppConfig, CAPTURE_ENABLED_VAR, DEFAULT_API_URL, DEFAULT_PUSH_URL, SupabaseConfig,
    capture_enabled_from_env,
};
pub use driver::{DriverReport, LessonDriver};
pub use progress::{LoopEvent, LoopOutcome, LoopState, StepProgressLoop};
pub use retry::{Backoff, RetryPolicy, StopHandle};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("STEPCOACH_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Folds one loop event into UI state.
pub fn apply_loop_event(state: &mut UiState, event: &LoopEvent) {
    match event {
        LoopEvent::StepStarted(step) => state.show_step(step),
        LoopEvent::CaptureTaken { .. } => state.record_capture(true),
        LoopEvent::CaptureFailed { .. } => state.record_capture(false),
        LoopEvent::SubmitFailed { .. } => state.record_submission(false),
        LoopEvent::SignalReceived(signal) => {
            state.record_submission(true);
            if signal.lesson_completed {
                state.lesson_completed();
            } else if signal.completed {
                state.step_completed();
            }
        }
        LoopEvent::StateChanged(LoopState::Failed) => state.set_status("Stopped after an error"),
        LoopEvent::StateChanged(LoopState::LessonComplete) => state.lesson_completed(),
        LoopEvent::StateChanged(_) | LoopEvent::RetryScheduled { .. } => {}
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration value is malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Capture disabled by the kill switch.
    #[error("capture disabled by STEPCOACH_CAPTURE_ENABLED")]
    CaptureDisabled,
    /// No capture capability in this environment.
    #[error("capture environment unavailable")]
    CaptureUnavailable,
    /// Capture subsystem error.
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    /// The backend could not activate a step.
    #[error("step start failed: {0}")]
    StepStart(TransportError),
    /// Backend request error outside the poll cycle.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Push channel error.
    #[error("push error: {0}")]
    Push(#[from] PushError),
    /// Lesson store error.
    #[error("lesson store error: {0}")]
    Lessons(#[from] LessonError),
    /// A step used up its retry budget.
    #[error("step {step_order} not completed after {attempts} attempts")]
    RetriesExhausted {
        /// Ordinal of the step within its lesson.
        step_order: u32,
        /// Attempts made.
        attempts: u32,
    },
}

#[cfg(test)]
mod tests {
    //! Unit tests for UI projection of loop events.

    use stepcoach_core::{ProgressSignal, StepInfo};
    use stepcoach_ui::{PresentationMode, StageStatus};

    use super::*;

    #[test]
    fn loop_events_drive_ui_status() {
        let mut state = UiState::new(app_version(), PresentationMode::Windowed);
        apply_loop_event(
            &mut state,
            &LoopEvent::StepStarted(StepInfo {
                status: "active".to_string(),
                step_order: 1,
                name: Some("Open the terminal".to_string()),
                ..StepInfo::default()
            }),
        );
        apply_loop_event(
            &mut state,
            &LoopEvent::CaptureFailed {
                attempt: 1,
                error: "busy".to_string(),
            },
        );
        assert_eq!(state.capture, StageStatus::Degraded);

        let step_done = LoopEvent::SignalReceived(ProgressSignal::step_completed());
        apply_loop_event(&mut state, &step_done);
        assert_eq!(state.status, "Completed: Open the terminal");
        assert_eq!(state.network, StageStatus::Healthy);

        let lesson_done = LoopEvent::SignalReceived(ProgressSignal::lesson_completed());
        apply_loop_event(&mut state, &lesson_done);
        assert_eq!(state.status, "Lesson complete");
    }
}
