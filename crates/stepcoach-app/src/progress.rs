//! Step progress loop: capture, submit, interpret, repeat.

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::Duration;

use stepcoach_capture::CaptureBackend;
use stepcoach_core::{ProgressSignal, StepInfo};
use stepcoach_transport::BackendClient;
use tracing::{info, warn};

use crate::AppError;
use crate::retry::{RetryPolicy, StopHandle};

/// Progress loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No step active.
    Idle,
    /// A step was activated by the backend.
    StepActive,
    /// Capture/submit cycle running for the active step.
    Polling,
    /// The active step finished.
    StepComplete,
    /// The lesson finished; terminal.
    LessonComplete,
    /// Setup failed; terminal.
    Failed,
}

/// Notification emitted while the loop runs.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// State transition.
    StateChanged(LoopState),
    /// A step became active.
    StepStarted(StepInfo),
    /// A capture was taken for `attempt` (one-based).
    CaptureTaken {
        /// Attempt number on the current step.
        attempt: u32,
        /// Encoded image size in bytes.
        size: usize,
    },
    /// Capture failed; the attempt will be retried.
    CaptureFailed {
        /// Attempt number on the current step.
        attempt: u32,
        /// Error text.
        error: String,
    },
    /// Submission failed; the attempt will be retried.
    SubmitFailed {
        /// Attempt number on the current step.
        attempt: u32,
        /// Error text.
        error: String,
    },
    /// Backend verdict for a submitted capture.
    SignalReceived(ProgressSignal),
    /// Next capture scheduled after `delay`.
    RetryScheduled {
        /// Unsuccessful attempts so far on the current step.
        attempt: u32,
        /// Wait before the next capture.
        delay: Duration,
    },
}

/// How a run ended.
#[derive(Debug)]
pub enum LoopOutcome {
    /// The backend reported the lesson complete.
    LessonCompleted,
    /// The stop handle fired.
    Stopped,
    /// Setup failed or a capture environment disappeared.
    Failed(AppError),
    /// A step used up its retry budget.
    RetriesExhausted {
        /// Ordinal of the step that never completed.
        step_order: u32,
        /// Attempts made on the step.
        attempts: u32,
    },
}

impl LoopOutcome {
    /// Maps a finished run to the host's exit result.
    ///
    /// # Errors
    /// Returns the failure for [`LoopOutcome::Failed`] and
    /// [`AppError::RetriesExhausted`] for an exhausted step.
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Self::LessonCompleted | Self::Stopped => Ok(()),
            Self::Failed(error) => Err(error),
            Self::RetriesExhausted {
                step_order,
                attempts,
            } => Err(AppError::RetriesExhausted {
                step_order,
                attempts,
            }),
        }
    }
}

/// Result of polling one step to completion.
#[derive(Debug)]
pub(crate) enum StepPoll {
    Completed(ProgressSignal),
    Stopped,
    Exhausted(u32),
    Fatal(AppError),
}

/// Capture/submit cycle shared by the self-driving loop and the lesson driver.
#[derive(Clone)]
pub(crate) struct Poller {
    pub(crate) backend: BackendClient,
    pub(crate) capture: Arc<dyn CaptureBackend>,
    pub(crate) policy: RetryPolicy,
    pub(crate) stop: StopHandle,
    pub(crate) events: Option<Sender<LoopEvent>>,
}

impl Poller {
    pub(crate) fn emit(&self, event: LoopEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    pub(crate) fn check_setup(&self, capture_enabled: bool) -> Result<(), AppError> {
        if !capture_enabled {
            return Err(AppError::CaptureDisabled);
        }
        if !self.capture.is_available() {
            return Err(AppError::CaptureUnavailable);
        }
        Ok(())
    }

    /// Runs capture/submit until a completion signal, stop, or exhaustion.
    pub(crate) fn poll_step(&self, finish_criteria: Option<&str>) -> StepPoll {
        let mut attempts: u32 = 0;
        loop {
            let delay = self.policy.delay(attempts);
            if attempts > 0 {
                self.emit(LoopEvent::RetryScheduled {
                    attempt: attempts,
                    delay,
                });
            }
            if self.stop.wait(delay) {
                return StepPoll::Stopped;
            }
            attempts = attempts.saturating_add(1);

            match self.capture.capture() {
                Ok(capture) => {
                    self.emit(LoopEvent::CaptureTaken {
                        attempt: attempts,
                        size: capture.metadata.size,
                    });
                    let result = self.backend.submit_capture(&capture, finish_criteria);
                    if self.stop.is_stopped() {
                        info!(
                            stage = "loop",
                            action = "discard",
                            attempt = attempts,
                            "stopped during submission; result discarded"
                        );
                        return StepPoll::Stopped;
                    }
                    match result {
                        Ok(signal) => {
                            info!(
                                stage = "loop",
                                action = "signal",
                                attempt = attempts,
                                completed = signal.completed,
                                lesson_completed = signal.lesson_completed,
                                "analysis verdict received"
                            );
                            self.emit(LoopEvent::SignalReceived(signal.clone()));
                            if signal.completed || signal.lesson_completed {
                                return StepPoll::Completed(signal);
                            }
                        }
                        Err(error) => {
                            warn!(
                                stage = "loop",
                                action = "submit_failed",
                                attempt = attempts,
                                error = %error,
                                "submission failed; retrying"
                            );
                            self.emit(LoopEvent::SubmitFailed {
                                attempt: attempts,
                                error: error.to_string(),
                            });
                        }
                    }
                }
                Err(error) if error.is_fatal() => {
                    warn!(
                        stage = "loop",
                        action = "capture_unavailable",
                        error = %error,
                        "capture environment lost"
                    );
                    return StepPoll::Fatal(AppError::Capture(error));
                }
                Err(error) => {
                    warn!(
                        stage = "loop",
                        action = "capture_failed",
                        attempt = attempts,
                        error = %error,
                        "capture failed; retrying"
                    );
                    self.emit(LoopEvent::CaptureFailed {
                        attempt: attempts,
                        error: error.to_string(),
                    });
                }
            }

            if self.policy.is_exhausted(attempts) {
                warn!(stage = "loop", action = "exhausted", attempts, "retry budget used up");
                return StepPoll::Exhausted(attempts);
            }
        }
    }
}

/// Self-driving loop: asks the backend for each next step and polls it until
/// the backend reports the lesson complete.
pub struct StepProgressLoop {
    poller: Poller,
    capture_enabled: bool,
    state: LoopState,
}

impl StepProgressLoop {
    /// Creates an idle loop.
    pub fn new(
        backend: BackendClient,
        capture: Arc<dyn CaptureBackend>,
        policy: RetryPolicy,
        stop: StopHandle,
    ) -> Self {
        Self {
            poller: Poller {
                backend,
                capture,
                policy,
                stop,
                events: None,
            },
            capture_enabled: true,
            state: LoopState::Idle,
        }
    }

    /// Sends [`LoopEvent`]s to `events` while running.
    pub fn with_events(mut self, events: Sender<LoopEvent>) -> Self {
        self.poller.events = Some(events);
        self
    }

    /// Applies the capture kill switch.
    pub fn with_capture_enabled(mut self, enabled: bool) -> Self {
        self.capture_enabled = enabled;
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, state: LoopState) {
        if self.state != state {
            info!(
                stage = "loop",
                action = "transition",
                from = ?self.state,
                to = ?state,
                "state changed"
            );
            self.state = state;
            self.poller.emit(LoopEvent::StateChanged(state));
        }
    }

    fn fail(&mut self, error: AppError) -> LoopOutcome {
        warn!(stage = "loop", action = "failed", error = %error, "progress loop failed");
        self.transition(LoopState::Failed);
        LoopOutcome::Failed(error)
    }

    /// Runs until the lesson completes, the stop handle fires, retries are
    /// exhausted, or setup fails.
    pub fn run(&mut self) -> LoopOutcome {
        if let Err(error) = self.poller.check_setup(self.capture_enabled) {
            return self.fail(error);
        }

        loop {
            if self.poller.stop.is_stopped() {
                return LoopOutcome::Stopped;
            }

            self.transition(LoopState::Idle);
            let step = match self.poller.backend.start_step() {
                Ok(step) => step,
                Err(error) => return self.fail(AppError::StepStart(error)),
            };
            if self.poller.stop.is_stopped() {
                return LoopOutcome::Stopped;
            }
            if step.ends_lesson() {
                self.transition(LoopState::LessonComplete);
                return LoopOutcome::LessonCompleted;
            }

            info!(
                stage = "loop",
                action = "step_started",
                step_order = step.step_order,
                "step active"
            );
            self.transition(LoopState::StepActive);
            self.poller.emit(LoopEvent::StepStarted(step.clone()));
            self.transition(LoopState::Polling);

            match self.poller.poll_step(step.finish_criteria.as_deref()) {
                StepPoll::Completed(signal) if signal.lesson_completed => {
                    self.transition(LoopState::LessonComplete);
                    return LoopOutcome::LessonCompleted;
                }
                StepPoll::Completed(_) => self.transition(LoopState::StepComplete),
                StepPoll::Stopped => return LoopOutcome::Stopped,
                StepPoll::Exhausted(attempts) => {
                    return LoopOutcome::RetriesExhausted {
                        step_order: step.step_order,
                        attempts,
                    };
                }
                StepPoll::Fatal(error) => return self.fail(error),
            }
        }
    }
}
