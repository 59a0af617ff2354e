//! Lesson driver: walks every unfinished lesson step by step.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use stepcoach_capture::CaptureBackend;
use stepcoach_core::StepInfo;
use stepcoach_lessons::LessonStore;
use stepcoach_transport::BackendClient;
use tracing::info;

use crate::AppError;
use crate::progress::{LoopEvent, LoopState, Poller, StepPoll};
use crate::retry::{RetryPolicy, StopHandle};

/// Summary of one driver run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    /// Lessons marked finished, in processing order.
    pub finished_lessons: Vec<i64>,
    /// Steps that reported completion.
    pub completed_steps: u32,
    /// `true` when the stop handle ended the run early.
    pub stopped: bool,
}

/// Sequential driver over a [`LessonStore`].
///
/// One lesson and one step are active at a time. Step `n + 1` is never
/// submitted before step `n` reported completion. Any error aborts the run.
pub struct LessonDriver {
    store: Arc<dyn LessonStore>,
    poller: Poller,
    capture_enabled: bool,
}

impl LessonDriver {
    /// Creates a driver.
    pub fn new(
        store: Arc<dyn LessonStore>,
        backend: BackendClient,
        capture: Arc<dyn CaptureBackend>,
        policy: RetryPolicy,
        stop: StopHandle,
    ) -> Self {
        Self {
            store,
            poller: Poller {
                backend,
                capture,
                policy,
                stop,
                events: None,
            },
            capture_enabled: true,
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

    /// Processes every unfinished lesson.
    ///
    /// # Errors
    /// Returns the first store, capture-environment, or retry-budget failure;
    /// lessons already finished stay finished.
    pub fn run(&self) -> Result<DriverReport, AppError> {
        self.poller.check_setup(self.capture_enabled)?;

        let mut report = DriverReport::default();
        for lesson in self.store.list_unfinished_lessons()? {
            let steps = self.store.list_steps(lesson.id)?;
            info!(
                stage = "driver",
                action = "lesson_started",
                lesson_id = lesson.id,
                steps = steps.len(),
                "lesson started"
            );

            for step in &steps {
                if self.poller.stop.is_stopped() {
                    report.stopped = true;
                    return Ok(report);
                }
                self.poller.emit(LoopEvent::StateChanged(LoopState::StepActive));
                self.poller.emit(LoopEvent::StepStarted(StepInfo::from(step)));
                self.poller.emit(LoopEvent::StateChanged(LoopState::Polling));

                match self.poller.poll_step(step.finish_criteria.as_deref()) {
                    StepPoll::Completed(_) => {
                        report.completed_steps += 1;
                        self.poller.emit(LoopEvent::StateChanged(LoopState::StepComplete));
                    }
                    StepPoll::Stopped => {
                        report.stopped = true;
                        return Ok(report);
                    }
                    StepPoll::Exhausted(attempts) => {
                        return Err(AppError::RetriesExhausted {
                            step_order: step.lesson_order,
                            attempts,
                        });
                    }
                    StepPoll::Fatal(error) => return Err(error),
                }
            }

            self.store.mark_lesson_finished(lesson.id)?;
            self.poller.emit(LoopEvent::StateChanged(LoopState::LessonComplete));
            report.finished_lessons.push(lesson.id);
        }
        Ok(report)
    }
}
