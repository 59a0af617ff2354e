//! Integration tests for the self-driving step progress loop.

mod common;

use std::sync::Arc;
use std::sync::mpsc;

use common::{LESSON_END, ScriptedBackend, captures_per_step, client, drain, fast_policy};
use stepcoach_app::{LoopEvent, LoopOutcome, LoopState, StepProgressLoop, StopHandle};
use stepcoach_capture::SyntheticCaptureBackend;

const STEP_ONE: &str = r#"{
    "status": "active",
    "step_order": 1,
    "name": "Open settings",
    "finish_criteria": "settings visible"
}"#;
const STEP_TWO: &str = r#"{"status":"active","step_order":2,"name":"Toggle dark mode"}"#;

#[test]
fn step_loop_progression_tests_keeps_polling_until_completed() {
    let backend = Arc::new(
        ScriptedBackend::new(&[
            r#"{"status":"not_completed","completed":false}"#,
            r#"{"status":"popup_sent","completed":false}"#,
            r#"{"status":"lesson_completed","completed":true,"lesson_completed":true}"#,
        ])
        .with_start_steps(&[STEP_ONE]),
    );
    let capture = Arc::new(SyntheticCaptureBackend::new());
    let (events_tx, events_rx) = mpsc::channel();

    let mut progress = StepProgressLoop::new(
        client(backend.clone()),
        capture.clone(),
        fast_policy(),
        StopHandle::new(),
    )
    .with_events(events_tx);
    let outcome = progress.run();

    assert!(matches!(outcome, LoopOutcome::LessonCompleted));
    assert_eq!(progress.state(), LoopState::LessonComplete);
    assert_eq!(capture.capture_count(), 3);
    assert_eq!(backend.start_calls(), 1);
    assert_eq!(backend.submitted()[0]["finish_criteria"], "settings visible");

    let events = drain(&events_rx);
    assert_eq!(captures_per_step(&events), vec![3]);
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, LoopEvent::RetryScheduled { .. }))
            .count(),
        2
    );
}

#[test]
fn step_loop_progression_tests_starts_next_step_after_step_completion() {
    let backend = Arc::new(
        ScriptedBackend::new(&[
            r#"{"status":"step_advanced","next_step_order":2}"#,
            r#"{"completed":false}"#,
            r#"{"completed":true,"lesson_completed":true}"#,
        ])
        .with_start_steps(&[STEP_ONE, STEP_TWO]),
    );
    let (events_tx, events_rx) = mpsc::channel();

    let outcome = StepProgressLoop::new(
        client(backend.clone()),
        Arc::new(SyntheticCaptureBackend::new()),
        fast_policy(),
        StopHandle::new(),
    )
    .with_events(events_tx)
    .run();

    assert!(matches!(outcome, LoopOutcome::LessonCompleted));
    assert_eq!(backend.start_calls(), 2);

    let events = drain(&events_rx);
    assert_eq!(captures_per_step(&events), vec![1, 2]);
    let states: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            LoopEvent::StateChanged(state) => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            LoopState::StepActive,
            LoopState::Polling,
            LoopState::StepComplete,
            LoopState::Idle,
            LoopState::StepActive,
            LoopState::Polling,
            LoopState::LessonComplete,
        ]
    );
}

#[test]
fn step_loop_progression_tests_lesson_completion_stops_capturing() {
    let backend = Arc::new(
        ScriptedBackend::new(&[
            r#"{"completed":true,"lesson_completed":true}"#,
            r#"{"completed":false}"#,
        ])
        .with_start_steps(&[STEP_ONE, STEP_TWO]),
    );
    let capture = Arc::new(SyntheticCaptureBackend::new());

    let outcome = StepProgressLoop::new(
        client(backend.clone()),
        capture.clone(),
        fast_policy(),
        StopHandle::new(),
    )
    .run();

    assert!(matches!(outcome, LoopOutcome::LessonCompleted));
    assert_eq!(capture.capture_count(), 1);
    assert_eq!(backend.submitted().len(), 1);
    assert_eq!(backend.start_calls(), 1);
}

#[test]
fn step_loop_progression_tests_end_status_completes_without_capture() {
    let backend = Arc::new(
        ScriptedBackend::new(&[]).with_start_steps(&[LESSON_END]),
    );
    let capture = Arc::new(SyntheticCaptureBackend::new());

    let outcome = StepProgressLoop::new(
        client(backend.clone()),
        capture.clone(),
        fast_policy(),
        StopHandle::new(),
    )
    .run();

    assert!(matches!(outcome, LoopOutcome::LessonCompleted));
    assert_eq!(capture.capture_count(), 0);
}

#[test]
fn step_loop_progression_tests_step_start_failure_is_structured() {
    let backend = Arc::new(ScriptedBackend::new(&[]).with_start_steps(&[r#"{"status":""}"#]));

    let mut progress = StepProgressLoop::new(
        client(backend),
        Arc::new(SyntheticCaptureBackend::new()),
        fast_policy(),
        StopHandle::new(),
    );
    let outcome = progress.run();

    assert!(matches!(
        outcome,
        LoopOutcome::Failed(stepcoach_app::AppError::StepStart(_))
    ));
    assert_eq!(progress.state(), LoopState::Failed);
}
