//! Integration tests for runtime kill-switch behavior.

mod common;

use std::sync::Arc;

use common::{ScriptedBackend, client, fast_policy};
use stepcoach_app::{AppError, LoopOutcome, StepProgressLoop, StopHandle, capture_enabled_from_env};
use stepcoach_capture::SyntheticCaptureBackend;

#[test]
fn kill_switch_behavior_tests_disables_capture_when_env_is_false() {
    // Safety:
    // - Integration tests mutate process env in a single-threaded test body.
    // - We reset the variable before returning.
    unsafe { std::env::set_var("STEPCOACH_CAPTURE_ENABLED", "false") };
    assert!(!capture_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::set_var("STEPCOACH_CAPTURE_ENABLED", "true") };
    assert!(capture_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::remove_var("STEPCOACH_CAPTURE_ENABLED") };
}

#[test]
fn kill_switch_behavior_tests_disabled_loop_fails_before_any_call() {
    let backend = Arc::new(
        ScriptedBackend::new(&[]).with_start_steps(&[r#"{"status":"active","step_order":1}"#]),
    );
    let capture = Arc::new(SyntheticCaptureBackend::new());

    let outcome = StepProgressLoop::new(
        client(backend.clone()),
        capture.clone(),
        fast_policy(),
        StopHandle::new(),
    )
    .with_capture_enabled(false)
    .run();

    assert!(matches!(outcome, LoopOutcome::Failed(AppError::CaptureDisabled)));
    assert_eq!(backend.start_calls(), 0);
    assert_eq!(capture.capture_count(), 0);
}
