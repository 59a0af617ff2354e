//! Integration tests for bounded retry policies.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedBackend, client};
use stepcoach_app::{AppError, LoopOutcome, RetryPolicy, StepProgressLoop, StopHandle};
use stepcoach_capture::SyntheticCaptureBackend;

#[test]
fn retry_budget_tests_exhausted_budget_ends_the_run() {
    let backend = Arc::new(
        ScriptedBackend::new(&[])
            .with_start_steps(&[r#"{"status":"active","step_order":1}"#]),
    );
    let capture = Arc::new(SyntheticCaptureBackend::new());
    let policy = RetryPolicy {
        max_attempts: Some(3),
        ..RetryPolicy::fixed(Duration::from_millis(1))
    };

    let outcome =
        StepProgressLoop::new(client(backend.clone()), capture.clone(), policy, StopHandle::new())
            .run();

    assert!(matches!(
        outcome,
        LoopOutcome::RetriesExhausted {
            step_order: 1,
            attempts: 3
        }
    ));
    assert_eq!(capture.capture_count(), 3);
    assert_eq!(backend.submitted().len(), 3);

    let error = outcome.into_result().expect_err("exhaustion should fail the run");
    assert!(matches!(
        error,
        AppError::RetriesExhausted {
            step_order: 1,
            attempts: 3
        }
    ));
    assert_eq!(error.to_string(), "step 1 not completed after 3 attempts");
}

#[test]
fn retry_budget_tests_failed_captures_count_against_budget() {
    let backend = Arc::new(
        ScriptedBackend::new(&[])
            .with_start_steps(&[r#"{"status":"active","step_order":1}"#]),
    );
    let policy = RetryPolicy {
        max_attempts: Some(2),
        ..RetryPolicy::fixed(Duration::from_millis(1))
    };

    let outcome = StepProgressLoop::new(
        client(backend.clone()),
        Arc::new(SyntheticCaptureBackend::with_failures(5)),
        policy,
        StopHandle::new(),
    )
    .run();

    assert!(matches!(
        outcome,
        LoopOutcome::RetriesExhausted {
            step_order: 1,
            attempts: 2
        }
    ));
    assert!(backend.submitted().is_empty());
}
