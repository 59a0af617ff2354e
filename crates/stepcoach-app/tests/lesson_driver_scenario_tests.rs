//! Integration tests for the lesson driver walking lessons step by step.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use common::{ScriptedBackend, captures_per_step, client, drain, fast_policy};
use stepcoach_app::{LessonDriver, StopHandle};
use stepcoach_capture::SyntheticCaptureBackend;
use stepcoach_core::{Lesson, Step};
use stepcoach_lessons::{InMemoryLessonStore, LessonStore};

fn two_step_lesson() -> Lesson {
    Lesson::new(
        1,
        vec![
            Step::new(11, 1, 1, "S1", "open the editor", Some("editor is open")),
            Step::new(12, 1, 2, "S2", "save the file", Some("file is saved")),
        ],
    )
    .expect("lesson fixture should be valid")
}

#[test]
fn lesson_driver_scenario_tests_advances_after_completion_and_finishes_lesson() {
    let store = Arc::new(InMemoryLessonStore::new(vec![two_step_lesson()]));
    let finished_before_s2 = Arc::new(Mutex::new(None));
    let backend = {
        let store = store.clone();
        let finished_before_s2 = finished_before_s2.clone();
        Arc::new(
            ScriptedBackend::new(&[
                r#"{"completed":false}"#,
                r#"{"completed":false}"#,
                r#"{"completed":true}"#,
                r#"{"completed":true,"lesson_completed":true}"#,
            ])
            .on_screenshot(move |count| {
                if count == 4 {
                    let lesson = store.lesson(1).expect("lesson should exist");
                    *finished_before_s2.lock().expect("lock") = Some(lesson.is_finished);
                }
            }),
        )
    };
    let capture = Arc::new(SyntheticCaptureBackend::new());
    let (events_tx, events_rx) = mpsc::channel();

    let report = LessonDriver::new(
        store.clone(),
        client(backend.clone()),
        capture.clone(),
        fast_policy(),
        StopHandle::new(),
    )
    .with_events(events_tx)
    .run()
    .expect("driver run should succeed");

    assert_eq!(captures_per_step(&drain(&events_rx)), vec![3, 1]);
    assert_eq!(capture.capture_count(), 4);
    assert_eq!(*finished_before_s2.lock().expect("lock"), Some(false));
    assert!(store.lesson(1).expect("lesson should exist").is_finished);
    assert_eq!(report.finished_lessons, vec![1]);
    assert_eq!(report.completed_steps, 2);
    assert!(!report.stopped);

    let criteria: Vec<_> = backend
        .submitted()
        .iter()
        .map(|body| body["finish_criteria"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        criteria,
        vec!["editor is open", "editor is open", "editor is open", "file is saved"]
    );
}

#[test]
fn lesson_driver_scenario_tests_skips_finished_lessons() {
    let mut done = Lesson::new(2, vec![Step::new(21, 2, 1, "only", "", None)])
        .expect("lesson fixture should be valid");
    done.is_finished = true;
    let store = Arc::new(InMemoryLessonStore::new(vec![done, two_step_lesson()]));
    let backend = Arc::new(ScriptedBackend::new(&[
        r#"{"status":"step_advanced"}"#,
        r#"{"status":"lesson_completed"}"#,
    ]));

    let report = LessonDriver::new(
        store.clone(),
        client(backend.clone()),
        Arc::new(SyntheticCaptureBackend::new()),
        fast_policy(),
        StopHandle::new(),
    )
    .run()
    .expect("driver run should succeed");

    assert_eq!(report.finished_lessons, vec![1]);
    assert_eq!(backend.submitted().len(), 2);
    assert!(store.list_unfinished_lessons().expect("list").is_empty());
}

#[test]
fn lesson_driver_scenario_tests_aborts_on_invalid_step_order() {
    let broken = Lesson {
        id: 3,
        steps: vec![
            Step::new(31, 3, 1, "a", "", None),
            Step::new(32, 3, 3, "c", "", None),
        ],
        is_finished: false,
    };
    let store = Arc::new(InMemoryLessonStore::new(vec![broken]));
    let backend = Arc::new(ScriptedBackend::new(&[]));

    let result = LessonDriver::new(
        store.clone(),
        client(backend.clone()),
        Arc::new(SyntheticCaptureBackend::new()),
        fast_policy(),
        StopHandle::new(),
    )
    .run();

    assert!(result.is_err());
    assert!(backend.submitted().is_empty());
    assert!(!store.lesson(3).expect("lesson should exist").is_finished);
}
