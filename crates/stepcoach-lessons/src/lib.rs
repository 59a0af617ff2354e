#![warn(missing_docs)]
//! # stepcoach-lessons
//!
//! ## Purpose
//! Read access to the lesson/step hierarchy plus the single write the core
//! performs: flagging a lesson finished.
//!
//! ## Responsibilities
//! - Define the [`LessonStore`] trait consumed by the lesson driver.
//! - Provide an in-memory store for tests and seeded demos.
//! - Provide a PostgREST store speaking the Supabase REST dialect.
//!
//! ## Data flow
//! Driver -> [`LessonStore::list_unfinished_lessons`] ->
//! [`LessonStore::list_steps`] (ordered) -> progress loop per step ->
//! [`LessonStore::mark_lesson_finished`].
//!
//! ## Error model
//! Backend and decode failures become [`LessonError`]. Step lists that break
//! ordering invariants are rejected rather than silently reordered.
//!
//! ## Security and privacy notes
//! The PostgREST API key travels in `apikey`/`Authorization` headers, which
//! the transport logger redacts.

use std::sync::{Arc, Mutex};

use stepcoach_core::{CoreError, Lesson, Step, ordered_steps};
use stepcoach_transport::{
    HttpMethod, HttpRequest, HttpTransport, LoggingTransport, TransportError, endpoint_url,
    validate_base_url,
};
use thiserror::Error;
use tracing::info;
use url::Url;

/// Data access over lessons and steps.
pub trait LessonStore: Send + Sync {
    /// Lessons whose `is_finished` flag is `false`.
    fn list_unfinished_lessons(&self) -> Result<Vec<Lesson>, LessonError>;

    /// Steps of `lesson_id`, sorted by `lesson_order`.
    fn list_steps(&self, lesson_id: i64) -> Result<Vec<Step>, LessonError>;

    /// Sets `is_finished = true` on `lesson_id`.
    fn mark_lesson_finished(&self, lesson_id: i64) -> Result<(), LessonError>;
}

/// Mutex-guarded store over seeded lessons.
#[derive(Debug, Default)]
pub struct InMemoryLessonStore {
    lessons: Mutex<Vec<Lesson>>,
}

impl InMemoryLessonStore {
    /// Creates a store seeded with `lessons`.
    pub fn new(lessons: Vec<Lesson>) -> Self {
        Self {
            lessons: Mutex::new(lessons),
        }
    }

    /// Returns a snapshot of one lesson.
    pub fn lesson(&self, lesson_id: i64) -> Option<Lesson> {
        self.lessons
            .lock()
            .ok()?
            .iter()
            .find(|lesson| lesson.id == lesson_id)
            .cloned()
    }

    fn with_lessons<T>(
        &self,
        f: impl FnOnce(&mut Vec<Lesson>) -> Result<T, LessonError>,
    ) -> Result<T, LessonError> {
        let mut lessons = self
            .lessons
            .lock()
            .map_err(|_| LessonError::Store("lesson store lock poisoned".to_string()))?;
        f(&mut lessons)
    }
}

impl LessonStore for InMemoryLessonStore {
    fn list_unfinished_lessons(&self) -> Result<Vec<Lesson>, LessonError> {
        self.with_lessons(|lessons| {
            Ok(lessons
                .iter()
                .filter(|lesson| !lesson.is_finished)
                .cloned()
                .collect())
        })
    }

    fn list_steps(&self, lesson_id: i64) -> Result<Vec<Step>, LessonError> {
        self.with_lessons(|lessons| {
            let lesson = lessons
                .iter()
                .find(|lesson| lesson.id == lesson_id)
                .ok_or(LessonError::NotFound(lesson_id))?;
            ordered_steps(lesson_id, lesson.steps.clone()).map_err(LessonError::Invalid)
        })
    }

    fn mark_lesson_finished(&self, lesson_id: i64) -> Result<(), LessonError> {
        self.with_lessons(|lessons| {
            let lesson = lessons
                .iter_mut()
                .find(|lesson| lesson.id == lesson_id)
                .ok_or(LessonError::NotFound(lesson_id))?;
            lesson.is_finished = true;
            Ok(())
        })
    }
}

/// Store backed by a PostgREST endpoint (`{url}/rest/v1/...`).
#[derive(Clone)]
pub struct PostgrestLessonStore {
    base_url: Url,
    api_key: String,
    transport: LoggingTransport,
}

impl PostgrestLessonStore {
    /// Creates a store for project URL `url` authenticated with `api_key`.
    ///
    /// # Errors
    /// Returns [`LessonError::Config`] for a blank key and
    /// [`LessonError::Transport`] for an invalid URL.
    pub fn new(
        url: &str,
        api_key: &str,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, LessonError> {
        if api_key.trim().is_empty() {
            return Err(LessonError::Config("api key is empty".to_string()));
        }
        Ok(Self {
            base_url: validate_base_url(url).map_err(LessonError::Transport)?,
            api_key: api_key.trim().to_string(),
            transport: LoggingTransport::new(transport),
        })
    }

    fn table_url(&self, table: &str, query: &str) -> Url {
        let mut url = endpoint_url(&self.base_url, &format!("/rest/v1/{table}"));
        url.set_query(Some(query));
        url
    }

    fn send(&self, request: HttpRequest) -> Result<String, LessonError> {
        let request = request
            .with_header("apikey", self.api_key.clone())
            .with_header("Authorization", format!("Bearer {}", self.api_key));
        let response = self.transport.send(&request)?;
        if !response.is_success() {
            return Err(LessonError::Transport(TransportError::ServerError {
                status: response.status,
                body: response.body,
            }));
        }
        Ok(response.body)
    }
}

impl LessonStore for PostgrestLessonStore {
    fn list_unfinished_lessons(&self) -> Result<Vec<Lesson>, LessonError> {
        let url = self.table_url("lesson", "select=*&is_finished=eq.false&order=id.asc");
        let body = self.send(HttpRequest::new(HttpMethod::Get, url))?;
        Ok(serde_json::from_str(&body)?)
    }

    fn list_steps(&self, lesson_id: i64) -> Result<Vec<Step>, LessonError> {
        let url = self.table_url(
            "step",
            &format!("select=*&lesson_id=eq.{lesson_id}&order=lesson_order.asc"),
        );
        let body = self.send(HttpRequest::new(HttpMethod::Get, url))?;
        let steps: Vec<Step> = serde_json::from_str(&body)?;
        ordered_steps(lesson_id, steps).map_err(LessonError::Invalid)
    }

    fn mark_lesson_finished(&self, lesson_id: i64) -> Result<(), LessonError> {
        let url = self.table_url("lesson", &format!("id=eq.{lesson_id}"));
        let body = serde_json::to_vec(&serde_json::json!({ "is_finished": true }))?;
        self.send(
            HttpRequest::new(HttpMethod::Patch, url)
                .with_header("Prefer", "return=minimal")
                .with_json_body(body),
        )?;
        info!(stage = "lessons", action = "lesson_finished", lesson_id, "lesson marked finished");
        Ok(())
    }
}

/// Lesson store error type.
#[derive(Debug, Error)]
pub enum LessonError {
    /// Lesson does not exist.
    #[error("lesson {0} not found")]
    NotFound(i64),
    /// Stored steps violate ordering invariants.
    #[error("invalid lesson data: {0}")]
    Invalid(CoreError),
    /// Backend request failed.
    #[error("lesson backend failure: {0}")]
    Transport(#[from] TransportError),
    /// Backend rows could not be decoded.
    #[error("lesson decode failure: {0}")]
    Decode(#[from] serde_json::Error),
    /// Store is misconfigured.
    #[error("lesson store misconfigured: {0}")]
    Config(String),
    /// Local store failure.
    #[error("lesson store failure: {0}")]
    Store(String),
}
