#![warn(missing_docs)]
//! # stepcoach binary
//!
//! Command-line entry point: runs the step loop with the overlay state fed by
//! the push channel, drives stored lessons, or talks to the backend once.

use std::io::BufRead;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use stepcoach_app::{
    AppConfig, AppError, LessonDriver, LoopOutcome, StepProgressLoop, StopHandle,
    apply_loop_event, app_version,
};
use stepcoach_capture::{CaptureBackend, RealCaptureBackend};
use stepcoach_lessons::PostgrestLessonStore;
use stepcoach_push::PushChannel;
use stepcoach_transport::{BackendClient, HttpTransport, ReqwestTransport};
use stepcoach_ui::UiState;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "stepcoach",
    version = stepcoach_app::APP_VERSION,
    about = "Screen-aware lesson step coach"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the self-driving step loop (default).
    Run,
    /// Drive every unfinished lesson from the lesson store.
    Lessons,
    /// Check backend liveness.
    Health,
    /// Generate a lesson plan for a topic.
    Plan {
        /// Topic to plan.
        topic: String,
    },
}

/// CLI entry point.
fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let result = AppConfig::from_env().and_then(|config| {
        match cli.command.unwrap_or(Command::Run) {
            Command::Run => run_loop(&config),
            Command::Lessons => run_lessons(&config),
            Command::Health => run_health(&config),
            Command::Plan { topic } => run_plan(&config, &topic),
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(stage = "app", action = "exit", error = %error, "stepcoach failed");
            ExitCode::FAILURE
        }
    }
}

fn backend(config: &AppConfig) -> Result<BackendClient, AppError> {
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(config.request_timeout)?);
    Ok(BackendClient::new(config.api_url.as_str(), transport)?)
}

fn capture_backend() -> Result<Arc<dyn CaptureBackend>, AppError> {
    Ok(Arc::new(RealCaptureBackend::discover()?))
}

/// Stops `handle` when the user presses Enter.
fn stop_on_enter(handle: StopHandle) {
    let spawned = std::thread::Builder::new()
        .name("stepcoach-stdin".to_string())
        .spawn(move || {
            let mut line = String::new();
            let _ = std::io::stdin().lock().read_line(&mut line);
            handle.stop();
        });
    if let Err(error) = spawned {
        warn!(stage = "app", action = "stdin", error = %error, "stop-on-enter unavailable");
    }
}

fn run_loop(config: &AppConfig) -> Result<(), AppError> {
    info!(
        stage = "app",
        action = "start",
        version = app_version(),
        mode = ?config.presentation,
        "starting step loop"
    );
    let client = backend(config)?;
    let ui = Arc::new(Mutex::new(UiState::new(app_version(), config.presentation)));

    let push = PushChannel::new(config.push_protocol);
    let subscription = {
        let ui = ui.clone();
        push.subscribe(move |event| {
            if let Ok(mut state) = ui.lock() {
                state.apply_push_event(event);
                println!("{}", state.render());
            }
        })
    };
    let connected = match push.connect(&config.push_url) {
        Ok(()) => true,
        Err(error) => {
            warn!(
                stage = "push",
                action = "connect",
                error = %error,
                "push channel unavailable; continuing without it"
            );
            false
        }
    };
    if let Ok(mut state) = ui.lock() {
        state.set_push_connected(connected);
    }

    let stop = StopHandle::new();
    stop_on_enter(stop.clone());

    let (events_tx, events_rx) = mpsc::channel();
    let projector = {
        let ui = ui.clone();
        std::thread::spawn(move || {
            for event in events_rx {
                if let Ok(mut state) = ui.lock() {
                    apply_loop_event(&mut state, &event);
                    println!("{}", state.render());
                }
            }
        })
    };

    let outcome = match capture_backend() {
        Ok(capture) => StepProgressLoop::new(client, capture, config.retry.clone(), stop)
            .with_capture_enabled(config.capture_enabled)
            .with_events(events_tx)
            .run(),
        Err(error) => {
            drop(events_tx);
            LoopOutcome::Failed(error)
        }
    };
    let _ = projector.join();
    let _ = subscription.unsubscribe();
    push.disconnect();

    info!(stage = "app", action = "finish", outcome = ?outcome, "step loop finished");
    outcome.into_result()
}

fn run_lessons(config: &AppConfig) -> Result<(), AppError> {
    let supabase = config
        .supabase
        .as_ref()
        .ok_or_else(|| AppError::Config("SUPABASE_URL and SUPABASE_KEY are required".to_string()))?;
    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new(config.request_timeout)?);
    let store = Arc::new(PostgrestLessonStore::new(&supabase.url, &supabase.key, transport)?);

    let stop = StopHandle::new();
    stop_on_enter(stop.clone());

    let driver = LessonDriver::new(
        store,
        backend(config)?,
        capture_backend()?,
        config.retry.clone(),
        stop,
    );
    let report = driver.with_capture_enabled(config.capture_enabled).run()?;
    info!(
        stage = "app",
        action = "lessons_finished",
        lessons = ?report.finished_lessons,
        steps = report.completed_steps,
        stopped = report.stopped,
        "lesson run finished"
    );
    Ok(())
}

fn run_health(config: &AppConfig) -> Result<(), AppError> {
    let health = backend(config)?.health_check()?;
    println!(
        "{} {}",
        if health.healthy { "healthy" } else { "unhealthy" },
        health.service.unwrap_or_default()
    );
    Ok(())
}

fn run_plan(config: &AppConfig, topic: &str) -> Result<(), AppError> {
    let mut ui = UiState::new(app_version(), config.presentation);
    let result = backend(config).and_then(|client| Ok(client.generate_lesson_plan(topic)?));
    ui.apply_lesson_plan(result.as_deref());
    if let Ok(entries) = &result {
        for entry in entries {
            println!("{}. {} - {}", entry.step, entry.title, entry.instruction);
        }
    }
    println!("{}", ui.status);
    result.map(|_| ())
}
