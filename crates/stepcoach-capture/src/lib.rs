#![warn(missing_docs)]
//! # stepcoach-capture
//!
//! ## Purpose
//! Wraps the platform screen-capture primitive behind a backend-agnostic
//! trait and turns raw pixels into analysis-ready [`Capture`] values.
//!
//! ## Responsibilities
//! - Define the [`CaptureBackend`] trait consumed by the progress loop.
//! - Expose real primary-display capture on supported platforms.
//! - Expose a deterministic synthetic backend for CI and tests.
//! - Encode RGBA buffers as base64 PNG with capture metadata.
//!
//! ## Data flow
//! Progress loop asks for a capture -> backend grabs RGBA pixels ->
//! [`encode_capture`] produces PNG bytes, base64 text, and metadata.
//!
//! ## Error model
//! Missing capture capability is [`CaptureError::EnvironmentUnavailable`] and
//! ends a run at setup. Every other failure is retryable.
//!
//! ## Security and privacy notes
//! Captures contain live screen content. This crate never writes them to disk
//! and never logs payload bytes. No consent gating happens here.

use std::sync::Mutex;

use base64::Engine as _;
use image::ImageEncoder as _;
use image::codecs::png::PngEncoder;
use stepcoach_core::{Capture, CaptureMetadata, DisplayResolution};
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

/// Trait implemented by concrete capture providers.
pub trait CaptureBackend: Send + Sync {
    /// Returns `true` when the host exposes a usable capture capability.
    fn is_available(&self) -> bool;

    /// Captures the primary display.
    ///
    /// # Errors
    /// Returns [`CaptureError::EnvironmentUnavailable`] when no capability
    /// exists, or [`CaptureError::Failed`] when one capture attempt fails.
    fn capture(&self) -> Result<Capture, CaptureError>;
}

/// Primary-display capture backend for supported desktop targets.
#[derive(Debug, Clone)]
pub struct RealCaptureBackend {
    #[cfg(windows)]
    index: usize,
    resolution: DisplayResolution,
}

impl RealCaptureBackend {
    /// Locates the primary display and creates a real capture backend.
    ///
    /// # Errors
    /// Returns [`CaptureError::EnvironmentUnavailable`] when the platform has
    /// no supported capture primitive or reports no displays.
    pub fn discover() -> Result<Self, CaptureError> {
        #[cfg(windows)]
        {
            use screenshots::Screen;

            let screens = Screen::all().map_err(|error| {
                CaptureError::EnvironmentUnavailable(format!("screen enumeration failed: {error}"))
            })?;
            if screens.is_empty() {
                return Err(CaptureError::EnvironmentUnavailable(
                    "no displays were reported by the OS".to_string(),
                ));
            }

            let index = screens
                .iter()
                .position(|screen| screen.display_info.is_primary)
                .unwrap_or(0);
            let info = &screens[index].display_info;

            Ok(Self {
                index,
                resolution: DisplayResolution {
                    width: info.width.max(1),
                    height: info.height.max(1),
                },
            })
        }

        #[cfg(not(windows))]
        {
            Err(CaptureError::EnvironmentUnavailable(
                "screen capture is currently implemented for Windows only".to_string(),
            ))
        }
    }

    /// Returns the primary display resolution captured at discovery.
    pub fn resolution(&self) -> DisplayResolution {
        self.resolution
    }
}

impl CaptureBackend for RealCaptureBackend {
    fn is_available(&self) -> bool {
        cfg!(windows)
    }

    fn capture(&self) -> Result<Capture, CaptureError> {
        #[cfg(windows)]
        {
            use screenshots::Screen;

            let screens = Screen::all()
                .map_err(|error| CaptureError::Failed(format!("screen refresh failed: {error}")))?;
            let screen = screens.get(self.index).ok_or_else(|| {
                CaptureError::Failed(format!(
                    "display index {} is not available anymore",
                    self.index
                ))
            })?;

            let captured = screen
                .capture()
                .map_err(|error| CaptureError::Failed(format!("screen capture failed: {error}")))?;
            let width = captured.width();
            let height = captured.height();
            let rgba = captured.into_raw();

            encode_capture(width, height, &rgba, self.resolution)
        }

        #[cfg(not(windows))]
        {
            Err(CaptureError::EnvironmentUnavailable(
                "screen capture is currently implemented for Windows only".to_string(),
            ))
        }
    }
}

/// Deterministic synthetic backend for test and CI usage.
///
/// Produces a small PNG whose pixel value changes with every capture. The
/// first `failures` captures fail with [`CaptureError::Failed`].
#[derive(Debug)]
pub struct SyntheticCaptureBackend {
    available: bool,
    resolution: DisplayResolution,
    state: Mutex<SyntheticState>,
}

#[derive(Debug, Default)]
struct SyntheticState {
    sequence: u64,
    pending_failures: u32,
}

impl SyntheticCaptureBackend {
    /// Creates an available backend reporting a 1920x1080 display.
    pub fn new() -> Self {
        Self {
            available: true,
            resolution: DisplayResolution {
                width: 1920,
                height: 1080,
            },
            state: Mutex::new(SyntheticState::default()),
        }
    }

    /// Creates a backend whose first `count` captures fail.
    pub fn with_failures(count: u32) -> Self {
        let backend = Self::new();
        if let Ok(mut state) = backend.state.lock() {
            state.pending_failures = count;
        }
        backend
    }

    /// Creates a backend that reports no capture capability.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Number of successful captures so far.
    pub fn capture_count(&self) -> u64 {
        self.state.lock().map(|state| state.sequence).unwrap_or(0)
    }
}

impl Default for SyntheticCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticCaptureBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn capture(&self) -> Result<Capture, CaptureError> {
        if !self.available {
            return Err(CaptureError::EnvironmentUnavailable(
                "synthetic backend configured as unavailable".to_string(),
            ));
        }

        let sequence = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| CaptureError::Failed("synthetic state lock poisoned".to_string()))?;
            if state.pending_failures > 0 {
                state.pending_failures -= 1;
                return Err(CaptureError::Failed("scripted synthetic failure".to_string()));
            }
            state.sequence += 1;
            state.sequence
        };

        let byte = (sequence % 255) as u8;
        encode_capture(2, 2, &[byte; 16], self.resolution)
    }
}

/// Encodes an RGBA buffer as base64 PNG and attaches capture metadata.
///
/// # Errors
/// Returns [`CaptureError::Encode`] when the buffer does not match the
/// declared geometry or PNG encoding fails.
pub fn encode_capture(
    width: u32,
    height: u32,
    rgba: &[u8],
    display: DisplayResolution,
) -> Result<Capture, CaptureError> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| CaptureError::Encode("frame dimensions overflow".to_string()))?;
    if expected == 0 || rgba.len() != expected {
        return Err(CaptureError::Encode(format!(
            "invalid frame shape: expected {expected} bytes, got {}",
            rgba.len()
        )));
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgba, width, height, image::ColorType::Rgba8.into())
        .map_err(|error| CaptureError::Encode(format!("png encoding failed: {error}")))?;

    let size = png.len();
    let image_base64 = base64::engine::general_purpose::STANDARD.encode(&png);
    debug!(
        stage = "capture",
        action = "encoded",
        width,
        height,
        png_bytes = size,
        "frame encoded"
    );

    Capture::new(
        image_base64,
        CaptureMetadata {
            size,
            display,
            timestamp: capture_timestamp()?,
        },
    )
    .map_err(|error| CaptureError::Encode(error.to_string()))
}

/// Returns the current UTC time formatted as RFC 3339.
///
/// # Errors
/// Returns [`CaptureError::Encode`] when formatting fails.
pub fn capture_timestamp() -> Result<String, CaptureError> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|error| CaptureError::Encode(format!("timestamp formatting failed: {error}")))
}

/// Capture layer error type.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Host has no capture capability.
    #[error("capture environment unavailable: {0}")]
    EnvironmentUnavailable(String),
    /// One capture attempt failed.
    #[error("capture failed: {0}")]
    Failed(String),
    /// Pixel buffer could not be encoded.
    #[error("capture encoding failed: {0}")]
    Encode(String),
}

impl CaptureError {
    /// Returns `true` when retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::EnvironmentUnavailable(_))
    }
}
