//! Still-frame capture.
//!
//! The camera is acquired for one capture and released immediately, so the
//! guidance loop, one-shot actions and chat grounding never contend over a
//! held device.  [`CommandCamera`] does this by running a capture program
//! (default `rpicam-still`) that writes one JPEG to stdout and exits.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::CameraConfig;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One captured, JPEG-encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub const MIME: &'static str = "image/jpeg";
}

// ---------------------------------------------------------------------------
// CameraError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CameraError {
    /// The capture program could not be started (not installed, no
    /// permission).
    #[error("cannot start capture program `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but reported failure (device busy or absent).
    #[error("capture program exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("capture did not finish within {0:?}")]
    Timeout(Duration),

    #[error("capture produced no image data")]
    EmptyFrame,
}

// ---------------------------------------------------------------------------
// Camera trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self) -> Result<Frame, CameraError>;
}

/// Capture a frame, logging and swallowing any failure.
pub async fn capture_frame(camera: &dyn Camera) -> Option<Frame> {
    match camera.capture().await {
        Ok(frame) => Some(frame),
        Err(e) => {
            log::warn!("camera: capture failed: {e}");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// CommandCamera
// ---------------------------------------------------------------------------

/// Captures by spawning an external still-capture program per frame.
pub struct CommandCamera {
    config: CameraConfig,
}

impl CommandCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    /// Argument list with `{width}`, `{height}` and `{quality}` filled in.
    fn args(&self) -> Vec<String> {
        let width = self.config.width.to_string();
        let height = self.config.height.to_string();
        let quality = self.config.jpeg_quality.clamp(1, 100).to_string();

        self.config
            .args
            .iter()
            .map(|a| {
                a.replace("{width}", &width)
                    .replace("{height}", &height)
                    .replace("{quality}", &quality)
            })
            .collect()
    }
}

#[async_trait]
impl Camera for CommandCamera {
    async fn capture(&self) -> Result<Frame, CameraError> {
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let child = Command::new(&self.config.program)
            .args(self.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CameraError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| CameraError::Timeout(timeout))?
            .map_err(|source| CameraError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CameraError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if output.stdout.is_empty() {
            return Err(CameraError::EmptyFrame);
        }

        log::debug!("camera: captured {} bytes", output.stdout.len());

        Ok(Frame {
            jpeg: output.stdout,
            width: self.config.width,
            height: self.config.height,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
