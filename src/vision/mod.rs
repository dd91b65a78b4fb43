//! Remote vision and conversation service.
//!
//! * [`VisionService`] — async trait implemented by all backends.
//! * [`ApiVisionClient`] — OpenAI-compatible chat-completions client.
//! * [`FallbackVision`] — wraps any service; never fails, apologises instead.
//! * [`VisionMode`] — what an image analysis is for.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vision_guide::config::AppConfig;
//! use vision_guide::vision::{ApiVisionClient, FallbackVision};
//!
//! let config = AppConfig::default();
//! let vision = FallbackVision::new(Arc::new(ApiVisionClient::from_config(&config.vision)));
//! ```

pub mod client;
pub mod fallback;
pub mod prompt;

pub use client::{ApiVisionClient, VisionError, VisionService};
pub use fallback::FallbackVision;

/// Purpose of an image analysis; selects the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionMode {
    /// Short obstacle / path narration for guidance mode.
    Navigation,
    /// Read visible text aloud.
    Ocr,
    /// Full scene description.
    Describe,
}
