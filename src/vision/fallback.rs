//! Fallback wrapper — turns every [`VisionError`] into a spoken apology.
//!
//! The session core treats vision replies as always-valid text.
//! [`FallbackVision`] holds that contract: transport failures, bad
//! responses and a missing API key all become a short apology the user
//! hears instead of silence.

use std::sync::Arc;

use super::client::{VisionError, VisionService};
use super::VisionMode;
use crate::camera::Frame;

pub const VISION_UNAVAILABLE: &str =
    "Vision system not available. Please check API configuration.";
pub const CHAT_UNAVAILABLE: &str = "Chat system not available.";
pub const ANALYZE_FAILED: &str = "Sorry, I couldn't analyze the scene. Please try again.";
pub const CHAT_FAILED: &str = "Sorry, I couldn't process that. Please try again.";

/// A never-failing front for any [`VisionService`].
#[derive(Clone)]
pub struct FallbackVision {
    inner: Arc<dyn VisionService>,
}

impl FallbackVision {
    pub fn new(inner: Arc<dyn VisionService>) -> Self {
        Self { inner }
    }

    /// Analyse `frame`; on failure return the apology for analysis.
    pub async fn analyze(&self, frame: &Frame, mode: VisionMode) -> String {
        match self.inner.analyze(frame, mode).await {
            Ok(text) => text,
            Err(VisionError::NotConfigured) => VISION_UNAVAILABLE.to_string(),
            Err(e) => {
                log::warn!("vision: {mode:?} analysis failed: {e}");
                ANALYZE_FAILED.to_string()
            }
        }
    }

    /// Chat turn; on failure return the apology for chat.
    pub async fn chat(&self, text: &str, frame: Option<&Frame>) -> String {
        match self.inner.chat(text, frame).await {
            Ok(reply) => reply,
            Err(VisionError::NotConfigured) => CHAT_UNAVAILABLE.to_string(),
            Err(e) => {
                log::warn!("vision: chat failed: {e}");
                CHAT_FAILED.to_string()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    enum Outcome {
        Ok(&'static str),
        NotConfigured,
        Timeout,
        Status,
    }

    struct Scripted(Outcome);

    impl Scripted {
        fn result(&self) -> Result<String, VisionError> {
            match self.0 {
                Outcome::Ok(text) => Ok(text.to_string()),
                Outcome::NotConfigured => Err(VisionError::NotConfigured),
                Outcome::Timeout => Err(VisionError::Timeout),
                Outcome::Status => Err(VisionError::Status {
                    status: 503,
                    body: "busy".into(),
                }),
            }
        }
    }

    #[async_trait]
    impl VisionService for Scripted {
        async fn analyze(&self, _f: &Frame, _m: VisionMode) -> Result<String, VisionError> {
            self.result()
        }

        async fn chat(&self, _t: &str, _f: Option<&Frame>) -> Result<String, VisionError> {
            self.result()
        }
    }

    fn frame() -> Frame {
        Frame {
            jpeg: vec![1, 2, 3],
            width: 1,
            height: 1,
        }
    }

    fn vision(outcome: Outcome) -> FallbackVision {
        FallbackVision::new(Arc::new(Scripted(outcome)))
    }

    #[tokio::test]
    async fn passes_through_success() {
        let v = vision(Outcome::Ok("Door ahead."));
        assert_eq!(v.analyze(&frame(), VisionMode::Describe).await, "Door ahead.");
        assert_eq!(v.chat("hi", None).await, "Door ahead.");
    }

    #[tokio::test]
    async fn missing_key_reports_unavailable() {
        let v = vision(Outcome::NotConfigured);
        assert_eq!(v.analyze(&frame(), VisionMode::Ocr).await, VISION_UNAVAILABLE);
        assert_eq!(v.chat("hi", Some(&frame())).await, CHAT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn service_errors_become_apologies() {
        let v = vision(Outcome::Timeout);
        assert_eq!(v.analyze(&frame(), VisionMode::Navigation).await, ANALYZE_FAILED);

        let v = vision(Outcome::Status);
        assert_eq!(v.chat("hi", None).await, CHAT_FAILED);
    }
}
