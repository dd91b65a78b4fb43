//! Conversation turns.

use std::sync::Arc;

use crate::camera::{capture_frame, Camera};
use crate::speech::SpeechOutputQueue;
use crate::vision::FallbackVision;

/// Handles one free-form utterance while chat mode is on.
///
/// Holds no conversation history; each turn is independent.  A fresh frame
/// is attached when the camera cooperates, otherwise the turn is text-only.
#[derive(Clone)]
pub struct ChatSession {
    camera: Arc<dyn Camera>,
    vision: FallbackVision,
    speech: SpeechOutputQueue,
}

impl ChatSession {
    pub fn new(camera: Arc<dyn Camera>, vision: FallbackVision, speech: SpeechOutputQueue) -> Self {
        Self {
            camera,
            vision,
            speech,
        }
    }

    /// Ask the conversational endpoint and speak the reply.  Returns once
    /// the reply has been spoken, so turns never overlap.
    pub async fn turn(&self, text: &str) {
        let frame = capture_frame(self.camera.as_ref()).await;
        if frame.is_none() {
            log::debug!("chat: no frame, text-only turn");
        }

        let reply = self.vision.chat(text, frame.as_ref()).await;
        log::info!("chat: {reply}");
        self.speech.speak(&reply, true).await;
    }
}
