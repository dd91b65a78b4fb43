//! Periodic navigation narration.
//!
//! Each cycle captures a frame, asks the vision service for a navigation
//! summary and speaks it without blocking.  The cycle start times are
//! spaced by the capture interval; when a cycle overruns the interval the
//! next one starts immediately.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::camera::{capture_frame, Camera};
use crate::speech::SpeechOutputQueue;
use crate::vision::{FallbackVision, VisionMode};

/// Narration containing this phrase (any case) is not worth speaking.
const NOTHING_TO_REPORT: &str = "no obstacle";

/// `true` when a navigation reply should be spoken.
pub fn should_narrate(reply: &str) -> bool {
    !reply.trim().is_empty() && !reply.to_lowercase().contains(NOTHING_TO_REPORT)
}

/// Time left in the current cycle.  Never negative.
pub fn remaining(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

pub struct GuidanceWorker {
    camera: Arc<dyn Camera>,
    vision: FallbackVision,
    speech: SpeechOutputQueue,
    interval: Duration,
    cancel: CancellationToken,
}

impl GuidanceWorker {
    pub fn new(
        camera: Arc<dyn Camera>,
        vision: FallbackVision,
        speech: SpeechOutputQueue,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            camera,
            vision,
            speech,
            interval,
            cancel,
        }
    }

    /// Run until the token is cancelled.
    ///
    /// Cancellation is observed during the sleep and while a cycle is in
    /// flight; an in-flight cycle is dropped and its reply never spoken.
    pub async fn run(self) {
        log::info!("guidance: started (every {:?})", self.interval);
        let cancel = self.cancel.clone();

        loop {
            let started = Instant::now();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.cycle() => {}
            }

            let pause = remaining(self.interval, started.elapsed());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        log::info!("guidance: stopped");
    }

    async fn cycle(&self) {
        let Some(frame) = capture_frame(self.camera.as_ref()).await else {
            log::debug!("guidance: no frame this cycle");
            return;
        };

        let reply = self.vision.analyze(&frame, VisionMode::Navigation).await;
        if self.cancel.is_cancelled() {
            return;
        }

        if should_narrate(&reply) {
            log::info!("guidance: {reply}");
            self.speech.speak(&reply, false).await;
        } else {
            log::debug!("guidance: nothing to report");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
