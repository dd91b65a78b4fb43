//! Distance polling with buzzer tiers and a rate-limited spoken warning.
//!
//! The buzzer follows every sample.  The spoken warning has its own
//! cooldown so that buzzing stays responsive while speech stays sparse.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ObstacleConfig;
use crate::hardware::{Buzzer, DistanceSensor, ObstacleLevel};
use crate::speech::SpeechOutputQueue;

pub struct ObstacleMonitor {
    sensor: Arc<dyn DistanceSensor>,
    buzzer: Buzzer,
    speech: SpeechOutputQueue,
    config: ObstacleConfig,
    warning: String,
    cancel: CancellationToken,
    last_warned: Option<Instant>,
}

impl ObstacleMonitor {
    pub fn new(
        sensor: Arc<dyn DistanceSensor>,
        buzzer: Buzzer,
        speech: SpeechOutputQueue,
        config: ObstacleConfig,
        warning: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sensor,
            buzzer,
            speech,
            config,
            warning,
            cancel,
            last_warned: None,
        }
    }

    /// Poll until the token is cancelled.
    ///
    /// Only the sensor sample and the sleep race the token.  A buzzer
    /// pattern that has started always finishes, so the pin never stays
    /// high after the monitor exits.
    pub async fn run(mut self) {
        let interval = self.config.poll_interval();
        log::info!("obstacle: monitoring every {interval:?}");
        let cancel = self.cancel.clone();

        loop {
            let distance = tokio::select! {
                _ = cancel.cancelled() => break,
                distance = self.sensor.measure() => distance,
            };
            self.handle_reading(distance).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        log::info!("obstacle: stopped");
    }

    /// React to one sample.  `None` means nothing was detected.
    pub async fn handle_reading(&mut self, distance: Option<f64>) {
        let Some(distance) = distance else {
            return;
        };

        if distance < self.config.voice_warning_cm && self.cooldown_elapsed(Instant::now()) {
            log::info!("obstacle: {distance:.0} cm ahead");
            self.last_warned = Some(Instant::now());
            self.speech.speak(&self.warning, false).await;
        }

        let level =
            ObstacleLevel::classify(distance, self.config.critical_cm, self.config.warning_cm);
        if let Some(pattern) = level.pattern() {
            log::debug!("obstacle: {distance:.1} cm, {level:?}");
            self.buzzer.buzz(pattern).await;
        }
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        let cooldown: Duration = self.config.voice_cooldown();
        self.last_warned
            .map_or(true, |last| now.duration_since(last) >= cooldown)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
