//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across tasks.
//! Every section is `#[serde(default)]` so a partial `settings.toml` only
//! overrides what it names.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::command::PhraseTable;

// ---------------------------------------------------------------------------
// VisionConfig
// ---------------------------------------------------------------------------

/// Connection settings for the remote vision / chat endpoint.
///
/// Any OpenAI-compatible `/chat/completions` endpoint that accepts image
/// content parts works (OpenRouter, OpenAI, a local vLLM …).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Full URL of the chat-completions endpoint.
    pub url: String,
    /// API key.  `None` (or empty) means the service is not configured and
    /// every analysis degrades to the apology text.
    pub api_key: Option<String>,
    /// Model identifier sent with each request.
    pub model: String,
    /// Sampling temperature (0.0 – 1.0).
    pub temperature: f32,
    /// Upper bound on generated tokens per reply.
    pub max_tokens: u32,
    /// Maximum seconds to wait for a response before timing out.
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            url: "https://openrouter.ai/api/v1/chat/completions".into(),
            api_key: None,
            model: "google/gemma-3-4b-it:free".into(),
            temperature: 0.4,
            max_tokens: 200,
            timeout_secs: 15,
        }
    }
}

impl VisionConfig {
    /// Returns `true` when a non-empty API key is present.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// CameraConfig
// ---------------------------------------------------------------------------

/// Still-capture settings.  The camera is opened per capture, never held.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture program that writes a single JPEG to stdout.
    pub program: String,
    /// Arguments passed to `program`.  `{width}`, `{height}` and `{quality}`
    /// are substituted before spawning.
    pub args: Vec<String>,
    pub width: u32,
    pub height: u32,
    /// JPEG quality (1 – 100); lower uploads faster.
    pub jpeg_quality: u8,
    /// Hard limit on a single capture, including device open.
    pub timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            program: "rpicam-still".into(),
            args: [
                "--nopreview",
                "--immediate",
                "--width",
                "{width}",
                "--height",
                "{height}",
                "--quality",
                "{quality}",
                "--output",
                "-",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            width: 640,
            height: 480,
            jpeg_quality: 70,
            timeout_ms: 5_000,
        }
    }
}

// ---------------------------------------------------------------------------
// GuidanceConfig
// ---------------------------------------------------------------------------

/// Cadence of the camera-based navigation narration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// Target seconds between the starts of two capture cycles.
    pub capture_interval_secs: f32,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            capture_interval_secs: 3.0,
        }
    }
}

impl GuidanceConfig {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs_f32(self.capture_interval_secs.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// ObstacleConfig
// ---------------------------------------------------------------------------

/// Ultrasonic sensor wiring and obstacle alert tiers.
///
/// Distances are in centimetres.  Pin numbers are BCM GPIO numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub trig_pin: u32,
    pub echo_pin: u32,
    pub buzzer_pin: u32,
    /// Below this distance the buzzer double-pulses.
    pub critical_cm: f64,
    /// Below this distance (and at or above `critical_cm`) the buzzer
    /// single-pulses.
    pub warning_cm: f64,
    /// Below this distance a spoken warning is issued, rate limited by
    /// `voice_cooldown_secs`.
    pub voice_warning_cm: f64,
    pub voice_cooldown_secs: f32,
    /// Delay between two distance samples.
    pub poll_interval_ms: u64,
    /// Readings outside `[min_range_cm, max_range_cm]` count as no echo.
    pub min_range_cm: f64,
    pub max_range_cm: f64,
    /// Give up waiting for the echo edge after this long.
    pub echo_timeout_ms: u64,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            trig_pin: 23,
            echo_pin: 24,
            buzzer_pin: 18,
            critical_cm: 15.0,
            warning_cm: 30.0,
            voice_warning_cm: 20.0,
            voice_cooldown_secs: 3.0,
            poll_interval_ms: 200,
            min_range_cm: 2.0,
            max_range_cm: 400.0,
            echo_timeout_ms: 100,
        }
    }
}

impl ObstacleConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn voice_cooldown(&self) -> Duration {
        Duration::from_secs_f32(self.voice_cooldown_secs.max(0.0))
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Text-to-speech program invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Program that synthesises and plays its text argument, exiting when
    /// playback is complete.
    pub program: String,
    /// Arguments; `{text}` is replaced by the utterance and `{rate}` by
    /// `words_per_minute`.
    pub args: Vec<String>,
    pub words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            program: "espeak-ng".into(),
            args: vec!["-s".into(), "{rate}".into(), "{text}".into()],
            words_per_minute: 160,
        }
    }
}

// ---------------------------------------------------------------------------
// VoiceConfig
// ---------------------------------------------------------------------------

/// Continuous voice-command recognition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// GGML Whisper model file stem, resolved under the models directory.
    pub model: String,
    /// ISO-639-1 language code, or `"auto"`.
    pub language: String,
    /// Seconds to wait for speech to begin before re-checking liveness.
    pub listen_timeout_secs: f32,
    /// Hard limit on a single utterance.
    pub phrase_limit_secs: f32,
    /// Trailing silence that ends an utterance.
    pub pause_secs: f32,
    /// RMS level above which a frame counts as speech.
    pub energy_threshold: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            model: "ggml-base.en".into(),
            language: "en".into(),
            listen_timeout_secs: 3.0,
            phrase_limit_secs: 10.0,
            pause_secs: 0.8,
            energy_threshold: 0.02,
        }
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Fixed phrases spoken by the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub startup: String,
    pub activated: String,
    pub guidance_start: String,
    pub guidance_stop: String,
    pub chat_start: String,
    pub chat_end: String,
    pub shutdown: String,
    pub error_camera: String,
    pub error_microphone: String,
    pub obstacle_warning: String,
    pub reading_text: String,
    pub analyzing: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            startup: "Smart Vision Guide ready. Say 'Hi Siri' to begin.".into(),
            activated: "System activated. Say 'guide me' for navigation, or 'describe' for scene description.".into(),
            guidance_start: "Guidance mode started. I'll help you navigate.".into(),
            guidance_stop: "Guidance paused.".into(),
            chat_start: "Chat mode. Ask me anything. Say 'exit chat' when done.".into(),
            chat_end: "Chat ended. Returning to standby.".into(),
            shutdown: "System shutting down. Goodbye.".into(),
            error_camera: "Camera error. Please check the connection.".into(),
            error_microphone: "Voice recognition failed. Check microphone.".into(),
            obstacle_warning: "Warning! Obstacle very close ahead.".into(),
            reading_text: "Reading text...".into(),
            analyzing: "Analyzing scene...".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vision: VisionConfig,
    pub camera: CameraConfig,
    pub guidance: GuidanceConfig,
    pub obstacle: ObstacleConfig,
    pub speech: SpeechConfig,
    pub voice: VoiceConfig,
    pub messages: Messages,
    /// Voice command phrases, scanned in declared order.
    pub commands: PhraseTable,
}

/// Environment variables that override the vision endpoint settings.
pub const ENV_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_URL: &str = "OPENROUTER_URL";
pub const ENV_MODEL: &str = "OPENROUTER_MODEL";

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml` and
    /// apply environment overrides.
    ///
    /// Returns defaults when the file does not exist yet.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&AppPaths::new().settings_file)?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to an explicit path, creating parent directories as needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Overlay vision credentials from the environment.  Empty values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.vision.api_key = Some(key);
        }
        if let Some(url) = get(ENV_URL) {
            self.vision.url = url;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.vision.model = model;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");

        assert_eq!(config.vision.model, VisionConfig::default().model);
        assert_eq!(config.obstacle.critical_cm, 15.0);
        assert_eq!(config.commands.len(), PhraseTable::default().len());
    }

    #[test]
    fn default_values_match_device_wiring() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.guidance.capture_interval(), Duration::from_secs(3));
        assert_eq!(cfg.obstacle.warning_cm, 30.0);
        assert_eq!(cfg.obstacle.voice_warning_cm, 20.0);
        assert_eq!(cfg.obstacle.poll_interval(), Duration::from_millis(200));
        assert_eq!(cfg.obstacle.voice_cooldown(), Duration::from_secs(3));
        assert_eq!(cfg.camera.width, 640);
        assert_eq!(cfg.camera.jpeg_quality, 70);
        assert!(!cfg.vision.is_configured());
    }

    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.vision.api_key = Some("sk-test".into());
        cfg.guidance.capture_interval_secs = 5.0;
        cfg.obstacle.buzzer_pin = 12;
        cfg.messages.activated = "Ready.".into();

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.vision.api_key.as_deref(), Some("sk-test"));
        assert_eq!(loaded.guidance.capture_interval_secs, 5.0);
        assert_eq!(loaded.obstacle.buzzer_pin, 12);
        assert_eq!(loaded.messages.activated, "Ready.");
        assert_eq!(
            loaded.commands.entries().first().map(|e| e.kind),
            Some(CommandKind::Activate)
        );
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "[obstacle]\ncritical_cm = 10.0\n").unwrap();

        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.obstacle.critical_cm, 10.0);
        assert_eq!(loaded.obstacle.warning_cm, 30.0);
        assert_eq!(loaded.speech.program, "espeak-ng");
    }

    #[test]
    fn env_overrides_vision_settings() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "or-key"),
            (ENV_MODEL, "some/model"),
            (ENV_URL, "   "),
        ]
        .into_iter()
        .collect();

        let mut cfg = AppConfig::default();
        cfg.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert!(cfg.vision.is_configured());
        assert_eq!(cfg.vision.model, "some/model");
        // Blank values do not clobber the default URL.
        assert_eq!(cfg.vision.url, VisionConfig::default().url);
    }
}
