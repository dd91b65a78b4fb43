//! Configuration module for the vision guide.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for each
//! subsystem, `AppPaths` for the platform data directories, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save_to`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, CameraConfig, GuidanceConfig, Messages, ObstacleConfig, SpeechConfig,
    VisionConfig, VoiceConfig,
};
