//! Application paths resolved with the `dirs` crate.
//!
//! Layout on the device (Linux):
//!
//!   Config: ~/.config/vision-guide/settings.toml
//!   Models: ~/.local/share/vision-guide/models/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory holding `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for GGML Whisper model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "vision-guide";

    /// Resolves all paths, falling back to the current directory when the
    /// platform cannot provide a standard location.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
        }
    }

    /// Path of the Whisper model named `stem` (`<models_dir>/<stem>.bin`).
    pub fn model_file(&self, stem: &str) -> PathBuf {
        self.models_dir.join(format!("{stem}.bin"))
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
