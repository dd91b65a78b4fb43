//! Speech synthesis backends.
//!
//! A [`Synthesizer`] turns text into audible speech and returns when
//! playback has finished or the interrupt token fired.  [`CommandSynthesizer`]
//! delegates both synthesis and playback to an external program (default
//! `espeak-ng`) and kills it on interrupt, so stopping is bounded by process
//! teardown rather than by the length of the utterance.

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::SpeechConfig;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("cannot start speech program `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("speech program exited with {0}")]
    Failed(String),

    #[error("speech playback I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speaks one utterance on the audio output device.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Speak `text`.  Must return promptly once `interrupt` is cancelled.
    async fn say(&self, text: &str, interrupt: CancellationToken) -> Result<(), SpeechError>;
}

// ---------------------------------------------------------------------------
// CommandSynthesizer
// ---------------------------------------------------------------------------

pub struct CommandSynthesizer {
    config: SpeechConfig,
}

impl CommandSynthesizer {
    pub fn new(config: SpeechConfig) -> Self {
        Self { config }
    }

    fn args(&self, text: &str) -> Vec<String> {
        let rate = self.config.words_per_minute.to_string();
        self.config
            .args
            .iter()
            .map(|a| a.replace("{rate}", &rate).replace("{text}", text))
            .collect()
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn say(&self, text: &str, interrupt: CancellationToken) -> Result<(), SpeechError> {
        if interrupt.is_cancelled() {
            return Ok(());
        }

        let mut child = Command::new(&self.config.program)
            .args(self.args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpeechError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SpeechError::Failed(status.to_string()))
                }
            }
            _ = interrupt.cancelled() => {
                log::debug!("speech: interrupted, killing playback");
                child.kill().await?;
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
