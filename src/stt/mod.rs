//! Speech-to-text for voice commands.
//!
//! ```rust,no_run
//! use vision_guide::stt::{SttEngine, WhisperEngine};
//!
//! let engine = WhisperEngine::load("models/ggml-base.en.bin", "en")
//!     .expect("model not found");
//!
//! // 16 kHz mono f32 PCM from the audio module
//! let audio: Vec<f32> = vec![0.0; 16_000];
//! let text = engine.transcribe(&audio);
//! ```

pub mod engine;

pub use engine::{clean_transcript, SttEngine, SttError, WhisperEngine, MIN_AUDIO_SAMPLES};
