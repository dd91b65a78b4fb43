//! Microphone audio for voice commands.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (std mpsc)
//!           → AudioChunk::to_mono_16k → Segmenter → utterance (Vec<f32>)
//! ```

pub mod capture;
pub mod resample;
pub mod segmenter;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use resample::{downmix, resample_to_16k, WHISPER_SAMPLE_RATE};
pub use segmenter::Segmenter;
