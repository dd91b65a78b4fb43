//! Spoken output.
//!
//! * [`SpeechOutputQueue`] — serialises every utterance onto the one audio
//!   device; blocking and fire-and-forget requests, prompt interruption.
//! * [`Synthesizer`] — backend trait; [`CommandSynthesizer`] runs a TTS
//!   program such as `espeak-ng`.

pub mod queue;
pub mod synth;

pub use queue::SpeechOutputQueue;
pub use synth::{CommandSynthesizer, SpeechError, Synthesizer};
