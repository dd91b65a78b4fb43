//! Smart Vision Guide: a voice-controlled assistive device controller.
//!
//! The user speaks commands; the [`session::SessionController`] switches
//! between standby, guidance (camera narration plus ultrasonic obstacle
//! alerts), one-shot text reading and scene description, and free-form chat.
//! All output is spoken through a single [`speech::SpeechOutputQueue`].

pub mod audio;
pub mod camera;
pub mod command;
pub mod config;
pub mod hardware;
pub mod session;
pub mod speech;
pub mod stt;
pub mod vision;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
