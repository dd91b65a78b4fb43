//! Session core: the mode state machine and the loops it starts.
//!
//! # Architecture
//!
//! ```text
//! SessionController  (one task, commands applied in order)
//!   ├─ GuidanceWorker   ┐ spawned together on one child token
//!   ├─ ObstacleMonitor  ┘ while guidance is on
//!   └─ ChatSession      invoked inline for each chat turn
//!
//! all of them ──▶ SpeechOutputQueue ──▶ Synthesizer
//! ```

pub mod chat;
pub mod controller;
pub mod guidance;
pub mod obstacle;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use chat::ChatSession;
pub use controller::{Collaborators, ExitHandle, SessionController, SHUTDOWN_JOIN_TIMEOUT};
pub use guidance::GuidanceWorker;
pub use obstacle::ObstacleMonitor;
pub use state::{Mode, SessionState};
