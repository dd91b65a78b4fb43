//! Operating-mode flags owned by the session controller.
//!
//! [`SessionState`] is mutated only by the controller while it applies a
//! command.  Worker loops never read it; they watch their own cancellation
//! token instead.  [`Mode`] is the label derived from the flags, used for
//! logging and tests.

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Coarse operating mode.
///
/// ```text
/// Standby ──activate──▶ Idle ──guide──▶ Guiding ──chat──▶ GuidingAndChatting
///                        │  ◀──stop guide──┘                  │
///                        └──chat──▶ Chatting ◀──stop guide────┘
/// any active mode ──exit──▶ Terminating
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Waiting for the wake phrase; every other command is ignored.
    #[default]
    Standby,
    Idle,
    Guiding,
    Chatting,
    GuidingAndChatting,
    /// Shutdown has started.  No further commands are applied.
    Terminating,
}

impl Mode {
    /// ```
    /// use vision_guide::session::Mode;
    ///
    /// assert!(!Mode::Standby.is_active());
    /// assert!(Mode::Idle.is_active());
    /// assert!(Mode::GuidingAndChatting.is_active());
    /// assert!(!Mode::Terminating.is_active());
    /// ```
    pub fn is_active(&self) -> bool {
        !matches!(self, Mode::Standby | Mode::Terminating)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Standby => "Standby",
            Mode::Idle => "Active-Idle",
            Mode::Guiding => "Active-Guiding",
            Mode::Chatting => "Active-Chatting",
            Mode::GuidingAndChatting => "Active-Guiding+Chatting",
            Mode::Terminating => "Terminating",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Invariant: `guidance_active` and `chat_active` imply `system_active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionState {
    pub system_active: bool,
    pub guidance_active: bool,
    pub chat_active: bool,
    pub terminating: bool,
}

impl SessionState {
    pub fn mode(&self) -> Mode {
        if self.terminating {
            return Mode::Terminating;
        }
        if !self.system_active {
            return Mode::Standby;
        }
        match (self.guidance_active, self.chat_active) {
            (false, false) => Mode::Idle,
            (true, false) => Mode::Guiding,
            (false, true) => Mode::Chatting,
            (true, true) => Mode::GuidingAndChatting,
        }
    }

    /// `true` when the flags respect the activation invariant.
    pub fn is_consistent(&self) -> bool {
        self.system_active || !(self.guidance_active || self.chat_active)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
