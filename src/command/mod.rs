//! Voice command classification.
//!
//! [`PhraseTable`] is an ordered list of command categories, each with its
//! trigger phrases.  [`route`] scans it in declared order and returns the
//! first category with a phrase contained in the (lower-cased, trimmed)
//! transcript.  Earlier categories win ties, so table order matters:
//!
//! ```
//! use vision_guide::command::{route, CommandKind, PhraseTable};
//!
//! let table = PhraseTable::default();
//! assert_eq!(route(&table, "Please GUIDE ME now").kind, CommandKind::Guide);
//! assert_eq!(route(&table, "banana").kind, CommandKind::Unmatched);
//! ```

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CommandKind / Command
// ---------------------------------------------------------------------------

/// Category a recognised utterance falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Activate,
    Guide,
    StopGuide,
    ReadText,
    Describe,
    Chat,
    ExitChat,
    Exit,
    /// No phrase matched; only meaningful as chat input.
    Unmatched,
}

/// A routed utterance.  `transcript` is the recogniser output exactly as
/// heard (original casing, untrimmed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub transcript: String,
}

impl Command {
    pub fn new(kind: CommandKind, transcript: impl Into<String>) -> Self {
        Self {
            kind,
            transcript: transcript.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// PhraseTable
// ---------------------------------------------------------------------------

/// One category of the phrase table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseEntry {
    pub kind: CommandKind,
    pub phrases: Vec<String>,
}

/// Ordered mapping from command category to trigger phrases.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhraseTable {
    entries: Vec<PhraseEntry>,
}

impl PhraseTable {
    pub fn new(entries: Vec<PhraseEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PhraseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PhraseTable {
    /// The stock English command set.
    ///
    /// `exit_chat` is declared before `chat` because every exit phrase also
    /// contains a chat phrase ("exit chat" ⊃ "chat").
    fn default() -> Self {
        fn entry(kind: CommandKind, phrases: &[&str]) -> PhraseEntry {
            PhraseEntry {
                kind,
                phrases: phrases.iter().map(|p| p.to_string()).collect(),
            }
        }

        Self::new(vec![
            entry(CommandKind::Activate, &["hi siri", "hey assistant", "hello"]),
            entry(
                CommandKind::Guide,
                &["guide me", "start guidance", "navigate", "help me walk"],
            ),
            entry(
                CommandKind::StopGuide,
                &["stop guidance", "stop guiding", "pause"],
            ),
            entry(
                CommandKind::ReadText,
                &["read text", "read this", "what does it say", "ocr"],
            ),
            entry(
                CommandKind::Describe,
                &["describe", "what is around", "what do you see", "scene"],
            ),
            entry(
                CommandKind::ExitChat,
                &["exit chat", "stop chat", "end conversation"],
            ),
            entry(
                CommandKind::Exit,
                &["system exit", "shutdown", "goodbye", "bye"],
            ),
            entry(CommandKind::Chat, &["chat", "talk to me", "conversation"]),
        ])
    }
}

// ---------------------------------------------------------------------------
// route
// ---------------------------------------------------------------------------

/// Classify `transcript` against `table`.
///
/// Matching is a case-insensitive substring search on the trimmed
/// transcript; the first category (in table order) with any matching phrase
/// wins.  Empty phrases never match.
pub fn route(table: &PhraseTable, transcript: &str) -> Command {
    let needle = transcript.trim().to_lowercase();

    let kind = table
        .entries
        .iter()
        .find(|entry| {
            entry.phrases.iter().any(|phrase| {
                let phrase = phrase.trim().to_lowercase();
                !phrase.is_empty() && needle.contains(&phrase)
            })
        })
        .map(|entry| entry.kind)
        .unwrap_or(CommandKind::Unmatched);

    Command::new(kind, transcript)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PhraseTable {
        PhraseTable::default()
    }

    #[test]
    fn unmatched_keeps_transcript() {
        let cmd = route(&table(), "banana");
        assert_eq!(cmd, Command::new(CommandKind::Unmatched, "banana"));
    }

    #[test]
    fn match_is_case_insensitive_and_keeps_original_text() {
        let cmd = route(&table(), "  Hey, GUIDE Me to the door ");
        assert_eq!(cmd.kind, CommandKind::Guide);
        assert_eq!(cmd.transcript, "  Hey, GUIDE Me to the door ");
    }

    #[test]
    fn each_category_is_reachable() {
        let cases = [
            ("hi siri", CommandKind::Activate),
            ("start guidance please", CommandKind::Guide),
            ("stop guiding", CommandKind::StopGuide),
            ("what does it say", CommandKind::ReadText),
            ("what do you see", CommandKind::Describe),
            ("let's chat", CommandKind::Chat),
            ("exit chat", CommandKind::ExitChat),
            ("end conversation", CommandKind::ExitChat),
            ("system exit", CommandKind::Exit),
        ];
        for (text, kind) in cases {
            assert_eq!(route(&table(), text).kind, kind, "transcript {text:?}");
        }
    }

    #[test]
    fn earlier_category_wins_on_overlap() {
        // "hello" (activate) and "describe" both present.
        assert_eq!(
            route(&table(), "hello, describe the room").kind,
            CommandKind::Activate
        );

        let custom = PhraseTable::new(vec![
            PhraseEntry {
                kind: CommandKind::Chat,
                phrases: vec!["chat".into()],
            },
            PhraseEntry {
                kind: CommandKind::ExitChat,
                phrases: vec!["exit chat".into()],
            },
        ]);
        assert_eq!(route(&custom, "exit chat").kind, CommandKind::Chat);
    }

    #[test]
    fn empty_phrases_and_empty_table_never_match() {
        let custom = PhraseTable::new(vec![PhraseEntry {
            kind: CommandKind::Exit,
            phrases: vec!["".into(), "   ".into()],
        }]);
        assert_eq!(route(&custom, "anything").kind, CommandKind::Unmatched);
        assert_eq!(
            route(&PhraseTable::new(Vec::new()), "hi siri").kind,
            CommandKind::Unmatched
        );
    }

    #[test]
    fn configured_phrases_are_lowercased_before_matching() {
        let custom = PhraseTable::new(vec![PhraseEntry {
            kind: CommandKind::ReadText,
            phrases: vec!["Read Label".into()],
        }]);
        assert_eq!(route(&custom, "read label").kind, CommandKind::ReadText);
    }
}
