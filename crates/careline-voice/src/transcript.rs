//! Rolling transcript of a session.
//!
//! Partial fragments accumulate per speaker; a final fragment or a turn
//! boundary flushes the buffer into a completed [`TranscriptTurn`].

use crate::wire::{Speaker, TranscriptFragment};
use chrono::{DateTime, Utc};

/// One completed utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub completed_at: DateTime<Utc>,
}

/// Accumulates fragments into ordered turns.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    turns: Vec<TranscriptTurn>,
    pending_user: String,
    pending_assistant: String,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Final fragments flush the speaker's pending text
    /// into a completed turn.
    pub fn push_fragment(&mut self, fragment: &TranscriptFragment) {
        let pending = match fragment.speaker {
            Speaker::User => &mut self.pending_user,
            Speaker::Assistant => &mut self.pending_assistant,
        };
        pending.push_str(&fragment.text);
        if !fragment.partial {
            self.flush(fragment.speaker);
        }
    }

    /// The endpoint signalled a turn boundary; anything still buffered is
    /// treated as final.
    pub fn turn_boundary(&mut self) {
        self.flush(Speaker::User);
        self.flush(Speaker::Assistant);
    }

    fn flush(&mut self, speaker: Speaker) {
        let pending = match speaker {
            Speaker::User => &mut self.pending_user,
            Speaker::Assistant => &mut self.pending_assistant,
        };
        if pending.is_empty() {
            return;
        }
        let text = std::mem::take(pending);
        self.turns.push(TranscriptTurn {
            speaker,
            text,
            completed_at: Utc::now(),
        });
    }

    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }
}
