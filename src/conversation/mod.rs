use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Accumulates transcription deltas for the turn in progress.
#[derive(Debug, Default)]
pub struct TurnAggregator {
    pending_user: String,
    pending_assistant: String,
}

impl TurnAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_input_transcript_delta(&mut self, text: &str) {
        self.pending_user.push_str(text);
    }

    pub fn on_output_transcript_delta(&mut self, text: &str) {
        self.pending_assistant.push_str(text);
    }

    /// Finalize the turn. When either side has text, both a user and an
    /// assistant entry are returned, in that order, even if one is empty.
    pub fn on_turn_complete(&mut self) -> Option<[TranscriptEntry; 2]> {
        if self.pending_user.is_empty() && self.pending_assistant.is_empty() {
            return None;
        }

        let timestamp = now_ms();
        let user = TranscriptEntry {
            role: Role::User,
            text: std::mem::take(&mut self.pending_user),
            timestamp,
        };
        let assistant = TranscriptEntry {
            role: Role::Assistant,
            text: std::mem::take(&mut self.pending_assistant),
            timestamp,
        };
        Some([user, assistant])
    }

    pub fn pending_user(&self) -> &str {
        &self.pending_user
    }

    pub fn pending_assistant(&self) -> &str {
        &self.pending_assistant
    }

    /// Drop a half-finished turn, e.g. when the session ends.
    pub fn reset(&mut self) {
        self.pending_user.clear();
        self.pending_assistant.clear();
    }
}

/// Append-only transcript as shown to the user.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    entries: Vec<TranscriptEntry>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
