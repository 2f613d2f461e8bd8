//! Ordered conversation log built from interleaved streaming events.
//!
//! The log enforces two structural invariants:
//! - at most one open (non-final) user entry exists at a time, tracked by the
//!   ephemeral-entry handle;
//! - at most one open assistant entry exists, and only as the tail of the log.
//!
//! Entries are append-ordered and never reordered or deleted. The open entry
//! is mutated in place; finalization is terminal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Placeholder text shown while the transport transcribes a committed
/// utterance and no partial transcript has arrived yet.
pub const PROCESSING_PLACEHOLDER: &str = "Processing speech...";

/// Who produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Live-dictation state of a user entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// The user is (or was just) speaking; text is a partial transcript.
    Speaking,
    /// The input buffer was committed and transcription is in flight.
    Processing,
    /// The entry is closed to further mutation.
    Final,
}

/// One turn in the conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationEntry {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub is_final: bool,
    /// Meaningful for user entries during live dictation only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
}

impl ConversationEntry {
    fn new(role: Role, text: String, status: Option<EntryStatus>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text,
            timestamp: Utc::now(),
            is_final: false,
            status,
        }
    }
}

/// Append-ordered conversation log with single-open-entry bookkeeping.
#[derive(Debug, Default)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
    /// Id of the single open user entry, if any.
    ephemeral_user: Option<String>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the entries, in arrival order.
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Id of the current ephemeral (open) user entry, if any.
    pub fn ephemeral_user_id(&self) -> Option<&str> {
        self.ephemeral_user.as_deref()
    }

    fn ephemeral_entry_mut(&mut self) -> Option<&mut ConversationEntry> {
        let id = self.ephemeral_user.clone()?;
        self.entries.iter_mut().find(|e| e.id == id)
    }

    /// Speech started: open the ephemeral user entry, or reuse the existing
    /// open one. Never creates a second open user entry.
    pub fn begin_user_utterance(&mut self) {
        if let Some(entry) = self.ephemeral_entry_mut() {
            entry.status = Some(EntryStatus::Speaking);
            return;
        }
        let entry = ConversationEntry::new(Role::User, String::new(), Some(EntryStatus::Speaking));
        self.ephemeral_user = Some(entry.id.clone());
        self.entries.push(entry);
    }

    /// Input buffer committed: transcript is now in flight.
    pub fn mark_user_committed(&mut self) {
        if let Some(entry) = self.ephemeral_entry_mut() {
            entry.text = PROCESSING_PLACEHOLDER.to_string();
            entry.status = Some(EntryStatus::Processing);
        }
    }

    /// Streamed partial-transcript delta: extend the ephemeral entry text.
    ///
    /// The processing placeholder is display-only, so the first delta after a
    /// commit replaces it instead of appending.
    pub fn append_user_partial(&mut self, delta: &str) {
        if let Some(entry) = self.ephemeral_entry_mut() {
            if entry.status == Some(EntryStatus::Processing) {
                entry.text.clear();
            }
            entry.text.push_str(delta);
            entry.status = Some(EntryStatus::Speaking);
        }
    }

    /// Final user transcript: close the ephemeral entry and clear the handle
    /// so the next utterance opens a fresh entry.
    pub fn finalize_user(&mut self, transcript: &str) {
        if let Some(entry) = self.ephemeral_entry_mut() {
            entry.text = transcript.to_string();
            entry.is_final = true;
            entry.status = Some(EntryStatus::Final);
        }
        self.ephemeral_user = None;
    }

    /// Assistant transcript delta: append to an open assistant tail, or start
    /// a new assistant entry.
    pub fn append_assistant_delta(&mut self, delta: &str) {
        if let Some(tail) = self.entries.last_mut() {
            if tail.role == Role::Assistant && !tail.is_final {
                tail.text.push_str(delta);
                return;
            }
        }
        let entry = ConversationEntry::new(Role::Assistant, delta.to_string(), None);
        self.entries.push(entry);
    }

    /// Assistant transcript done: close the open assistant tail.
    pub fn finalize_assistant(&mut self) {
        if let Some(tail) = self.entries.last_mut() {
            if tail.role == Role::Assistant {
                tail.is_final = true;
            }
        }
    }

    /// Typed text has no streaming phase: append an already-final user entry.
    pub fn push_user_text(&mut self, text: &str) {
        let mut entry =
            ConversationEntry::new(Role::User, text.to_string(), Some(EntryStatus::Final));
        entry.is_final = true;
        self.entries.push(entry);
    }

    /// Discard everything (session stop).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ephemeral_user = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_deltas_accumulate_in_tail() {
        let mut log = ConversationLog::new();
        log.append_assistant_delta("Hi");
        log.append_assistant_delta(" there");
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.entries()[0].text, "Hi there");
        assert!(!log.entries()[0].is_final);
    }

    #[test]
    fn test_done_then_delta_opens_new_entry() {
        let mut log = ConversationLog::new();
        log.append_assistant_delta("First");
        log.finalize_assistant();
        log.append_assistant_delta("Second");
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.entries()[0].text, "First");
        assert!(log.entries()[0].is_final);
        assert_eq!(log.entries()[1].text, "Second");
        assert!(!log.entries()[1].is_final);
    }

    #[test]
    fn test_double_speech_started_reuses_ephemeral_entry() {
        let mut log = ConversationLog::new();
        log.begin_user_utterance();
        let first_id = log.ephemeral_user_id().unwrap().to_string();
        log.begin_user_utterance();
        assert_eq!(log.entries().len(), 1);
        assert_eq!(log.ephemeral_user_id(), Some(first_id.as_str()));
    }

    #[test]
    fn test_final_transcript_clears_handle_and_next_utterance_is_fresh() {
        let mut log = ConversationLog::new();
        log.begin_user_utterance();
        let first_id = log.ephemeral_user_id().unwrap().to_string();
        log.finalize_user("hello");
        assert!(log.ephemeral_user_id().is_none());

        log.begin_user_utterance();
        let second_id = log.ephemeral_user_id().unwrap().to_string();
        assert_ne!(first_id, second_id);
        assert_eq!(log.entries().len(), 2);
        assert!(log.entries()[0].is_final);
    }

    #[test]
    fn test_partial_then_final_produces_single_closed_entry() {
        let mut log = ConversationLog::new();
        log.begin_user_utterance();
        log.append_user_partial("hel");
        log.append_user_partial("lo");
        log.finalize_user("hello");
        assert_eq!(log.entries().len(), 1);
        let entry = &log.entries()[0];
        assert_eq!(entry.text, "hello");
        assert!(entry.is_final);
        assert_eq!(entry.status, Some(EntryStatus::Final));
    }

    #[test]
    fn test_partial_delta_replaces_placeholder_then_appends() {
        let mut log = ConversationLog::new();
        log.begin_user_utterance();
        log.mark_user_committed();
        log.append_user_partial("hel");
        log.append_user_partial("lo");
        let entry = &log.entries()[0];
        assert_eq!(entry.text, "hello");
        assert_eq!(entry.status, Some(EntryStatus::Speaking));
    }

    #[test]
    fn test_committed_sets_processing_placeholder() {
        let mut log = ConversationLog::new();
        log.begin_user_utterance();
        log.mark_user_committed();
        let entry = &log.entries()[0];
        assert_eq!(entry.text, PROCESSING_PLACEHOLDER);
        assert_eq!(entry.status, Some(EntryStatus::Processing));
    }

    #[test]
    fn test_finalized_assistant_entry_never_mutates() {
        let mut log = ConversationLog::new();
        log.append_assistant_delta("done");
        log.finalize_assistant();
        let frozen = log.entries()[0].text.clone();
        log.append_assistant_delta("!");
        assert_eq!(log.entries()[0].text, frozen);
    }

    #[test]
    fn test_clear_resets_log_and_handle() {
        let mut log = ConversationLog::new();
        log.begin_user_utterance();
        log.append_assistant_delta("x");
        log.clear();
        assert!(log.is_empty());
        assert!(log.ephemeral_user_id().is_none());
    }
}
