//! IPC protocol types for communication with the embedding UI process.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (Rust -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> Rust).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::conversation::ConversationEntry;

// ---------------------------------------------------------------------------
// Events: Rust -> UI (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the UI via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum UiEvent {
    Starting {},
    Ready {},
    /// Establishment progress and status lines.
    Status { message: String },
    /// Full conversation snapshot after any change.
    Conversation { entries: Vec<ConversationEntry> },
    /// Assistant playback volume, 0..1.
    Volume { level: f32 },
    /// Assistant playback started/stopped.
    Playback { playing: bool },
    /// Session became active or inactive.
    SessionActive { active: bool },
    Error { message: String },
    AudioDevices { input: Vec<String> },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: UI -> Rust (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the UI via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum UiCommand {
    /// Start a voice session.
    StartSession {},
    /// Stop the current session (or cancel an in-flight start).
    StopSession {},
    /// The UI's single start/stop button.
    Toggle {},
    /// Send typed text into the conversation.
    Say { text: String },
    ListAudioDevices {},
    Ping {},
    /// Shut the process down.
    Stop {},
}
