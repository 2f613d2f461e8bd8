//! Error types for the session core.

/// Errors that can abort a session-establishment attempt.
///
/// Establishment-phase failures surface through the controller `status`
/// string and roll the controller back to an idle-equivalent resource state.
/// Post-establishment problems (malformed events, missing tool handlers) are
/// isolated per message and never reach this type.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The user (or OS) denied microphone access.
    #[error("microphone permission denied: {0}")]
    MicPermissionDenied(String),

    /// A microphone exists but could not be opened (busy or disconnected).
    #[error("microphone unavailable: {0}")]
    MicUnavailable(String),

    /// No input device is present at all.
    #[error("no microphone found")]
    NoInputDevice,

    /// Token-issuance round trip failed.
    #[error("token fetch failed: {0}")]
    TokenFetch(String),

    /// Peer-connection construction or the SDP offer/answer exchange failed.
    #[error("transport establishment failed: {0}")]
    Transport(String),

    /// `stop_session` was called while establishment was still in flight.
    #[error("session start cancelled")]
    Cancelled,

    /// A session is already active.
    #[error("session already active")]
    AlreadyActive,

    /// The event channel is not open (e.g. `send_text_message` before start).
    #[error("event channel not open")]
    ChannelClosed,
}
