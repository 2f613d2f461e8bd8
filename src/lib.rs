//! Realtime voice-session core for the AI debate demo.
//!
//! Establishes a WebRTC audio session against a realtime voice model,
//! interprets the event stream into an ordered conversation log, infers
//! assistant playback from inbound audio energy, and dispatches model
//! function calls to registered handlers. The embedding process drives it
//! through [`session::SessionController`] and receives state changes as
//! [`session::Notification`] values; the `debate-voice-core` binary wraps
//! the controller in a JSON-line stdio bridge.

pub mod audio;
pub mod config;
pub mod conversation;
pub mod detector;
pub mod error;
pub mod events;
pub mod ipc;
pub mod session;
pub mod tools;
pub mod transport;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{Notification, SessionController};
