//! Realtime transport: token issuance and the WebRTC peer session.
//!
//! The wire protocol itself is the provider's contract; this module only
//! establishes the connection and shuttles already-typed events and decoded
//! audio frames between it and the session controller.

pub mod token;
pub mod webrtc;

use crate::events::ServerEvent;

pub use token::TokenClient;
pub use webrtc::{connect, TransportChannels, WebRtcHandle};

/// What the controller's event loop receives from the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A parsed inbound control/data message.
    Message(ServerEvent),
    /// The event channel or peer connection went away. The controller treats
    /// this as an implicit stop; no reconnection is attempted.
    Closed,
}
