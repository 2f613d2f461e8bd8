//! Session lifecycle phases.

use std::fmt;

/// Where a session is in its lifecycle.
///
/// Establishment walks `RequestingMic -> FetchingToken -> Establishing ->
/// Active`; stopping from any of those lands in `Stopped`. A failed
/// establishment rolls back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    RequestingMic,
    FetchingToken,
    Establishing,
    Active,
    Stopped,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::RequestingMic => "requesting_mic",
            SessionPhase::FetchingToken => "fetching_token",
            SessionPhase::Establishing => "establishing",
            SessionPhase::Active => "active",
            SessionPhase::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(SessionPhase::RequestingMic.to_string(), "requesting_mic");
        assert_eq!(SessionPhase::Active.to_string(), "active");
    }
}
