//! Finite-state-machine types for the engine and its two channels.
//!
//! Transitions are driven by [`crate::engine::Engine`]; this module only
//! names the states and the legal moves between them.

/// Lifecycle of a [`crate::engine::Engine`].
///
/// ```text
///  IDLE ──connect()──▶ CONNECTING ──both channels up──▶ CONNECTED
///    ▲                     │                                │
///    └──── connect error ──┘                   disconnect() │
///                                                           ▼
///                                                     DISCONNECTED
/// ```
///
/// `disconnect()` moves any state to `Disconnected`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Constructed, no connection attempted yet (or the last attempt failed).
    #[default]
    Idle,
    /// DATA or ACK establishment in progress.
    Connecting,
    /// Both channels established; `enqueue` is accepted.
    Connected,
    /// Torn down locally.  Nothing further is sent.
    Disconnected,
}

impl EngineState {
    /// `true` when a move from `self` to `next` is allowed.
    pub fn can_transition(self, next: EngineState) -> bool {
        use EngineState::*;
        matches!(
            (self, next),
            (Idle, Connecting)
                | (Connecting, Connected)
                | (Connecting, Idle)
                | (_, Disconnected)
        )
    }

    /// `true` once [`EngineState::Disconnected`] has been reached.
    pub fn is_terminal(self) -> bool {
        self == EngineState::Disconnected
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Connection state of a single DATA or ACK channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Not opened yet.
    #[default]
    Disconnected,
    /// Stream established; the pump task is running.
    Connected,
    /// Closed by the peer, by an I/O error, or by `disconnect()`.
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_initial_states() {
        assert_eq!(EngineState::default(), EngineState::Idle);
        assert_eq!(ChannelState::default(), ChannelState::Disconnected);
    }

    #[test]
    fn connect_path_is_legal() {
        assert!(EngineState::Idle.can_transition(EngineState::Connecting));
        assert!(EngineState::Connecting.can_transition(EngineState::Connected));
        assert!(EngineState::Connecting.can_transition(EngineState::Idle));
    }

    #[test]
    fn disconnect_is_reachable_from_anywhere() {
        for s in [
            EngineState::Idle,
            EngineState::Connecting,
            EngineState::Connected,
            EngineState::Disconnected,
        ] {
            assert!(s.can_transition(EngineState::Disconnected), "{s}");
        }
    }

    #[test]
    fn disconnected_is_terminal() {
        let s = EngineState::Disconnected;
        assert!(s.is_terminal());
        assert!(!s.can_transition(EngineState::Idle));
        assert!(!s.can_transition(EngineState::Connecting));
        assert!(!s.can_transition(EngineState::Connected));
    }

    #[test]
    fn cannot_skip_connecting() {
        assert!(!EngineState::Idle.can_transition(EngineState::Connected));
    }
}
