//! Connector lifecycle states.

use std::fmt;

/// Lifecycle state of a connector.
///
/// ```text
/// STARTUP → WAIT → READY | ERROR
///            ↑       │       │
///            └───────┴───────┘   (rebind)
/// any non-closed state → CLOSED   (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorState {
    /// Constructed, never bound
    Startup,
    /// Bind or rebind in flight
    Wait,
    /// Bound and eligible for dispatch
    Ready,
    /// Last bind failed
    Error,
    /// Terminal
    Closed,
}

impl ConnectorState {
    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(self, next: ConnectorState) -> bool {
        use ConnectorState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Startup, Wait) => true,
            (Wait, Ready | Error | Wait) => true,
            (Ready, Wait | Error) => true,
            (Error, Wait) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectorState::Closed
    }

    /// Bind outcome known, either way
    pub fn is_settled(self) -> bool {
        !matches!(self, ConnectorState::Startup | ConnectorState::Wait)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectorState::Startup => "STARTUP",
            ConnectorState::Wait => "WAIT",
            ConnectorState::Ready => "READY",
            ConnectorState::Error => "ERROR",
            ConnectorState::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectorState::*;

    #[test]
    fn closed_is_terminal() {
        for next in [Startup, Wait, Ready, Error, Closed] {
            assert!(!Closed.can_transition_to(next));
        }
    }

    #[test]
    fn every_live_state_can_close() {
        for state in [Startup, Wait, Ready, Error] {
            assert!(state.can_transition_to(Closed));
        }
    }

    #[test]
    fn bind_cycle() {
        assert!(Startup.can_transition_to(Wait));
        assert!(!Startup.can_transition_to(Ready));
        assert!(Wait.can_transition_to(Ready));
        assert!(Wait.can_transition_to(Error));
        assert!(Error.can_transition_to(Wait));
        assert!(!Error.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Wait));
    }
}
