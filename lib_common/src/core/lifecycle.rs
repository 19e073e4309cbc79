//! # Connection Lifecycle
//!
//! The feed connection moves through `Uninitialized → Connecting → Open →
//! Closed`. A closed connection only comes back through a new activation,
//! either explicit or granted by the reconnect policy.

use std::fmt;

/// Observable state of the feed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No activation has happened yet.
    #[default]
    Uninitialized,
    /// A handle was requested from the transport; waiting for it to open.
    Connecting,
    /// The transport reported the channel open; messages are flowing.
    Open,
    /// The handle was released, by request or because the transport went away.
    Closed,
}

/// Inputs of the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new connection handle is requested.
    Activate,
    /// The transport signalled open.
    TransportOpened,
    /// The transport signalled close.
    TransportClosed,
    /// The transport signalled an error.
    TransportFailed,
    /// The consumer asked to close.
    CloseRequested,
    /// The transport did not open in time.
    ConnectTimedOut,
}

impl ConnectionState {
    /// Next state for `event`, or `None` when the event does not apply in the
    /// current state.
    pub fn on(self, event: LifecycleEvent) -> Option<ConnectionState> {
        use ConnectionState::*;
        use LifecycleEvent::*;

        match (self, event) {
            (Uninitialized | Closed, Activate) => Some(Connecting),
            (Connecting, TransportOpened) => Some(Open),
            (Connecting, ConnectTimedOut) => Some(Closed),
            (Connecting | Open, TransportClosed | TransportFailed | CloseRequested) => Some(Closed),
            _ => None,
        }
    }

    /// True while a connection handle is held.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Uninitialized => "uninitialized",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::LifecycleEvent::*;

    #[test]
    fn happy_path() {
        let connecting = Uninitialized.on(Activate).unwrap();
        assert_eq!(connecting, Connecting);
        let open = connecting.on(TransportOpened).unwrap();
        assert_eq!(open, Open);
        assert_eq!(open.on(CloseRequested), Some(Closed));
    }

    #[test]
    fn open_closes_on_any_transport_signal() {
        assert_eq!(Open.on(TransportClosed), Some(Closed));
        assert_eq!(Open.on(TransportFailed), Some(Closed));
        assert_eq!(Connecting.on(TransportFailed), Some(Closed));
        assert_eq!(Connecting.on(ConnectTimedOut), Some(Closed));
    }

    #[test]
    fn closed_only_leaves_through_activation() {
        assert_eq!(Closed.on(TransportOpened), None);
        assert_eq!(Closed.on(TransportClosed), None);
        assert_eq!(Closed.on(CloseRequested), None);
        assert_eq!(Closed.on(Activate), Some(Connecting));
    }

    #[test]
    fn stray_signals_are_rejected() {
        assert_eq!(Uninitialized.on(TransportOpened), None);
        assert_eq!(Uninitialized.on(CloseRequested), None);
        assert_eq!(Open.on(Activate), None);
        assert_eq!(Open.on(TransportOpened), None);
        assert_eq!(Open.on(ConnectTimedOut), None);
        assert!(!Closed.is_live());
        assert!(Connecting.is_live());
    }
}
