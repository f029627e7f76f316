//! Per-connection state machine for the TLS front-end.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Validate every state transition of a TLS connection
//!
//! ```text
//! AwaitingClientHello ──► ContextResolved ──► HandshakeComplete ──► RequestDispatch
//!          │                                                              │
//!          └──► NoMatchingContext ──► Closed ◄────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for connection IDs. Relaxed ordering: only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where a TLS connection is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted; waiting for the client's first handshake message.
    AwaitingClientHello,
    /// The requested server name has a registered identity.
    ContextResolved,
    /// Missing or unknown server name; the handshake is aborted.
    NoMatchingContext,
    HandshakeComplete,
    /// Requests are being served on the connection.
    RequestDispatch,
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (AwaitingClientHello, ContextResolved)
                | (AwaitingClientHello, NoMatchingContext)
                | (AwaitingClientHello, Closed)
                | (ContextResolved, HandshakeComplete)
                | (ContextResolved, Closed)
                | (NoMatchingContext, Closed)
                | (HandshakeComplete, RequestDispatch)
                | (HandshakeComplete, Closed)
                | (RequestDispatch, Closed)
        )
    }
}

/// A rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal connection transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Tracks one connection through its states, tracing each transition.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    id: ConnectionId,
    state: ConnectionState,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, "Connection accepted");
        Self {
            id,
            state: ConnectionState::AwaitingClientHello,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, or leave the state untouched if the move is illegal.
    pub fn advance(&mut self, next: ConnectionState) -> Result<(), IllegalTransition> {
        if !self.state.can_advance_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(
            connection_id = %self.id,
            from = ?self.state,
            to = ?next,
            "Connection state changed"
        );
        self.state = next;
        Ok(())
    }

    /// Close from whatever state the connection is in.
    pub fn close(&mut self) {
        if self.state != ConnectionState::Closed {
            // Every non-closed state may close.
            let _ = self.advance(ConnectionState::Closed);
        }
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[test]
    fn happy_path() {
        let mut conn = ConnectionLifecycle::new();
        for next in [ContextResolved, HandshakeComplete, RequestDispatch, Closed] {
            conn.advance(next).unwrap();
        }
        assert_eq!(conn.state(), Closed);
    }

    #[test]
    fn unknown_name_closes() {
        let mut conn = ConnectionLifecycle::new();
        conn.advance(NoMatchingContext).unwrap();
        assert_eq!(
            conn.advance(HandshakeComplete),
            Err(IllegalTransition {
                from: NoMatchingContext,
                to: HandshakeComplete
            })
        );
        conn.close();
        assert_eq!(conn.state(), Closed);
    }

    #[test]
    fn cannot_skip_the_handshake() {
        let mut conn = ConnectionLifecycle::new();
        assert!(conn.advance(RequestDispatch).is_err());
        assert!(conn.advance(HandshakeComplete).is_err());
        assert_eq!(conn.state(), AwaitingClientHello);
    }

    #[test]
    fn closed_is_terminal() {
        let mut conn = ConnectionLifecycle::new();
        conn.close();
        for next in [AwaitingClientHello, ContextResolved, RequestDispatch, Closed] {
            assert!(conn.advance(next).is_err());
        }
        conn.close();
        assert_eq!(conn.state(), Closed);
    }
}
