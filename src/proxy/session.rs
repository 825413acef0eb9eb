//! Per-CONNECT session bookkeeping

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, trace};

/// Lifecycle of one accepted CONNECT
///
/// `Accepted -> Resolving -> {Direct | Relayed} -> Bridging -> Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    Resolving,
    Direct,
    Relayed,
    Bridging,
    Closed,
}

impl SessionState {
    fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Accepted, Resolving)
                | (Resolving, Direct)
                | (Resolving, Relayed)
                | (Direct, Bridging)
                | (Relayed, Bridging)
                | (_, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Accepted => "accepted",
            SessionState::Resolving => "resolving",
            SessionState::Direct => "direct",
            SessionState::Relayed => "relayed",
            SessionState::Bridging => "bridging",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One client socket bound to one upstream for the life of a CONNECT
#[derive(Debug)]
pub struct TunnelSession {
    id: u64,
    peer: SocketAddr,
    target: Option<String>,
    state: SessionState,
    opened: Instant,
}

impl TunnelSession {
    pub fn new(id: u64, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            target: None,
            state: SessionState::Accepted,
            opened: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn set_target(&mut self, target: String) {
        self.target = Some(target);
    }

    /// Move to `next`; out-of-order transitions are ignored
    pub fn advance(&mut self, next: SessionState) -> bool {
        if self.state == next || !self.state.can_advance_to(next) {
            return false;
        }

        trace!("Session {} {} -> {}", self.id, self.state, next);
        self.state = next;
        if next == SessionState::Closed {
            debug!(
                "Session {} from {} to {} closed after {:?}",
                self.id,
                self.peer,
                self.target.as_deref().unwrap_or("-"),
                self.opened.elapsed()
            );
        }
        true
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.advance(SessionState::Closed);
    }
}
