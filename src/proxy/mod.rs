//! Local HTTP CONNECT proxy
//!
//! Provides:
//! - CONNECT request head parsing
//! - [`ProxyHandle`]: listener lifecycle and the routing control surface
//! - Direct and relayed bridging per session

mod http;
mod server;
mod session;

pub use http::{
    parse_connect_target, read_request_head, RequestHead, BAD_GATEWAY, BAD_REQUEST,
    CONNECTION_ESTABLISHED, NOT_IMPLEMENTED,
};
pub use server::ProxyHandle;
pub use session::{SessionState, TunnelSession};

use crate::relay::RelayError;
use crate::transport::TransportError;
use crate::tunnel::TunnelError;
use thiserror::Error;

/// Proxy errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}

impl ProxyError {
    /// Tag failures and malformed frames, as opposed to ordinary closes
    pub fn is_protocol(&self) -> bool {
        match self {
            ProxyError::Tunnel(e) | ProxyError::Relay(RelayError::Tunnel(e)) => e.is_protocol(),
            _ => false,
        }
    }
}
