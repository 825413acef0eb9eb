//! Relay endpoints
//!
//! - [`RelayDialer`]: opens an encrypted tunnel to a configured relay and
//!   names the target as the first payload
//! - [`RelayServer`]: the remote side, which accepts tunnels, decodes the
//!   target address and splices to it

mod address;
mod dialer;
mod server;

pub use address::Address;
pub use dialer::RelayDialer;
pub use server::RelayServer;

use crate::transport::TransportError;
use crate::tunnel::TunnelError;
use std::io;
use thiserror::Error;

/// Relay errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    #[error("Tunnel closed before the target address arrived")]
    MissingAddress,

    #[error("No target address within {0:?}")]
    HandshakeTimeout(std::time::Duration),
}
