//! # Shadowroute
//!
//! A local HTTP CONNECT proxy that sends selected hostnames through a
//! Shadowsocks-compatible AEAD relay and everything else directly.
//!
//! ## Features
//!
//! - **AEAD tunnel** with AES-128-GCM, AES-256-GCM or ChaCha20-Poly1305
//! - **Per-session subkeys** derived from a random salt (HKDF-SHA1)
//! - **Per-hostname routing** with wildcard rules and exact overrides
//! - **Relay server** for the remote side
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Proxy Layer                       │
//! │       (CONNECT parsing, sessions, bridging)          │
//! ├─────────────────────────────────────────────────────┤
//! │                   Routing Layer                      │
//! │        (pattern rules, overrides, default relay)     │
//! ├─────────────────────────────────────────────────────┤
//! │                    Relay Layer                       │
//! │         (address record, dialer, relay server)       │
//! ├─────────────────────────────────────────────────────┤
//! │                   Tunnel Layer                       │
//! │     (salt handshake, AEAD framing, nonce counters)   │
//! ├─────────────────────────────────────────────────────┤
//! │                  Transport Layer                     │
//! │                 (TCP with timeouts)                  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod crypto;
pub mod protocol;
pub mod proxy;
pub mod relay;
pub mod routing;
pub mod transport;
pub mod tunnel;

pub use config::{parse_relay_url, Config, RelayConfig};
pub use crypto::CipherSuite;
pub use proxy::ProxyHandle;
pub use relay::RelayServer;
pub use routing::{HostRule, Route, RoutingTable};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] tunnel::TunnelError),

    #[error("Relay error: {0}")]
    Relay(#[from] relay::RelayError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] proxy::ProxyError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
