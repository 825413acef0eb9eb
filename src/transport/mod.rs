//! Transport layer
//!
//! The proxy only needs "a working bidirectional byte stream for
//! host:port". [`Dialer`] is that seam; [`TcpDialer`] is the real one.

mod tcp;

pub use tcp::TcpDialer;

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::protocol::CONNECT_TIMEOUT;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection to {addr} failed: {source}")]
    ConnectionFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Connection to {0} timed out")]
    Timeout(String),
}

/// Something that can open a byte stream to `host:port`
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn dial(&self, host: &str, port: u16) -> Result<Self::Stream, TransportError>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Disable Nagle's algorithm on new sockets
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

/// Format `host:port`, bracketing IPv6 literals
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}
