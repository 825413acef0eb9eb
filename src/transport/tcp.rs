//! TCP dialer with a bounded connect timeout

use super::{host_port, Dialer, TransportConfig, TransportError};
use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

/// Raw TCP dialer
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    config: TransportConfig,
}

impl TcpDialer {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, host: &str, port: u16) -> Result<TcpStream, TransportError> {
        let addr = host_port(host, port);

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| TransportError::Timeout(addr.clone()))?
            .map_err(|source| TransportError::ConnectionFailed {
                addr: addr.clone(),
                source,
            })?;

        if self.config.nodelay {
            stream.set_nodelay(true).ok();
        }

        debug!("Connected to {}", addr);
        Ok(stream)
    }
}
