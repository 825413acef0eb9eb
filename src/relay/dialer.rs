//! Client side of a relay connection

use super::{Address, RelayError};
use crate::config::RelayConfig;
use crate::transport::{Dialer, TcpDialer};
use crate::tunnel::EncryptedTunnel;
use tracing::debug;

/// Opens tunnels to configured relays
#[derive(Debug, Clone, Default)]
pub struct RelayDialer<D = TcpDialer> {
    dialer: D,
}

impl<D: Dialer> RelayDialer<D> {
    pub fn new(dialer: D) -> Self {
        Self { dialer }
    }

    /// Connect to `relay`, establish the tunnel and request `host:port`.
    ///
    /// Returns once the address record has been sent; the relay's own salt
    /// is read lazily with the first response.
    pub async fn dial(
        &self,
        relay: &RelayConfig,
        host: &str,
        port: u16,
    ) -> Result<EncryptedTunnel<D::Stream>, RelayError> {
        let target = Address::domain(host, port)?;

        let stream = self.dialer.dial(&relay.host, relay.port).await?;
        let mut tunnel =
            EncryptedTunnel::establish(stream, relay.cipher, &relay.master_key()).await?;

        tunnel.write(&target.to_bytes()).await?;

        debug!(
            "Relay {} ({}:{}) tunnel open for {}",
            relay.name, relay.host, relay.port, target
        );
        Ok(tunnel)
    }
}
