//! Remote relay: accepts tunnels and forwards them to their targets

use super::{Address, RelayError};
use crate::crypto::{derive_master_key, CipherSuite};
use crate::protocol::CONNECT_TIMEOUT;
use crate::transport::{Dialer, TcpDialer};
use crate::tunnel::{splice, EncryptedTunnel};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Upper bound on concurrently served tunnels
const MAX_CONNECTIONS: usize = 1024;

struct ServerState {
    suite: CipherSuite,
    master_key: Vec<u8>,
    handshake_timeout: Duration,
    dialer: TcpDialer,
    conn_semaphore: Semaphore,
}

/// Shadowsocks-compatible relay server
pub struct RelayServer {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl RelayServer {
    /// Bind to `addr`, accepting tunnels keyed by `password`
    pub async fn bind(addr: &str, suite: CipherSuite, password: &str) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr).await?;
        let state = Arc::new(ServerState {
            suite,
            master_key: derive_master_key(password.as_bytes(), suite.key_len()),
            handshake_timeout: CONNECT_TIMEOUT,
            dialer: TcpDialer::default(),
            conn_semaphore: Semaphore::new(MAX_CONNECTIONS),
        });

        Ok(Self { listener, state })
    }

    /// Limit how long a client may take to send its salt and target address
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        if let Some(state) = Arc::get_mut(&mut self.state) {
            state.handshake_timeout = timeout;
        }
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept tunnels until the task is dropped
    pub async fn run(self) -> Result<(), RelayError> {
        info!(
            "Relay listening on {} ({})",
            self.local_addr()?,
            self.state.suite
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer_addr)) => {
                    debug!("New tunnel from {}", peer_addr);
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, state).await {
                            match e {
                                RelayError::Tunnel(ref t) if t.is_protocol() => {
                                    warn!("Tunnel from {} rejected: {}", peer_addr, e)
                                }
                                _ => debug!("Tunnel from {} ended: {}", peer_addr, e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<ServerState>) -> Result<(), RelayError> {
    let _permit = state
        .conn_semaphore
        .acquire()
        .await
        .map_err(|e| RelayError::Io(std::io::Error::other(e)))?;

    stream.set_nodelay(true).ok();

    let mut tunnel = EncryptedTunnel::establish(stream, state.suite, &state.master_key).await?;

    let (target, head, consumed) =
        tokio::time::timeout(state.handshake_timeout, read_target(&mut tunnel))
            .await
            .map_err(|_| RelayError::HandshakeTimeout(state.handshake_timeout))??;

    debug!("Tunnel requests {}", target);
    let mut upstream = state.dialer.dial(&target.host(), target.port()).await?;

    let leftover = &head[consumed..];
    if !leftover.is_empty() {
        upstream.write_all(leftover).await?;
    }

    let stats = splice(tunnel, upstream).await?;
    debug!(
        "Tunnel to {} closed ({} bytes up, {} bytes down)",
        target,
        stats.sent,
        stats.received
    );
    Ok(())
}

/// Read payloads until the address record is complete.
///
/// The record may arrive split across payloads, or share one with the
/// first bytes of client data. Returns the target, the bytes read and how
/// many of them the record used.
async fn read_target<S>(
    tunnel: &mut EncryptedTunnel<S>,
) -> Result<(Address, Vec<u8>, usize), RelayError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut head = Vec::new();
    loop {
        let chunk = tunnel.read().await?.ok_or(RelayError::MissingAddress)?;
        head.extend_from_slice(&chunk);
        if let Some((target, consumed)) = Address::decode(&head)? {
            return Ok((target, head, consumed));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::relay::RelayDialer;
    use tokio::io::AsyncReadExt;

    async fn echo_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => break,
                            Ok(n) => {
                                if socket.write_all(&buf[..n]).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });
        port
    }

    #[tokio::test]
    async fn test_relay_round_trip() {
        let echo_port = echo_server().await;

        let server = RelayServer::bind("127.0.0.1:0", CipherSuite::ChaCha20Poly1305, "relay-pw")
            .await
            .unwrap();
        let relay_port = server.local_addr().unwrap().port();
        tokio::spawn(server.run());

        let relay = RelayConfig::new(
            "local",
            "127.0.0.1",
            relay_port,
            CipherSuite::ChaCha20Poly1305,
            "relay-pw",
        );
        let mut tunnel = RelayDialer::<TcpDialer>::default()
            .dial(&relay, "127.0.0.1", echo_port)
            .await
            .unwrap();

        let payload: Vec<u8> = (0..30000u32).map(|i| (i % 251) as u8).collect();
        tunnel.write(&payload).await.unwrap();

        let mut echoed = Vec::new();
        while echoed.len() < payload.len() {
            let chunk = tunnel.read().await.unwrap().unwrap();
            echoed.extend_from_slice(&chunk);
        }
        assert_eq!(echoed, payload);
    }

    #[tokio::test]
    async fn test_silent_client_is_dropped() {
        let server = RelayServer::bind("127.0.0.1:0", CipherSuite::Aes128Gcm, "pw")
            .await
            .unwrap()
            .with_handshake_timeout(Duration::from_millis(200));
        let relay_port = server.local_addr().unwrap().port();
        tokio::spawn(server.run());

        let mut client = TcpStream::connect(("127.0.0.1", relay_port)).await.unwrap();

        // Only the relay's salt arrives, then the connection closes
        let mut received = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut received))
            .await
            .expect("relay kept a silent client open")
            .unwrap();
        assert_eq!(received.len(), CipherSuite::Aes128Gcm.salt_len());
    }

    #[tokio::test]
    async fn test_wrong_password_gets_nothing_back() {
        let echo_port = echo_server().await;

        let server = RelayServer::bind("127.0.0.1:0", CipherSuite::Aes256Gcm, "right")
            .await
            .unwrap();
        let relay_port = server.local_addr().unwrap().port();
        tokio::spawn(server.run());

        let relay = RelayConfig::new("bad", "127.0.0.1", relay_port, CipherSuite::Aes256Gcm, "wrong");
        let mut tunnel = RelayDialer::<TcpDialer>::default()
            .dial(&relay, "127.0.0.1", echo_port)
            .await
            .unwrap();
        tunnel.write(b"hello").await.ok();

        // The server drops the connection on the first failed tag
        let result = tunnel.read().await;
        assert!(!matches!(result, Ok(Some(_))));
    }
}
