//! CONNECT listener and its control handle

use super::http::{
    parse_connect_target, read_request_head, BAD_GATEWAY, BAD_REQUEST, CONNECTION_ESTABLISHED,
    NOT_IMPLEMENTED,
};
use super::{ProxyError, SessionState, TunnelSession};
use crate::config::RelayConfig;
use crate::relay::RelayDialer;
use crate::routing::{HostRule, Route, RoutingTable};
use crate::transport::{host_port, Dialer, TcpDialer};
use crate::tunnel::splice;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// A running CONNECT proxy
///
/// Dropping the handle stops the listener and aborts open sessions.
pub struct ProxyHandle {
    local_addr: SocketAddr,
    routing: Arc<RoutingTable>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ProxyHandle {
    /// Listen on an ephemeral loopback port with an empty routing table
    pub async fn start(default_relay: Option<RelayConfig>) -> Result<Self, ProxyError> {
        Self::bind("127.0.0.1:0", Arc::new(RoutingTable::new(default_relay))).await
    }

    /// Listen on `addr`, routing through `routing`
    pub async fn bind(addr: &str, routing: Arc<RoutingTable>) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("CONNECT proxy listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&routing),
            TcpDialer::default(),
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            routing,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared routing table; changes apply to the next CONNECT
    pub fn routing(&self) -> &Arc<RoutingTable> {
        &self.routing
    }

    pub fn add_host_rule(&self, hostname: &str, relay: RelayConfig) {
        self.routing.add_host_rule(hostname, relay);
    }

    pub fn remove_host_rule(&self, hostname: &str) -> bool {
        self.routing.remove_host_rule(hostname)
    }

    pub fn clear_host_rules(&self) {
        self.routing.clear_host_rules();
    }

    pub fn get_rules(&self) -> Vec<HostRule> {
        self.routing.rules()
    }

    /// Replace the pattern rule list
    pub fn save_rules(&self, rules: Vec<HostRule>) {
        self.routing.set_rules(rules);
    }

    pub fn set_default_relay(&self, relay: Option<RelayConfig>) {
        self.routing.set_default_relay(relay);
    }

    pub fn resolve(&self, hostname: &str) -> Route {
        self.routing.resolve(hostname)
    }

    /// Close the listener, abort open sessions and clear routing state
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Proxy listener task failed: {}", e);
                }
            }
        }
        self.routing.clear();
        info!("CONNECT proxy on {} stopped", self.local_addr);
    }
}

impl Drop for ProxyHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    routing: Arc<RoutingTable>,
    dialer: TcpDialer,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut sessions = JoinSet::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    next_id += 1;
                    let session = TunnelSession::new(next_id, peer_addr);
                    let routing = Arc::clone(&routing);
                    let dialer = dialer.clone();
                    sessions.spawn(async move {
                        let id = session.id();
                        if let Err(e) = handle_connection(stream, session, routing, dialer).await {
                            if e.is_protocol() {
                                warn!("Session {} failed: {}", id, e);
                            } else {
                                debug!("Session {} ended: {}", id, e);
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }

    debug!("Aborting {} open session(s)", sessions.len());
    sessions.shutdown().await;
}

async fn handle_connection(
    stream: TcpStream,
    mut session: TunnelSession,
    routing: Arc<RoutingTable>,
    dialer: TcpDialer,
) -> Result<(), ProxyError> {
    stream.set_nodelay(true).ok();
    let mut reader = BufReader::new(stream);

    let head = match read_request_head(&mut reader).await {
        Ok(head) => head,
        Err(e) => {
            reader.get_mut().write_all(BAD_REQUEST).await.ok();
            return Err(e);
        }
    };

    if !head.is_connect() {
        reader.get_mut().write_all(NOT_IMPLEMENTED).await?;
        return Err(ProxyError::UnsupportedMethod(head.method));
    }

    let (host, port) = match parse_connect_target(&head.target) {
        Ok(target) => target,
        Err(e) => {
            reader.get_mut().write_all(BAD_REQUEST).await?;
            return Err(e);
        }
    };

    // Bytes the client pipelined after the head belong to the tunnel
    let early = reader.buffer().to_vec();
    let mut client = reader.into_inner();

    session.set_target(host_port(&host, port));
    session.advance(SessionState::Resolving);

    match routing.resolve(&host) {
        Route::Direct => {
            session.advance(SessionState::Direct);
            debug!("Session {}: {}:{} direct", session.id(), host, port);

            let mut upstream = match dialer.dial(&host, port).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    client.write_all(BAD_GATEWAY).await.ok();
                    return Err(e.into());
                }
            };

            client.write_all(CONNECTION_ESTABLISHED).await?;
            if !early.is_empty() {
                upstream.write_all(&early).await?;
            }

            session.advance(SessionState::Bridging);
            let (up, down) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
            debug!("Session {}: {} bytes up, {} bytes down", session.id(), up, down);
        }
        Route::Relay(relay) => {
            session.advance(SessionState::Relayed);
            debug!(
                "Session {}: {}:{} via relay {}",
                session.id(),
                host,
                port,
                relay.name
            );

            let mut tunnel = match RelayDialer::new(dialer).dial(&relay, &host, port).await {
                Ok(tunnel) => tunnel,
                Err(e) => {
                    client.write_all(BAD_GATEWAY).await.ok();
                    return Err(e.into());
                }
            };

            client.write_all(CONNECTION_ESTABLISHED).await?;
            if !early.is_empty() {
                tunnel.write(&early).await?;
            }

            session.advance(SessionState::Bridging);
            let stats = splice(tunnel, client).await?;
            debug!(
                "Session {}: {} bytes up, {} bytes down",
                session.id(),
                stats.sent,
                stats.received
            );
        }
    }

    session.advance(SessionState::Closed);
    Ok(())
}
