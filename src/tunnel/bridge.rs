//! Splicing an encrypted tunnel to a plaintext stream

use super::{EncryptedTunnel, TunnelError, TunnelReader, TunnelWriter};
use crate::protocol::RELAY_BUFFER_SIZE;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Byte counts moved by a finished splice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpliceStats {
    /// Plaintext bytes sent into the tunnel
    pub sent: u64,
    /// Plaintext bytes received from the tunnel
    pub received: u64,
}

/// Pump bytes between `plain` and `tunnel` until either side closes or fails.
///
/// Each direction awaits its write before reading more, so a slow side
/// throttles the other. When one direction ends both streams are dropped.
pub async fn splice<S, P>(tunnel: EncryptedTunnel<S>, plain: P) -> Result<SpliceStats, TunnelError>
where
    S: AsyncRead + AsyncWrite,
    P: AsyncRead + AsyncWrite,
{
    let (tunnel_rx, tunnel_tx) = tunnel.into_split();
    let (plain_rx, plain_tx) = tokio::io::split(plain);

    // Counted as bytes move so the losing pump's progress is kept too
    let sent = AtomicU64::new(0);
    let received = AtomicU64::new(0);

    let result = tokio::select! {
        r = plain_to_tunnel(plain_rx, tunnel_tx, &sent) => r,
        r = tunnel_to_plain(tunnel_rx, plain_tx, &received) => r,
    };

    let stats = SpliceStats {
        sent: sent.load(Ordering::Relaxed),
        received: received.load(Ordering::Relaxed),
    };
    debug!("Splice finished: {:?}", stats);
    result.map(|_| stats)
}

async fn plain_to_tunnel<R, W>(
    mut reader: R,
    mut writer: TunnelWriter<W>,
    total: &AtomicU64,
) -> Result<(), TunnelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write(&buf[..n]).await?;
        total.fetch_add(n as u64, Ordering::Relaxed);
    }

    writer.shutdown().await.ok();
    Ok(())
}

async fn tunnel_to_plain<R, W>(
    mut reader: TunnelReader<R>,
    mut writer: W,
    total: &AtomicU64,
) -> Result<(), TunnelError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = reader.read().await? {
        writer.write_all(&chunk).await?;
        total.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }

    writer.shutdown().await.ok();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_master_key, CipherSuite};
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_splice_counts_both_directions() {
        let suite = CipherSuite::Aes128Gcm;
        let master = derive_master_key(b"splice", suite.key_len());
        let (tunnel_side, peer_side) = duplex(4096);
        let (plain_side, mut app) = duplex(4096);

        let master_peer = master.clone();
        let peer = tokio::spawn(async move {
            let mut peer = EncryptedTunnel::establish(peer_side, suite, &master_peer)
                .await
                .unwrap();
            let up = peer.read().await.unwrap().unwrap();
            assert_eq!(&up[..], b"hi");
            peer.write(b"fifteen bytes!!").await.unwrap();
            peer.shutdown().await.unwrap();
        });

        let tunnel = EncryptedTunnel::establish(tunnel_side, suite, &master)
            .await
            .unwrap();
        let splicer = tokio::spawn(splice(tunnel, plain_side));

        app.write_all(b"hi").await.unwrap();
        let mut down = [0u8; 15];
        app.read_exact(&mut down).await.unwrap();
        assert_eq!(&down, b"fifteen bytes!!");

        peer.await.unwrap();
        let stats = splicer.await.unwrap().unwrap();
        assert_eq!(stats, SpliceStats { sent: 2, received: 15 });
    }

    #[tokio::test]
    async fn test_tunnel_close_ends_splice() {
        let suite = CipherSuite::ChaCha20Poly1305;
        let master = derive_master_key(b"close", suite.key_len());
        let (tunnel_side, peer_side) = duplex(4096);
        let (plain_side, mut app) = duplex(4096);

        let master_peer = master.clone();
        let peer = tokio::spawn(async move {
            let mut peer = EncryptedTunnel::establish(peer_side, suite, &master_peer)
                .await
                .unwrap();
            peer.shutdown().await.unwrap();
            peer
        });

        let tunnel = EncryptedTunnel::establish(tunnel_side, suite, &master)
            .await
            .unwrap();
        let splicer = tokio::spawn(splice(tunnel, plain_side));

        // The plain side sees EOF once the tunnel peer closes
        let mut buf = Vec::new();
        app.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());

        splicer.await.unwrap().unwrap();
        drop(peer.await.unwrap());
    }
}
