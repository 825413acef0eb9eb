//! Encrypted tunnel over an async byte stream

use super::{FrameDecoder, FrameEncoder, TunnelError};
use crate::crypto::{generate_salt, CipherSuite};
use crate::protocol::RELAY_BUFFER_SIZE;
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tracing::{debug, trace};

/// Receiving half of a tunnel
pub struct TunnelReader<R> {
    reader: R,
    decoder: FrameDecoder,
    pending: VecDeque<Bytes>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> TunnelReader<R> {
    pub fn new(reader: R, suite: CipherSuite, master_key: &[u8]) -> Self {
        Self {
            reader,
            decoder: FrameDecoder::new(suite, master_key),
            pending: VecDeque::new(),
            buf: vec![0u8; RELAY_BUFFER_SIZE],
        }
    }

    /// Receive the next decrypted payload.
    ///
    /// Returns `Ok(None)` when the peer closed on a frame boundary.
    pub async fn read(&mut self) -> Result<Option<Bytes>, TunnelError> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Ok(Some(chunk));
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                self.decoder.finish()?;
                debug!("Tunnel peer closed");
                return Ok(None);
            }

            trace!("Tunnel read {} raw bytes", n);
            self.pending.extend(self.decoder.feed(&self.buf[..n])?);
        }
    }
}

/// Sending half of a tunnel
pub struct TunnelWriter<W> {
    writer: W,
    encoder: FrameEncoder,
    out: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> TunnelWriter<W> {
    /// Generate a fresh salt, derive the send subkey, and put the salt on
    /// the wire. The salt is the whole handshake.
    pub async fn handshake(
        mut writer: W,
        suite: CipherSuite,
        master_key: &[u8],
    ) -> Result<Self, TunnelError> {
        let salt = generate_salt(suite);
        let encoder = FrameEncoder::from_salt(suite, master_key, &salt)?;

        writer.write_all(&salt).await?;
        writer.flush().await?;

        Ok(Self {
            writer,
            encoder,
            out: Vec::with_capacity(RELAY_BUFFER_SIZE),
        })
    }

    /// Encrypt and send `data`
    pub async fn write(&mut self, data: &[u8]) -> Result<(), TunnelError> {
        if data.is_empty() {
            return Ok(());
        }

        self.out.clear();
        self.encoder.encode(data, &mut self.out)?;
        self.writer.write_all(&self.out).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), TunnelError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// Bidirectional encrypted tunnel over a raw stream
///
/// Callers see plaintext in both directions; salts, subkeys, nonces and
/// framing stay inside.
pub struct EncryptedTunnel<S> {
    reader: TunnelReader<ReadHalf<S>>,
    writer: TunnelWriter<WriteHalf<S>>,
}

impl<S: AsyncRead + AsyncWrite> EncryptedTunnel<S> {
    /// Establish a tunnel over `stream`, eagerly sending our salt.
    ///
    /// The receive subkey is derived once the peer's salt arrives.
    pub async fn establish(
        stream: S,
        suite: CipherSuite,
        master_key: &[u8],
    ) -> Result<Self, TunnelError> {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer = TunnelWriter::handshake(write_half, suite, master_key).await?;
        let reader = TunnelReader::new(read_half, suite, master_key);
        Ok(Self { reader, writer })
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<(), TunnelError> {
        self.writer.write(data).await
    }

    pub async fn read(&mut self) -> Result<Option<Bytes>, TunnelError> {
        self.reader.read().await
    }

    pub async fn shutdown(&mut self) -> Result<(), TunnelError> {
        self.writer.shutdown().await
    }

    /// Split into independently usable halves
    pub fn into_split(self) -> (TunnelReader<ReadHalf<S>>, TunnelWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}
