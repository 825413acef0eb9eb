//! Tunnel layer - encrypted byte stream over a raw connection
//!
//! Provides:
//! - AEAD chunk framing (`[len][tag][payload][tag]`)
//! - An incremental decoder tolerant of arbitrary read boundaries
//! - The [`EncryptedTunnel`] stream wrapper and its split halves
//! - Splicing a tunnel to a plaintext socket

mod bridge;
mod frame;
mod stream;

pub use bridge::{splice, SpliceStats};
pub use frame::{encoded_len, frame_pairs, DecodeState, FrameDecoder, FrameEncoder};
pub use stream::{EncryptedTunnel, TunnelReader, TunnelWriter};

use thiserror::Error;

/// Tunnel layer errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Authentication failed (tag mismatch)")]
    AuthenticationFailed,

    #[error("Short salt: expected {expected} bytes, got {actual}")]
    ShortSalt { expected: usize, actual: usize },

    #[error("Connection closed mid-frame")]
    UnexpectedEof,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::CryptoError),
}

impl TunnelError {
    /// True for errors that indicate a corrupt or forged stream rather than
    /// an ordinary disconnect.
    pub fn is_protocol(&self) -> bool {
        !matches!(self, TunnelError::Io(_))
    }
}
