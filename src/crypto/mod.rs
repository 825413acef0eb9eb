//! Cryptographic primitives for the relay wire protocol
//!
//! This module provides:
//! - Cipher suite selection (AES-128-GCM, AES-256-GCM, ChaCha20-Poly1305)
//! - AEAD encryption with a little-endian nonce counter
//! - Master key stretching and HKDF-SHA1 session subkey derivation
//! - Secure random number generation

mod aead;
mod kdf;
mod suite;

pub use aead::{decrypt_length, encrypt_length, Cipher, NonceCounter};
pub use kdf::{derive_master_key, derive_session_subkey, derive_subkey, Hkdf, SUBKEY_INFO};
pub use suite::CipherSuite;

use thiserror::Error;

/// Length of nonce in bytes (all supported suites)
pub const NONCE_LEN: usize = 12;

/// Length of authentication tag in bytes (all supported suites)
pub const TAG_LEN: usize = 16;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid salt length: expected {expected}, got {actual}")]
    InvalidSaltLength { expected: usize, actual: usize },
}

/// Generate cryptographically secure random bytes
pub fn random_bytes(buf: &mut [u8]) {
    use ring::rand::{SecureRandom, SystemRandom};
    let rng = SystemRandom::new();
    rng.fill(buf).expect("Failed to generate random bytes");
}

/// Generate a fresh salt for the given suite
pub fn generate_salt(suite: CipherSuite) -> Vec<u8> {
    let mut salt = vec![0u8; suite.salt_len()];
    random_bytes(&mut salt);
    salt
}
