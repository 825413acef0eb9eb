//! AEAD cipher suites understood by the relay

use super::{NONCE_LEN, TAG_LEN};
use ring::aead::{self, AES_128_GCM, AES_256_GCM, CHACHA20_POLY1305};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Supported AEAD cipher suites
///
/// Every suite uses a 12-byte nonce and a 16-byte tag. The salt is always
/// as long as the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CipherSuite {
    /// aes-128-gcm (fallback for unrecognised names)
    #[default]
    Aes128Gcm,
    /// aes-256-gcm
    Aes256Gcm,
    /// chacha20-ietf-poly1305
    ChaCha20Poly1305,
}

impl CipherSuite {
    /// Resolve a suite by its wire name.
    ///
    /// Unknown names fall back to AES-128-GCM with a warning instead of
    /// failing, so a typo in a relay URL still yields a usable config.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "aes-128-gcm" | "aead_aes_128_gcm" => CipherSuite::Aes128Gcm,
            "aes-256-gcm" | "aead_aes_256_gcm" => CipherSuite::Aes256Gcm,
            "chacha20-ietf-poly1305" | "chacha20-poly1305" | "aead_chacha20_poly1305" => {
                CipherSuite::ChaCha20Poly1305
            }
            other => {
                warn!("Unknown cipher '{}', falling back to aes-128-gcm", other);
                CipherSuite::Aes128Gcm
            }
        }
    }

    /// Canonical wire name
    pub fn name(&self) -> &'static str {
        match self {
            CipherSuite::Aes128Gcm => "aes-128-gcm",
            CipherSuite::Aes256Gcm => "aes-256-gcm",
            CipherSuite::ChaCha20Poly1305 => "chacha20-ietf-poly1305",
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            CipherSuite::Aes128Gcm => 16,
            CipherSuite::Aes256Gcm | CipherSuite::ChaCha20Poly1305 => 32,
        }
    }

    pub fn salt_len(&self) -> usize {
        self.key_len()
    }

    pub fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    pub fn tag_len(&self) -> usize {
        TAG_LEN
    }

    /// All supported suites
    pub fn all() -> [CipherSuite; 3] {
        [
            CipherSuite::Aes128Gcm,
            CipherSuite::Aes256Gcm,
            CipherSuite::ChaCha20Poly1305,
        ]
    }

    pub(crate) fn algorithm(&self) -> &'static aead::Algorithm {
        match self {
            CipherSuite::Aes128Gcm => &AES_128_GCM,
            CipherSuite::Aes256Gcm => &AES_256_GCM,
            CipherSuite::ChaCha20Poly1305 => &CHACHA20_POLY1305,
        }
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for CipherSuite {
    fn from(name: String) -> Self {
        CipherSuite::from_name(&name)
    }
}

impl From<CipherSuite> for String {
    fn from(suite: CipherSuite) -> Self {
        suite.name().to_string()
    }
}
