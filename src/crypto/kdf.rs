//! Key Derivation Functions
//!
//! Two steps turn a relay password into a per-connection key:
//!
//! 1. [`derive_master_key`] stretches the password with the legacy
//!    `EVP_BytesToKey` construction (iterated MD5). This is weak by modern
//!    standards and kept only because deployed relays expect it; the real
//!    secrecy comes from the per-session salt and the AEAD.
//! 2. [`derive_session_subkey`] runs HKDF-SHA1 over the master key with a
//!    random salt and the `ss-subkey` info string.

use super::{CipherSuite, CryptoError};
use md5::{Digest, Md5};
use ring::hkdf::{self, Salt, HKDF_SHA1_FOR_LEGACY_USE_ONLY};

/// HKDF info string used for every session subkey
pub const SUBKEY_INFO: &[u8] = b"ss-subkey";

/// Stretch a password into a master key of `key_len` bytes.
///
/// `D_i = MD5(D_{i-1} || password)`, concatenated until long enough.
pub fn derive_master_key(password: &[u8], key_len: usize) -> Vec<u8> {
    let mut key = Vec::with_capacity(key_len + 16);
    let mut prev: Vec<u8> = Vec::new();

    while key.len() < key_len {
        let mut hasher = Md5::new();
        hasher.update(&prev);
        hasher.update(password);
        prev = hasher.finalize().to_vec();
        key.extend_from_slice(&prev);
    }

    key.truncate(key_len);
    key
}

/// HKDF-SHA1 (RFC 5869)
pub struct Hkdf {
    prk: hkdf::Prk,
}

impl Hkdf {
    /// Extract a pseudorandom key from `ikm` under `salt`
    pub fn new(salt: &[u8], ikm: &[u8]) -> Self {
        let prk = Salt::new(HKDF_SHA1_FOR_LEGACY_USE_ONLY, salt).extract(ikm);
        Self { prk }
    }

    /// Fill `output` with key material bound to `info`
    pub fn expand(&self, info: &[u8], output: &mut [u8]) -> Result<(), CryptoError> {
        let info_refs = [info];
        let okm = self
            .prk
            .expand(&info_refs, HkdfLen(output.len()))
            .map_err(|_| {
                CryptoError::KeyDerivation(format!("HKDF output too long: {}", output.len()))
            })?;

        okm.fill(output)
            .map_err(|_| CryptoError::KeyDerivation("HKDF fill failed".to_string()))
    }
}

/// Output length for HKDF expand
struct HkdfLen(usize);

impl hkdf::KeyType for HkdfLen {
    fn len(&self) -> usize {
        self.0
    }
}

/// Derive `out_len` bytes of session subkey from a master key and salt
pub fn derive_session_subkey(
    master_key: &[u8],
    salt: &[u8],
    info: &[u8],
    out_len: usize,
) -> Result<Vec<u8>, CryptoError> {
    let mut subkey = vec![0u8; out_len];
    Hkdf::new(salt, master_key).expand(info, &mut subkey)?;
    Ok(subkey)
}

/// Derive the subkey for one tunnel direction
pub fn derive_subkey(
    suite: CipherSuite,
    master_key: &[u8],
    salt: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if salt.len() != suite.salt_len() {
        return Err(CryptoError::InvalidSaltLength {
            expected: suite.salt_len(),
            actual: salt.len(),
        });
    }
    if master_key.len() != suite.key_len() {
        return Err(CryptoError::InvalidKeyLength {
            expected: suite.key_len(),
            actual: master_key.len(),
        });
    }
    derive_session_subkey(master_key, salt, SUBKEY_INFO, suite.key_len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_known_value() {
        // MD5("foobar")
        let key = derive_master_key(b"foobar", 16);
        let expected = [
            0x38, 0x58, 0xf6, 0x22, 0x30, 0xac, 0x3c, 0x91, 0x5f, 0x30, 0x0c, 0x66, 0x43, 0x12,
            0xc6, 0x3f,
        ];
        assert_eq!(key, expected);
    }

    #[test]
    fn test_master_key_chains_digests() {
        let key = derive_master_key(b"password", 32);
        let first = Md5::digest(b"password");
        let mut second = Md5::new();
        second.update(first);
        second.update(b"password");
        let second = second.finalize();

        assert_eq!(&key[..16], first.as_slice());
        assert_eq!(&key[16..], second.as_slice());
    }

    #[test]
    fn test_master_key_deterministic_and_truncated() {
        assert_eq!(derive_master_key(b"pw", 24), derive_master_key(b"pw", 24));
        assert_eq!(derive_master_key(b"pw", 24).len(), 24);
        assert_eq!(&derive_master_key(b"pw", 32)[..24], &derive_master_key(b"pw", 24)[..]);
    }

    #[test]
    fn test_hkdf_sha1_known_answer() {
        // RFC 5869, A.4
        let ikm = [0x0bu8; 11];
        let salt: Vec<u8> = (0u8..=0x0c).collect();
        let info: Vec<u8> = (0xf0u8..=0xf9).collect();
        let expected = [
            0x08, 0x5a, 0x01, 0xea, 0x1b, 0x10, 0xf3, 0x69, 0x33, 0x06, 0x8b, 0x56, 0xef, 0xa5,
            0xad, 0x81, 0xa4, 0xf1, 0x4b, 0x82, 0x2f, 0x5b, 0x09, 0x15, 0x68, 0xa9, 0xcd, 0xd4,
            0xf1, 0x55, 0xfd, 0xa2, 0xc2, 0x2e, 0x42, 0x24, 0x78, 0xd3, 0x05, 0xf3, 0xf8, 0x96,
        ];

        let okm = derive_session_subkey(&ikm, &salt, &info, 42).unwrap();
        assert_eq!(okm, expected);

        // Shorter outputs are prefixes of the same stream
        let short = derive_session_subkey(&ikm, &salt, &info, 16).unwrap();
        assert_eq!(&short[..], &expected[..16]);
    }

    #[test]
    fn test_subkey_depends_on_salt() {
        let suite = CipherSuite::Aes256Gcm;
        let master = derive_master_key(b"secret", suite.key_len());
        let a = derive_subkey(suite, &master, &[1u8; 32]).unwrap();
        let b = derive_subkey(suite, &master, &[2u8; 32]).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_subkey_rejects_short_salt() {
        let suite = CipherSuite::Aes128Gcm;
        let master = derive_master_key(b"secret", suite.key_len());
        assert!(matches!(
            derive_subkey(suite, &master, &[0u8; 8]),
            Err(CryptoError::InvalidSaltLength { expected: 16, actual: 8 })
        ));
    }

    #[test]
    fn test_expand_rejects_oversized_output() {
        let hkdf = Hkdf::new(b"salt", b"ikm");
        let mut out = vec![0u8; 255 * 20 + 1];
        assert!(hkdf.expand(b"", &mut out).is_err());
    }
}
