//! AEAD encryption/decryption with a little-endian nonce counter
//!
//! Each direction of a tunnel owns one [`Cipher`]. The nonce starts at zero
//! and is incremented (with carry) after every successful seal or open, so a
//! nonce value is never reused under the same subkey.

use super::{CipherSuite, CryptoError, NONCE_LEN, TAG_LEN};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey};

/// Fixed-width little-endian nonce counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NonceCounter([u8; NONCE_LEN]);

impl NonceCounter {
    pub fn new() -> Self {
        Self([0u8; NONCE_LEN])
    }

    /// Current nonce value
    pub fn current(&self) -> [u8; NONCE_LEN] {
        self.0
    }

    /// Add one, carrying into higher bytes
    pub fn increment(&mut self) {
        for byte in self.0.iter_mut() {
            let (next, overflow) = byte.overflowing_add(1);
            *byte = next;
            if !overflow {
                return;
            }
        }
    }
}

/// AEAD cipher for one direction of a tunnel
pub struct Cipher {
    suite: CipherSuite,
    key: LessSafeKey,
    nonce: NonceCounter,
}

impl Cipher {
    /// Create a new cipher from a subkey of `suite.key_len()` bytes
    pub fn new(suite: CipherSuite, subkey: &[u8]) -> Result<Self, CryptoError> {
        if subkey.len() != suite.key_len() {
            return Err(CryptoError::InvalidKeyLength {
                expected: suite.key_len(),
                actual: subkey.len(),
            });
        }

        let unbound_key = UnboundKey::new(suite.algorithm(), subkey).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: suite.key_len(),
                actual: subkey.len(),
            }
        })?;

        Ok(Self {
            suite,
            key: LessSafeKey::new(unbound_key),
            nonce: NonceCounter::new(),
        })
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// Nonce that the next operation will use
    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        self.nonce.current()
    }

    /// Encrypt `plaintext`, appending ciphertext and tag to `out`
    pub fn encrypt_into(&mut self, plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), CryptoError> {
        let mut buffer = Vec::with_capacity(plaintext.len() + TAG_LEN);
        buffer.extend_from_slice(plaintext);

        let nonce = Nonce::assume_unique_for_key(self.nonce.current());
        self.key
            .seal_in_place_append_tag(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| CryptoError::Encryption)?;
        self.nonce.increment();

        out.extend_from_slice(&buffer);
        Ok(())
    }

    /// Encrypt data, returning ciphertext with appended tag
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut out = Vec::with_capacity(plaintext.len() + TAG_LEN);
        self.encrypt_into(plaintext, &mut out)?;
        Ok(out)
    }

    /// Decrypt `ciphertext || tag` in place, returning the plaintext length
    ///
    /// On tag mismatch the nonce is left untouched and the buffer contents
    /// are unspecified.
    pub fn decrypt_in_place(&mut self, buffer: &mut [u8]) -> Result<usize, CryptoError> {
        let nonce = Nonce::assume_unique_for_key(self.nonce.current());
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), buffer)
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let len = plaintext.len();
        self.nonce.increment();
        Ok(len)
    }

    /// Decrypt data, verifying the auth tag
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut buffer = ciphertext.to_vec();
        let len = self.decrypt_in_place(&mut buffer)?;
        buffer.truncate(len);
        Ok(buffer)
    }
}

/// Encrypt a 2-byte big-endian length prefix as its own AEAD frame
pub fn encrypt_length(cipher: &mut Cipher, length: u16) -> Result<[u8; 2 + TAG_LEN], CryptoError> {
    let ciphertext = cipher.encrypt(&length.to_be_bytes())?;

    let mut result = [0u8; 2 + TAG_LEN];
    result.copy_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt a length prefix frame
pub fn decrypt_length(cipher: &mut Cipher, ciphertext: &[u8; 2 + TAG_LEN]) -> Result<u16, CryptoError> {
    let mut buffer = *ciphertext;
    let len = cipher.decrypt_in_place(&mut buffer)?;
    if len != 2 {
        return Err(CryptoError::AuthenticationFailed);
    }
    Ok(u16::from_be_bytes([buffer[0], buffer[1]]))
}
