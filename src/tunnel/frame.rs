//! AEAD chunk encoding/decoding
//!
//! Wire format for one direction:
//! ```text
//! +----------------+
//! |   Salt (N B)   |   once, unframed
//! +----------------+--------------+
//! | Length (2B BE) |  Tag (16B)   |   one AEAD frame
//! +----------------+--------------+
//! | Payload (<= 0x3FFF B) | Tag   |   one AEAD frame
//! +-----------------------+-------+
//! |            ...                |
//! ```
//!
//! Each AEAD frame consumes one nonce increment.

use super::TunnelError;
use crate::crypto::{decrypt_length, derive_subkey, encrypt_length, Cipher, CipherSuite, TAG_LEN};
use crate::protocol::{LENGTH_FIELD_SIZE, MAX_PAYLOAD_SIZE};
use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Number of (length, payload) frame pairs needed for `payload_len` bytes
pub fn frame_pairs(payload_len: usize) -> usize {
    (payload_len + MAX_PAYLOAD_SIZE - 1) / MAX_PAYLOAD_SIZE
}

/// Encoded size of `payload_len` bytes, excluding the salt
pub fn encoded_len(payload_len: usize) -> usize {
    payload_len + frame_pairs(payload_len) * (LENGTH_FIELD_SIZE + 2 * TAG_LEN)
}

/// Encoder for the sending direction
pub struct FrameEncoder {
    cipher: Cipher,
}

impl FrameEncoder {
    pub fn new(cipher: Cipher) -> Self {
        Self { cipher }
    }

    /// Build an encoder whose subkey is derived from `salt`
    pub fn from_salt(
        suite: CipherSuite,
        master_key: &[u8],
        salt: &[u8],
    ) -> Result<Self, TunnelError> {
        let subkey = derive_subkey(suite, master_key, salt)?;
        Ok(Self::new(Cipher::new(suite, &subkey)?))
    }

    /// Next nonce the encoder will use
    pub fn nonce(&self) -> [u8; 12] {
        self.cipher.nonce()
    }

    /// Encode `data` into as many frame pairs as needed, appending to `out`.
    ///
    /// Empty input produces no frames.
    pub fn encode(&mut self, data: &[u8], out: &mut Vec<u8>) -> Result<(), TunnelError> {
        out.reserve(encoded_len(data.len()));

        for chunk in data.chunks(MAX_PAYLOAD_SIZE) {
            let length = (chunk.len() & MAX_PAYLOAD_SIZE) as u16;
            out.extend_from_slice(&encrypt_length(&mut self.cipher, length)?);
            self.cipher.encrypt_into(chunk, out)?;
            trace!("Encoded frame pair with {} byte payload", chunk.len());
        }

        Ok(())
    }
}

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Waiting for the peer's salt
    AwaitSalt,
    /// Waiting for an encrypted length frame
    AwaitLength,
    /// Waiting for an encrypted payload frame of the given plaintext size
    AwaitPayload(usize),
    /// A frame failed to authenticate; the stream is dead
    Failed,
}

impl DecodeState {
    /// Bytes that must be buffered before this state can advance
    pub fn frame_size(&self, suite: CipherSuite) -> Option<usize> {
        match self {
            DecodeState::AwaitSalt => Some(suite.salt_len()),
            DecodeState::AwaitLength => Some(LENGTH_FIELD_SIZE + TAG_LEN),
            DecodeState::AwaitPayload(len) => Some(len + TAG_LEN),
            DecodeState::Failed => None,
        }
    }
}

/// Incremental decoder for the receiving direction
///
/// Bytes may be fed in any chunking; the decoder buffers until the current
/// frame is complete and returns every payload that became available.
pub struct FrameDecoder {
    suite: CipherSuite,
    master_key: Vec<u8>,
    state: DecodeState,
    cipher: Option<Cipher>,
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Decoder that expects the peer's salt first
    pub fn new(suite: CipherSuite, master_key: &[u8]) -> Self {
        Self {
            suite,
            master_key: master_key.to_vec(),
            state: DecodeState::AwaitSalt,
            cipher: None,
            buffer: BytesMut::new(),
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Number of bytes held waiting for a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed raw bytes, returning the payloads completed by them
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Bytes>, TunnelError> {
        if self.state == DecodeState::Failed {
            return Err(TunnelError::InvalidFrame("decoder already failed".to_string()));
        }

        self.buffer.extend_from_slice(data);

        let mut chunks = Vec::new();
        loop {
            match self.step() {
                Ok(Some(Some(chunk))) => chunks.push(chunk),
                Ok(Some(None)) => continue,
                Ok(None) => break,
                Err(e) => {
                    self.state = DecodeState::Failed;
                    self.buffer.clear();
                    return Err(e);
                }
            }
        }

        Ok(chunks)
    }

    /// Called when the underlying stream hits EOF.
    ///
    /// Clean only on a frame boundary with nothing buffered.
    pub fn finish(&self) -> Result<(), TunnelError> {
        match self.state {
            DecodeState::AwaitSalt if !self.buffer.is_empty() => Err(TunnelError::ShortSalt {
                expected: self.suite.salt_len(),
                actual: self.buffer.len(),
            }),
            DecodeState::AwaitPayload(_) => Err(TunnelError::UnexpectedEof),
            _ if !self.buffer.is_empty() => Err(TunnelError::UnexpectedEof),
            _ => Ok(()),
        }
    }

    /// Advance by at most one frame.
    ///
    /// `None` means more bytes are needed; `Some(None)` means a frame was
    /// consumed without producing payload.
    fn step(&mut self) -> Result<Option<Option<Bytes>>, TunnelError> {
        let needed = match self.state.frame_size(self.suite) {
            Some(n) => n,
            None => return Err(TunnelError::InvalidFrame("decoder already failed".to_string())),
        };
        if self.buffer.len() < needed {
            return Ok(None);
        }

        let mut frame = self.buffer.split_to(needed);

        match self.state {
            DecodeState::AwaitSalt => {
                let subkey = derive_subkey(self.suite, &self.master_key, &frame)?;
                self.cipher = Some(Cipher::new(self.suite, &subkey)?);
                self.state = DecodeState::AwaitLength;
                Ok(Some(None))
            }
            DecodeState::AwaitLength => {
                let sealed: &[u8; LENGTH_FIELD_SIZE + TAG_LEN] = frame[..]
                    .try_into()
                    .map_err(|_| TunnelError::InvalidFrame("short length frame".to_string()))?;
                let cipher = self.receive_cipher()?;
                let length = decrypt_length(cipher, sealed)
                    .map_err(|_| TunnelError::AuthenticationFailed)?;
                let length = length as usize & MAX_PAYLOAD_SIZE;
                self.state = DecodeState::AwaitPayload(length);
                Ok(Some(None))
            }
            DecodeState::AwaitPayload(length) => {
                let cipher = self.receive_cipher()?;
                cipher
                    .decrypt_in_place(&mut frame)
                    .map_err(|_| TunnelError::AuthenticationFailed)?;
                frame.truncate(length);
                self.state = DecodeState::AwaitLength;
                trace!("Decoded {} byte payload", length);

                if length == 0 {
                    Ok(Some(None))
                } else {
                    Ok(Some(Some(frame.freeze())))
                }
            }
            DecodeState::Failed => Err(TunnelError::InvalidFrame("decoder already failed".to_string())),
        }
    }

    fn receive_cipher(&mut self) -> Result<&mut Cipher, TunnelError> {
        self.cipher
            .as_mut()
            .ok_or_else(|| TunnelError::InvalidFrame("receive key not established".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_master_key, generate_salt};
    use std::collections::HashSet;

    const SIZES: [usize; 5] = [0, 1, 16383, 16384, 50000];

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    /// Salt followed by the encoded payload
    fn encode_stream(suite: CipherSuite, master: &[u8], data: &[u8]) -> Vec<u8> {
        let salt = generate_salt(suite);
        let mut encoder = FrameEncoder::from_salt(suite, master, &salt).unwrap();
        let mut out = salt;
        encoder.encode(data, &mut out).unwrap();
        out
    }

    fn concat(chunks: Vec<Bytes>) -> Vec<u8> {
        chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }

    #[test]
    fn test_roundtrip_all_suites() {
        for suite in CipherSuite::all() {
            let master = derive_master_key(b"test-password", suite.key_len());
            for size in SIZES {
                let data = payload(size);
                let wire = encode_stream(suite, &master, &data);
                assert_eq!(wire.len(), suite.salt_len() + encoded_len(size));

                let mut decoder = FrameDecoder::new(suite, &master);
                let decoded = concat(decoder.feed(&wire).unwrap());
                assert_eq!(decoded, data, "{} / {} bytes", suite, size);
                assert_eq!(decoder.buffered(), 0);
                assert!(decoder.finish().is_ok());
            }
        }
    }

    #[test]
    fn test_large_payload_splits_into_pairs() {
        assert_eq!(frame_pairs(0), 0);
        assert_eq!(frame_pairs(1), 1);
        assert_eq!(frame_pairs(16383), 1);
        assert_eq!(frame_pairs(16384), 2);
        assert_eq!(frame_pairs(50000), 4);

        let suite = CipherSuite::Aes128Gcm;
        let master = derive_master_key(b"pw", suite.key_len());
        let wire = encode_stream(suite, &master, &payload(50000));

        let mut decoder = FrameDecoder::new(suite, &master);
        let chunks = decoder.feed(&wire).unwrap();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![16383, 16383, 16383, 851]);
    }

    #[test]
    fn test_byte_at_a_time_matches_single_chunk() {
        let suite = CipherSuite::ChaCha20Poly1305;
        let master = derive_master_key(b"pw", suite.key_len());
        let data = payload(20000);
        let wire = encode_stream(suite, &master, &data);

        let mut whole = FrameDecoder::new(suite, &master);
        let expected = concat(whole.feed(&wire).unwrap());

        let mut split = FrameDecoder::new(suite, &master);
        let mut got = Vec::new();
        for byte in &wire {
            got.extend(concat(split.feed(std::slice::from_ref(byte)).unwrap()));
        }

        assert_eq!(got, expected);
        assert_eq!(got, data);
    }

    #[test]
    fn test_state_transitions() {
        let suite = CipherSuite::Aes256Gcm;
        let master = derive_master_key(b"pw", suite.key_len());
        let wire = encode_stream(suite, &master, b"hello");

        let mut decoder = FrameDecoder::new(suite, &master);
        assert_eq!(decoder.state(), DecodeState::AwaitSalt);

        decoder.feed(&wire[..suite.salt_len()]).unwrap();
        assert_eq!(decoder.state(), DecodeState::AwaitLength);

        let length_end = suite.salt_len() + 2 + TAG_LEN;
        decoder.feed(&wire[suite.salt_len()..length_end]).unwrap();
        assert_eq!(decoder.state(), DecodeState::AwaitPayload(5));

        let chunks = decoder.feed(&wire[length_end..]).unwrap();
        assert_eq!(decoder.state(), DecodeState::AwaitLength);
        assert_eq!(concat(chunks), b"hello");
    }

    #[test]
    fn test_any_bit_flip_is_detected() {
        let suite = CipherSuite::Aes128Gcm;
        let master = derive_master_key(b"pw", suite.key_len());
        let wire = encode_stream(suite, &master, b"ping");

        for index in 0..wire.len() {
            for bit in [0u8, 3, 7] {
                let mut tampered = wire.clone();
                tampered[index] ^= 1 << bit;

                let mut decoder = FrameDecoder::new(suite, &master);
                let result = decoder.feed(&tampered);
                assert!(
                    matches!(result, Err(TunnelError::AuthenticationFailed)),
                    "flip at byte {} bit {} not detected",
                    index,
                    bit
                );
                assert_eq!(decoder.state(), DecodeState::Failed);
                assert!(decoder.feed(b"more").is_err());
            }
        }
    }

    #[test]
    fn test_nonce_unique_across_frames() {
        let suite = CipherSuite::Aes256Gcm;
        let master = derive_master_key(b"pw", suite.key_len());
        let salt = generate_salt(suite);
        let mut encoder = FrameEncoder::from_salt(suite, &master, &salt).unwrap();

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for _ in 0..1000 {
            assert!(seen.insert(encoder.nonce()));
            encoder.encode(b"x", &mut out).unwrap();
        }
        // two AEAD operations per frame pair
        let mut expected = [0u8; 12];
        expected[..2].copy_from_slice(&2000u16.to_le_bytes());
        assert_eq!(encoder.nonce(), expected);
    }

    #[test]
    fn test_wrong_password_fails() {
        let suite = CipherSuite::Aes256Gcm;
        let master = derive_master_key(b"right", suite.key_len());
        let other = derive_master_key(b"wrong", suite.key_len());
        let wire = encode_stream(suite, &master, b"secret");

        let mut decoder = FrameDecoder::new(suite, &other);
        assert!(matches!(
            decoder.feed(&wire),
            Err(TunnelError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_finish_reports_truncation() {
        let suite = CipherSuite::Aes128Gcm;
        let master = derive_master_key(b"pw", suite.key_len());
        let wire = encode_stream(suite, &master, b"truncated");

        let mut short_salt = FrameDecoder::new(suite, &master);
        short_salt.feed(&wire[..4]).unwrap();
        assert!(matches!(
            short_salt.finish(),
            Err(TunnelError::ShortSalt { expected: 16, actual: 4 })
        ));

        let mut mid_frame = FrameDecoder::new(suite, &master);
        mid_frame.feed(&wire[..wire.len() - 1]).unwrap();
        assert!(matches!(mid_frame.finish(), Err(TunnelError::UnexpectedEof)));

        let fresh = FrameDecoder::new(suite, &master);
        assert!(fresh.finish().is_ok());
    }
}
