//! Uniform pseudorandom generator for reproducible byte streams.
//!
//! The generator runs AES-256 in counter mode over an all-zero plaintext, so
//! its output is exactly the CTR keystream defined by NIST SP 800-38A.  The
//! 16-byte nonce is the initial counter block and is incremented as a
//! 128-bit big-endian integer.  Partially consumed blocks are buffered, which
//! makes the stream independent of how callers chunk their requests.
//!
//! This is a source of *reproducible* randomness: anyone holding the key and
//! nonce can recompute every byte.  Encryption blinding factors come from the
//! operating system instead (see [`crate::encrypter`]).

use std::fmt;

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha512};
use thiserror::Error;

/// Key width required by AES-256.
pub const KEY_BYTES: usize = 32;
/// Nonce width, one AES block.
pub const NONCE_BYTES: usize = 16;

const BLOCK_BYTES: usize = 16;

/// Errors reported by [`UniformPseudorandomGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error(
        "The uniform pseudorandom generator key has length of {actual} bytes but {required} bytes are required."
    )]
    /// The key does not match the cipher's key schedule width.
    InvalidKeyLength {
        /// Length supplied by the caller.
        actual: usize,
        /// Length the cipher requires.
        required: usize,
    },
    #[error(
        "The uniform pseudorandom generator IV has length of {actual} bytes but {required} bytes are required."
    )]
    /// The nonce is not exactly one cipher block wide.
    InvalidNonceLength {
        /// Length supplied by the caller.
        actual: usize,
        /// Length the cipher requires.
        required: usize,
    },
    #[error("Number of pseudorandom bytes must be a positive value.")]
    /// A request for zero bytes.
    NonPositiveLength,
}

/// Deterministic AES-256-CTR keystream generator.
pub struct UniformPseudorandomGenerator {
    cipher: Aes256,
    counter: u128,
    buffer: [u8; BLOCK_BYTES],
    offset: usize,
}

impl fmt::Debug for UniformPseudorandomGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformPseudorandomGenerator")
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl UniformPseudorandomGenerator {
    /// Creates a generator from a 32-byte key and a 16-byte nonce.
    pub fn new(key: &[u8], nonce: &[u8]) -> Result<Self, GeneratorError> {
        if key.len() != KEY_BYTES {
            return Err(GeneratorError::InvalidKeyLength {
                actual: key.len(),
                required: KEY_BYTES,
            });
        }
        if nonce.len() != NONCE_BYTES {
            return Err(GeneratorError::InvalidNonceLength {
                actual: nonce.len(),
                required: NONCE_BYTES,
            });
        }
        let mut fixed_key = [0u8; KEY_BYTES];
        fixed_key.copy_from_slice(key);
        let mut initial = [0u8; NONCE_BYTES];
        initial.copy_from_slice(nonce);
        Ok(Self::from_parts(&fixed_key, initial))
    }

    /// Creates a generator whose key and nonce are derived from `seed`.
    ///
    /// The seed is expanded with SHA-512; the first 32 bytes of the digest
    /// become the key and the next 16 the nonce.  Useful for test fixtures
    /// that should be reproducible from a human-readable label.
    pub fn from_seed(seed: &[u8]) -> Self {
        let digest = Sha512::digest(seed);
        let mut key = [0u8; KEY_BYTES];
        key.copy_from_slice(&digest[..KEY_BYTES]);
        let mut nonce = [0u8; NONCE_BYTES];
        nonce.copy_from_slice(&digest[KEY_BYTES..KEY_BYTES + NONCE_BYTES]);
        Self::from_parts(&key, nonce)
    }

    fn from_parts(key: &[u8; KEY_BYTES], nonce: [u8; NONCE_BYTES]) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(key)),
            counter: u128::from_be_bytes(nonce),
            buffer: [0u8; BLOCK_BYTES],
            offset: BLOCK_BYTES,
        }
    }

    /// Returns the next `count` bytes of the keystream.
    ///
    /// Fails without advancing the stream when `count` is zero.
    pub fn next_bytes(&mut self, count: usize) -> Result<Vec<u8>, GeneratorError> {
        if count == 0 {
            return Err(GeneratorError::NonPositiveLength);
        }
        let mut out = vec![0u8; count];
        self.fill(&mut out);
        Ok(out)
    }

    fn refill(&mut self) {
        let mut block = GenericArray::from(self.counter.to_be_bytes());
        self.cipher.encrypt_block(&mut block);
        self.buffer.copy_from_slice(&block);
        self.counter = self.counter.wrapping_add(1);
        self.offset = 0;
    }

    fn fill(&mut self, dest: &mut [u8]) {
        let mut written = 0;
        while written < dest.len() {
            if self.offset == BLOCK_BYTES {
                self.refill();
            }
            let take = (BLOCK_BYTES - self.offset).min(dest.len() - written);
            dest[written..written + take]
                .copy_from_slice(&self.buffer[self.offset..self.offset + take]);
            self.offset += take;
            written += take;
        }
    }
}

impl RngCore for UniformPseudorandomGenerator {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill(dest);
        Ok(())
    }
}

// AES-CTR output is indistinguishable from random for anyone without the key.
impl CryptoRng for UniformPseudorandomGenerator {}
