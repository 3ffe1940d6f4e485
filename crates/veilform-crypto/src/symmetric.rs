//! Symmetric encryption using AES-256-GCM
//!
//! Both the submission payload and the key bundle are sealed with
//! AES-256-GCM under a fresh 96-bit nonce. The 128-bit tag is appended to
//! the ciphertext.

use crate::{
    keys::{DataKey, NONCE_SIZE},
    CryptoError, Result,
};
use aes_gcm::{aead::Aead as AeadTrait, Aes256Gcm, KeyInit};

/// Size of the GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// A nonce for AEAD encryption
///
/// Fresh nonces come from [`CryptoProvider::generate_nonce`](crate::CryptoProvider::generate_nonce).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonce(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

/// AES-256-GCM encryption/decryption under one key
pub struct Aead {
    cipher: Aes256Gcm,
}

impl Aead {
    /// Create a new AEAD instance with the given key
    pub fn new(key: &DataKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(aes_gcm::Key::<Aes256Gcm>::from_slice(key.as_bytes())),
        }
    }

    /// Encrypt data with the given nonce
    pub fn encrypt(&self, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Decrypt data with the given nonce
    ///
    /// Tag mismatch is reported as [`CryptoError::Decryption`].
    pub fn decrypt(&self, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}
