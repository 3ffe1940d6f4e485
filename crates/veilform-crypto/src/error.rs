//! Error types for the veilform-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
///
/// Failures of the decryption paths are deliberately collapsed: envelope
/// decryption only ever reports [`CryptoError::Decryption`] and bundle import
/// only ever reports [`CryptoError::KeyPasswordIncorrect`], whatever sub-step
/// failed.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Envelope could not be opened. Carries no cause.
    #[error("decryption failed: invalid key or corrupted data")]
    Decryption,

    /// Export password does not satisfy the password policy
    #[error("password must be at least {min_length} characters")]
    WeakPassword { min_length: usize },

    /// Key bundle carries a missing or unsupported version
    #[error("unsupported key bundle version: {0}")]
    BundleVersion(String),

    /// Envelope carries an unsupported version
    #[error("unsupported envelope version: {0}")]
    UnsupportedEnvelopeVersion(String),

    /// Key bundle is structurally malformed
    #[error("invalid key bundle: {0}")]
    InvalidBundle(String),

    /// Key bundle could not be opened. Carries no cause.
    #[error("invalid password or corrupted key bundle")]
    KeyPasswordIncorrect,

    /// Key record fails structural validation
    #[error("invalid key record: {0}")]
    KeyFormat(String),

    /// Invalid key material or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid nonce
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
