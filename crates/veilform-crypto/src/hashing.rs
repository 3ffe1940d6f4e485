//! Salted field hashing for anonymous matching
//!
//! The service can spot repeated or matching submissions (the same email
//! address twice, say) by comparing fingerprints instead of plaintext. A
//! fingerprint is `base64(SHA-256(salt || normalize(value)))`, where
//! normalization trims surrounding whitespace and lowercases.
//!
//! Salts are per form, so the same value hashes differently on two forms and
//! fingerprints cannot be correlated across them.
//!
//! Trimming follows the browser's `String.prototype.trim`: a leading byte
//! order mark is stripped, U+0085 is not.

use crate::{
    encoding,
    provider::{CryptoProvider, RustCryptoProvider, DIGEST_SIZE},
    Result,
};
use subtle::ConstantTimeEq;

/// Size of a generated field salt in bytes
pub const FIELD_SALT_SIZE: usize = 32;

/// Normalize a field value before hashing
pub fn normalize_field(value: &str) -> String {
    value.trim_matches(is_trimmed).to_lowercase()
}

fn is_trimmed(c: char) -> bool {
    c == '\u{feff}' || (c.is_whitespace() && c != '\u{85}')
}

/// Fingerprints field values under one salt
#[derive(Clone, Debug)]
pub struct FieldHasher<P: CryptoProvider = RustCryptoProvider> {
    provider: P,
    salt: String,
}

impl FieldHasher<RustCryptoProvider> {
    /// Create a hasher for a form's salt
    pub fn new(salt: impl Into<String>) -> Self {
        Self::with_provider(RustCryptoProvider, salt)
    }
}

impl<P: CryptoProvider> FieldHasher<P> {
    pub fn with_provider(provider: P, salt: impl Into<String>) -> Self {
        Self {
            provider,
            salt: salt.into(),
        }
    }

    fn digest(&self, value: &str) -> [u8; DIGEST_SIZE] {
        let normalized = normalize_field(value);
        let mut input = Vec::with_capacity(self.salt.len() + normalized.len());
        input.extend_from_slice(self.salt.as_bytes());
        input.extend_from_slice(normalized.as_bytes());
        self.provider.digest(&input)
    }

    /// Fingerprint a value
    pub fn hash(&self, value: &str) -> String {
        encoding::to_base64(&self.digest(value))
    }

    /// Whether `value` has the given fingerprint
    ///
    /// Digests are compared in constant time. A fingerprint that is not
    /// valid base64 never matches.
    pub fn matches(&self, value: &str, fingerprint: &str) -> bool {
        match encoding::from_base64(fingerprint) {
            Ok(expected) => self.digest(value)[..].ct_eq(&expected[..]).into(),
            Err(_) => false,
        }
    }
}

/// Fingerprint `value` under `salt` with the default provider
pub fn hash_field(value: &str, salt: &str) -> String {
    FieldHasher::new(salt).hash(value)
}

/// Generate a fresh random salt for a new form, base64-encoded
pub fn generate_field_salt() -> Result<String> {
    let mut salt = [0u8; FIELD_SALT_SIZE];
    RustCryptoProvider.fill_random(&mut salt)?;
    Ok(encoding::to_base64(&salt))
}
