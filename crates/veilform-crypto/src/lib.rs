//! # Veilform Crypto
//!
//! Zero-knowledge submission encryption for Veilform forms.
//!
//! This crate provides:
//! - **Key pairs**: RSA-OAEP (2048-bit, SHA-256) per form, exported as JSON Web Keys
//! - **Envelopes**: per-submission AES-256-GCM encryption with an RSA-OAEP wrapped one-time key
//! - **Key bundles**: PBKDF2 + AES-256-GCM password protection for private key backups
//! - **Field hashing**: salted SHA-256 fingerprints for anonymous duplicate detection
//!
//! ## Security Model
//!
//! - Submissions are encrypted in the submitter's environment before transmission
//! - The collecting service stores envelopes and public keys only
//! - Private keys stay with the form owner, optionally sealed in a key bundle
//! - Opening an envelope or a bundle fails with one generic error, whatever went wrong
//!
//! All platform cryptography sits behind [`CryptoProvider`]; the default
//! [`RustCryptoProvider`] uses the RustCrypto crates.
//!
//! ## Example
//!
//! ```rust,no_run
//! use veilform_crypto::{decrypt_submission, encrypt_submission, generate_key_pair};
//! use serde_json::json;
//!
//! # fn main() -> veilform_crypto::Result<()> {
//! let pair = generate_key_pair()?;
//! let submission = json!({"name": "Alice Smith", "email": "alice@example.com"});
//!
//! let envelope = encrypt_submission(&submission, &pair.public_key)?;
//! let opened = decrypt_submission(&envelope.to_value()?, &pair.private_key)?;
//! assert_eq!(opened, submission);
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod hashing;
pub mod keygen;
pub mod keys;
pub mod provider;
pub mod symmetric;

pub use bundle::{
    change_bundle_password, export_private_keys, import_private_keys, BundleConfig,
    BundleVersion, KeyBundle, KeyBundleExporter, KeyBundleImporter, KeyMap,
};
pub use envelope::{
    decrypt_submission, decrypt_submission_as, decrypt_submission_strict, encrypt_submission,
    EncryptedEnvelope, EnvelopeDecryptor, EnvelopeEncryptor, EnvelopeVersion,
};
pub use error::{CryptoError, Result};
pub use hashing::{generate_field_salt, hash_field, FieldHasher};
pub use keygen::{generate_key_pair, KeyPairGenerator, RsaKeyParams};
pub use keys::{DataKey, KeyPair, KeyRecord, KeyUsage};
pub use provider::{CryptoProvider, RustCryptoProvider};
pub use symmetric::{Aead, Nonce};
