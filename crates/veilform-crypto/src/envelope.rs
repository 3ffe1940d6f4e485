//! Submission envelope encryption
//!
//! A submission is sealed in the submitter's environment before it is sent:
//!
//! 1. a fresh one-time AES-256-GCM key and 96-bit IV are generated,
//! 2. the UTF-8 JSON of the submission is encrypted under that key,
//! 3. the raw key is wrapped with RSA-OAEP (SHA-256) for the form's public key.
//!
//! The resulting [`EncryptedEnvelope`] is the only thing transmitted and
//! stored. Only the form owner's private key can unwrap the one-time key.
//!
//! Every failure while opening an envelope is reported as the same
//! [`CryptoError::Decryption`], so callers cannot learn which step rejected
//! a forged or tampered envelope.

use crate::{
    encoding::base64_vec_serde,
    keys::{KeyRecord, KEY_SIZE, NONCE_SIZE},
    provider::{CryptoProvider, RustCryptoProvider},
    symmetric::Nonce,
    CryptoError, Result,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

/// Wire identifier of the first envelope format
pub const ENVELOPE_VERSION_V1: &str = "vf-e1";

/// Envelope format versions understood by this crate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeVersion {
    /// RSA-OAEP-SHA256 wrapped AES-256-GCM key, 96-bit IV
    V1,
}

/// Wire string to version. New formats are added here.
const ENVELOPE_VERSIONS: &[(&str, EnvelopeVersion)] = &[(ENVELOPE_VERSION_V1, EnvelopeVersion::V1)];

impl EnvelopeVersion {
    /// Version written by new envelopes
    pub const CURRENT: Self = Self::V1;

    /// Look up a wire version string
    pub fn from_wire(version: &str) -> Result<Self> {
        ENVELOPE_VERSIONS
            .iter()
            .find(|(wire, _)| *wire == version)
            .map(|(_, v)| *v)
            .ok_or_else(|| CryptoError::UnsupportedEnvelopeVersion(version.to_string()))
    }

    /// Wire version string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => ENVELOPE_VERSION_V1,
        }
    }

    /// IV length for this version
    pub fn nonce_size(&self) -> usize {
        match self {
            Self::V1 => NONCE_SIZE,
        }
    }

    /// One-time key length for this version
    pub fn key_size(&self) -> usize {
        match self {
            Self::V1 => KEY_SIZE,
        }
    }
}

/// An encrypted submission as transmitted and stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Always `true` for envelopes produced by this crate
    pub encrypted: bool,
    /// Format version, e.g. `"vf-e1"`
    pub version: String,
    /// AES-256-GCM ciphertext with appended tag
    #[serde(with = "base64_vec_serde")]
    pub data: Vec<u8>,
    /// RSA-OAEP wrapped one-time key
    #[serde(with = "base64_vec_serde")]
    pub key: Vec<u8>,
    /// AES-GCM nonce
    #[serde(with = "base64_vec_serde")]
    pub iv: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Whether a stored payload claims to be an encrypted envelope
    pub fn is_encrypted_payload(payload: &Value) -> bool {
        payload.get("encrypted") == Some(&Value::Bool(true))
    }

    /// Parse an envelope from JSON text
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn encryption_error(err: CryptoError) -> CryptoError {
    match err {
        CryptoError::KeyFormat(_) | CryptoError::Encryption(_) => err,
        other => CryptoError::Encryption(other.to_string()),
    }
}

/// Seals submissions for one recipient public key
///
/// The imported key is the only state; every call draws a new one-time key
/// and IV.
pub struct EnvelopeEncryptor<P: CryptoProvider = RustCryptoProvider> {
    provider: P,
    recipient: P::PublicKey,
}

impl EnvelopeEncryptor<RustCryptoProvider> {
    /// Create an encryptor for a recipient's public key record
    pub fn new(public_key: &KeyRecord) -> Result<Self> {
        Self::with_provider(RustCryptoProvider, public_key)
    }
}

impl<P: CryptoProvider> EnvelopeEncryptor<P> {
    /// Create an encryptor over a specific provider
    pub fn with_provider(provider: P, public_key: &KeyRecord) -> Result<Self> {
        let recipient = provider
            .import_public_key(public_key)
            .map_err(encryption_error)?;
        Ok(Self { provider, recipient })
    }

    /// Encrypt any JSON-serializable value into a fresh envelope
    #[instrument(skip_all, fields(version = EnvelopeVersion::CURRENT.as_str()))]
    pub fn encrypt<T: Serialize + ?Sized>(&self, plaintext: &T) -> Result<EncryptedEnvelope> {
        let serialized = serde_json::to_vec(plaintext).map_err(|e| {
            CryptoError::Encryption(format!("submission is not JSON-serializable: {e}"))
        })?;

        let one_time_key = self.provider.generate_data_key().map_err(encryption_error)?;
        let nonce = self.provider.generate_nonce().map_err(encryption_error)?;
        let data = self
            .provider
            .seal(&one_time_key, &nonce, &serialized)
            .map_err(encryption_error)?;
        let key = self
            .provider
            .wrap_key(&self.recipient, &one_time_key)
            .map_err(encryption_error)?;

        tracing::debug!(
            plaintext_len = serialized.len(),
            ciphertext_len = data.len(),
            "sealed submission envelope"
        );

        Ok(EncryptedEnvelope {
            encrypted: true,
            version: EnvelopeVersion::CURRENT.as_str().to_string(),
            data,
            key,
            iv: nonce.as_bytes().to_vec(),
        })
    }
}

/// Opens envelopes with one private key
pub struct EnvelopeDecryptor<P: CryptoProvider = RustCryptoProvider> {
    provider: P,
    private: P::PrivateKey,
}

impl EnvelopeDecryptor<RustCryptoProvider> {
    /// Create a decryptor for a private key record
    pub fn new(private_key: &KeyRecord) -> Result<Self> {
        Self::with_provider(RustCryptoProvider, private_key)
    }
}

impl<P: CryptoProvider> EnvelopeDecryptor<P> {
    /// Create a decryptor over a specific provider
    ///
    /// An unusable private key is reported as [`CryptoError::Decryption`].
    pub fn with_provider(provider: P, private_key: &KeyRecord) -> Result<Self> {
        let private = provider.import_private_key(private_key).map_err(|e| {
            tracing::trace!(error = %e, "private key import failed");
            CryptoError::Decryption
        })?;
        Ok(Self { provider, private })
    }

    /// Decrypt a stored payload
    ///
    /// Payloads whose `encrypted` member is not `true` are returned
    /// unchanged. Use [`EnvelopeDecryptor::decrypt_strict`] to refuse them.
    pub fn decrypt(&self, payload: &Value) -> Result<Value> {
        if !EncryptedEnvelope::is_encrypted_payload(payload) {
            tracing::debug!("payload is not encrypted, passing through");
            return Ok(payload.clone());
        }
        self.decrypt_strict(payload)
    }

    /// Decrypt a stored payload, refusing anything that is not an envelope
    pub fn decrypt_strict(&self, payload: &Value) -> Result<Value> {
        let version = payload_version(payload)?;
        let envelope: EncryptedEnvelope = serde_json::from_value(payload.clone()).map_err(|e| {
            tracing::trace!(error = %e, "malformed envelope");
            CryptoError::Decryption
        })?;
        self.open(version, &envelope)
    }

    /// Decrypt a parsed envelope
    pub fn decrypt_envelope(&self, envelope: &EncryptedEnvelope) -> Result<Value> {
        let version = EnvelopeVersion::from_wire(&envelope.version)?;
        self.open(version, envelope)
    }

    /// Decrypt a parsed envelope into a typed value
    pub fn decrypt_envelope_as<T: DeserializeOwned>(
        &self,
        envelope: &EncryptedEnvelope,
    ) -> Result<T> {
        let value = self.decrypt_envelope(envelope)?;
        serde_json::from_value(value).map_err(|e| {
            tracing::trace!(error = %e, "submission does not match requested type");
            CryptoError::Decryption
        })
    }

    #[instrument(skip_all, fields(version = version.as_str()))]
    fn open(&self, version: EnvelopeVersion, envelope: &EncryptedEnvelope) -> Result<Value> {
        self.open_inner(version, envelope).map_err(|e| {
            tracing::trace!(error = %e, "envelope rejected");
            CryptoError::Decryption
        })
    }

    fn open_inner(&self, version: EnvelopeVersion, envelope: &EncryptedEnvelope) -> Result<Value> {
        if !envelope.encrypted {
            return Err(CryptoError::InvalidNonce(
                "envelope is not marked encrypted".to_string(),
            ));
        }
        if envelope.iv.len() != version.nonce_size() {
            return Err(CryptoError::InvalidNonce(format!(
                "expected {} byte IV, got {}",
                version.nonce_size(),
                envelope.iv.len()
            )));
        }
        let nonce = Nonce::from_bytes(&envelope.iv)?;

        let one_time_key = self.provider.unwrap_key(&self.private, &envelope.key)?;
        if one_time_key.as_bytes().len() != version.key_size() {
            return Err(CryptoError::InvalidKey("unexpected key size".to_string()));
        }
        let plaintext = self.provider.open(&one_time_key, &nonce, &envelope.data)?;
        let value = serde_json::from_slice(&plaintext)?;

        tracing::debug!(ciphertext_len = envelope.data.len(), "opened submission envelope");
        Ok(value)
    }
}

/// Read and dispatch the `version` member before any cryptography runs
fn payload_version(payload: &Value) -> Result<EnvelopeVersion> {
    match payload.get("version").and_then(Value::as_str) {
        Some(version) => EnvelopeVersion::from_wire(version),
        None => Err(CryptoError::UnsupportedEnvelopeVersion(
            "missing".to_string(),
        )),
    }
}

/// Encrypt a submission for a form's public key record
pub fn encrypt_submission<T: Serialize + ?Sized>(
    plaintext: &T,
    public_key: &KeyRecord,
) -> Result<EncryptedEnvelope> {
    EnvelopeEncryptor::new(public_key)?.encrypt(plaintext)
}

/// Decrypt a stored payload with the form's private key record
///
/// Payloads whose `encrypted` member is not `true` are returned unchanged,
/// without touching the key. An unknown `version` is rejected before the
/// key is imported.
pub fn decrypt_submission(payload: &Value, private_key: &KeyRecord) -> Result<Value> {
    if !EncryptedEnvelope::is_encrypted_payload(payload) {
        tracing::debug!("payload is not encrypted, passing through");
        return Ok(payload.clone());
    }
    decrypt_submission_strict(payload, private_key)
}

/// Decrypt a stored payload, refusing unencrypted ones
pub fn decrypt_submission_strict(payload: &Value, private_key: &KeyRecord) -> Result<Value> {
    if !EncryptedEnvelope::is_encrypted_payload(payload) {
        return Err(CryptoError::Decryption);
    }
    payload_version(payload)?;
    EnvelopeDecryptor::new(private_key)?.decrypt_strict(payload)
}

/// Decrypt an envelope into a typed submission
pub fn decrypt_submission_as<T: DeserializeOwned>(
    envelope: &EncryptedEnvelope,
    private_key: &KeyRecord,
) -> Result<T> {
    EnvelopeVersion::from_wire(&envelope.version)?;
    EnvelopeDecryptor::new(private_key)?.decrypt_envelope_as(envelope)
}
