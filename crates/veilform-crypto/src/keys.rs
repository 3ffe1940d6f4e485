//! Key material for the Veilform submission protocol
//!
//! Two kinds of keys flow through the crate:
//! - [`DataKey`]: random 256-bit AES keys, either one-time submission keys or
//!   password-derived bundle keys
//! - [`KeyRecord`]: RSA keys in JSON Web Key form, the interoperable record
//!   that browsers export and the form configuration embeds

use crate::{encoding, CryptoError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits for AES-GCM)
pub const NONCE_SIZE: usize = 12;

/// Key type tag carried by every RSA key record
pub const KTY_RSA: &str = "RSA";

/// JWK algorithm identifier for RSA-OAEP with SHA-256
pub const ALG_RSA_OAEP_256: &str = "RSA-OAEP-256";

/// A 256-bit symmetric key for AES-256-GCM
///
/// Random keys come from [`CryptoProvider::generate_data_key`](crate::CryptoProvider::generate_data_key).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DataKey {
    key: [u8; KEY_SIZE],
}

impl DataKey {
    /// Create a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "data key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for DataKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DataKey(..)")
    }
}

/// Operation a key record may be used for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyUsage {
    Encrypt,
    Decrypt,
}

impl KeyUsage {
    /// The `key_ops` member value for this usage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
        }
    }
}

/// An RSA key in JSON Web Key form
///
/// Big integers are unpadded base64url, big-endian. Members this crate does
/// not interpret (`kid`, `use`, ...) are kept in `other` so records survive a
/// round trip through a key bundle unchanged.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyRecord {
    #[zeroize(skip)]
    pub kty: String,
    #[zeroize(skip)]
    pub n: String,
    #[zeroize(skip)]
    pub e: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[zeroize(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[zeroize(skip)]
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl KeyRecord {
    /// Build a public key record from big-endian modulus and exponent bytes
    pub fn public_from_components(n: &[u8], e: &[u8]) -> Self {
        Self {
            kty: KTY_RSA.to_string(),
            n: encoding::to_base64url(n),
            e: encoding::to_base64url(e),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            alg: Some(ALG_RSA_OAEP_256.to_string()),
            ext: Some(true),
            key_ops: Some(vec![KeyUsage::Encrypt.as_str().to_string()]),
            other: BTreeMap::new(),
        }
    }

    /// Parse a record from JSON text
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| CryptoError::KeyFormat(e.to_string()))
    }

    /// Serialize the record to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether the record carries private key material
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// Derive the public record from this record, dropping private members
    pub fn to_public(&self) -> Self {
        Self {
            kty: self.kty.clone(),
            n: self.n.clone(),
            e: self.e.clone(),
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            alg: self.alg.clone(),
            ext: self.ext,
            key_ops: Some(vec![KeyUsage::Encrypt.as_str().to_string()]),
            other: self.other.clone(),
        }
    }

    /// Structural checks for a record used to encrypt
    pub fn validate_public(&self) -> Result<()> {
        self.validate_common(KeyUsage::Encrypt)
    }

    /// Structural checks for a record used to decrypt
    pub fn validate_private(&self) -> Result<()> {
        self.validate_common(KeyUsage::Decrypt)?;
        for (name, member) in [("d", &self.d), ("p", &self.p), ("q", &self.q)] {
            match member {
                Some(value) if !value.is_empty() => {}
                _ => {
                    return Err(CryptoError::KeyFormat(format!(
                        "private key is missing `{name}`"
                    )))
                }
            }
        }
        Ok(())
    }

    fn validate_common(&self, usage: KeyUsage) -> Result<()> {
        if self.kty != KTY_RSA {
            return Err(CryptoError::KeyFormat(format!(
                "expected kty \"{}\", got \"{}\"",
                KTY_RSA, self.kty
            )));
        }
        if self.n.is_empty() || self.e.is_empty() {
            return Err(CryptoError::KeyFormat(
                "key is missing modulus or exponent".to_string(),
            ));
        }
        if let Some(alg) = &self.alg {
            if alg != ALG_RSA_OAEP_256 {
                return Err(CryptoError::KeyFormat(format!(
                    "unsupported alg \"{alg}\", expected \"{ALG_RSA_OAEP_256}\""
                )));
            }
        }
        if let Some(ops) = &self.key_ops {
            if !ops.iter().any(|op| op == usage.as_str()) {
                return Err(CryptoError::KeyFormat(format!(
                    "key_ops does not permit \"{}\"",
                    usage.as_str()
                )));
            }
        }
        Ok(())
    }

    /// RFC 7638 JWK thumbprint (SHA-256, base64url)
    ///
    /// Identifies a form's key without revealing it. Public and private
    /// records of the same pair share a thumbprint.
    pub fn thumbprint(&self) -> Result<String> {
        let canonical = format!(
            "{{\"e\":{},\"kty\":{},\"n\":{}}}",
            serde_json::to_string(&self.e)?,
            serde_json::to_string(&self.kty)?,
            serde_json::to_string(&self.n)?,
        );
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(encoding::to_base64url(&digest))
    }
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("private", &self.is_private())
            .field("n_len", &self.n.len())
            .finish_non_exhaustive()
    }
}

/// A form's RSA-OAEP key pair
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    /// Distributed to submitters
    pub public_key: KeyRecord,
    /// Held only by the form owner
    pub private_key: KeyRecord,
    pub created_at: DateTime<Utc>,
}

impl KeyPair {
    /// Rebuild a pair from a private record, e.g. after a bundle import
    pub fn from_private_record(private_key: KeyRecord) -> Result<Self> {
        private_key.validate_private()?;
        Ok(Self {
            public_key: private_key.to_public(),
            private_key,
            created_at: Utc::now(),
        })
    }

    /// Thumbprint shared by both halves of the pair
    pub fn thumbprint(&self) -> Result<String> {
        self.public_key.thumbprint()
    }
}
