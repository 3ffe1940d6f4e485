//! Password-protected private key bundles
//!
//! A form owner backs up the private keys of their forms as a single
//! [`KeyBundle`]: the key map is serialized to JSON and sealed with
//! AES-256-GCM under a key derived from a password with PBKDF2-HMAC-SHA256.
//! Salt and IV are fresh for every export, and the iteration count is
//! recorded so future imports honor whatever value was used.
//!
//! Bundles are client-held artifacts and have no server-side form.

use crate::{
    encoding::base64_vec_serde,
    keys::{KeyRecord, NONCE_SIZE},
    provider::{CryptoProvider, RustCryptoProvider},
    symmetric::Nonce,
    CryptoError, Result,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::instrument;
use zeroize::Zeroizing;

/// Wire identifier of the first bundle format
pub const BUNDLE_VERSION_V1: &str = "1.0";

/// Algorithm label of the first bundle format
pub const BUNDLE_ALGORITHM_V1: &str = "PBKDF2-AES-GCM-256";

/// Default PBKDF2 iteration count
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Largest iteration count accepted from a bundle
pub const MAX_ITERATIONS: u32 = 10_000_000;

/// Size of the PBKDF2 salt in bytes (256 bits)
pub const SALT_SIZE: usize = 32;

/// Minimum export password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Form id to private key record
pub type KeyMap = BTreeMap<String, KeyRecord>;

/// Bundle format versions understood by this crate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BundleVersion {
    /// PBKDF2-HMAC-SHA256, AES-256-GCM, 256-bit salt, 96-bit IV
    V1,
}

/// Wire string to version. New formats are added here.
const BUNDLE_VERSIONS: &[(&str, BundleVersion)] = &[(BUNDLE_VERSION_V1, BundleVersion::V1)];

impl BundleVersion {
    /// Version written by new exports
    pub const CURRENT: Self = Self::V1;

    /// Look up a wire version string
    pub fn from_wire(version: &str) -> Result<Self> {
        BUNDLE_VERSIONS
            .iter()
            .find(|(wire, _)| *wire == version)
            .map(|(_, v)| *v)
            .ok_or_else(|| CryptoError::BundleVersion(version.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => BUNDLE_VERSION_V1,
        }
    }

    /// Algorithm label bound to this version
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::V1 => BUNDLE_ALGORITHM_V1,
        }
    }

    pub fn salt_size(&self) -> usize {
        match self {
            Self::V1 => SALT_SIZE,
        }
    }

    pub fn nonce_size(&self) -> usize {
        match self {
            Self::V1 => NONCE_SIZE,
        }
    }
}

/// Password-sealed key map
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBundle {
    pub version: String,
    pub algorithm: String,
    pub iterations: u32,
    #[serde(with = "base64_vec_serde")]
    pub salt: Vec<u8>,
    #[serde(with = "base64_vec_serde")]
    pub iv: Vec<u8>,
    #[serde(with = "base64_vec_serde")]
    pub ciphertext: Vec<u8>,
    pub exported_at: DateTime<Utc>,
}

impl KeyBundle {
    /// Parse a bundle from JSON text
    ///
    /// A missing or unknown `version` is reported as
    /// [`CryptoError::BundleVersion`] before the rest is looked at.
    pub fn from_json(s: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(s).map_err(|e| CryptoError::InvalidBundle(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Parse a bundle from a JSON value, checking the version first
    pub fn from_value(value: &Value) -> Result<Self> {
        match value.get("version").and_then(Value::as_str) {
            Some(version) => BundleVersion::from_wire(version)?,
            None => return Err(CryptoError::BundleVersion("missing".to_string())),
        };
        serde_json::from_value(value.clone()).map_err(|e| CryptoError::InvalidBundle(e.to_string()))
    }

    /// Serialize to JSON text
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to indented JSON text
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Version and structural checks; no cryptography
    pub fn validate(&self) -> Result<BundleVersion> {
        let version = BundleVersion::from_wire(&self.version)?;
        if self.algorithm != version.algorithm() {
            return Err(CryptoError::InvalidBundle(format!(
                "algorithm \"{}\" does not match version {}",
                self.algorithm,
                version.as_str()
            )));
        }
        check_iterations(self.iterations)?;
        if self.salt.len() != version.salt_size() {
            return Err(CryptoError::InvalidBundle(format!(
                "salt must be {} bytes, got {}",
                version.salt_size(),
                self.salt.len()
            )));
        }
        if self.iv.len() != version.nonce_size() {
            return Err(CryptoError::InvalidBundle(format!(
                "iv must be {} bytes, got {}",
                version.nonce_size(),
                self.iv.len()
            )));
        }
        Ok(version)
    }
}

fn check_iterations(iterations: u32) -> Result<()> {
    if iterations == 0 || iterations > MAX_ITERATIONS {
        return Err(CryptoError::InvalidBundle(format!(
            "iteration count must be between 1 and {MAX_ITERATIONS}, got {iterations}"
        )));
    }
    Ok(())
}

/// Export parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleConfig {
    /// PBKDF2 iteration count recorded in new bundles
    pub iterations: u32,
    /// Password policy, in characters
    pub min_password_length: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            min_password_length: MIN_PASSWORD_LENGTH,
        }
    }
}

impl BundleConfig {
    /// Set the iteration count
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Check a password against the policy
    pub fn check_password(&self, password: &str) -> Result<()> {
        if password.chars().count() < self.min_password_length {
            return Err(CryptoError::WeakPassword {
                min_length: self.min_password_length,
            });
        }
        Ok(())
    }
}

fn export_error(err: CryptoError) -> CryptoError {
    match err {
        CryptoError::Encryption(_) => err,
        other => CryptoError::Encryption(other.to_string()),
    }
}

/// Seals key maps into bundles
pub struct KeyBundleExporter<P: CryptoProvider = RustCryptoProvider> {
    provider: P,
    config: BundleConfig,
}

impl KeyBundleExporter<RustCryptoProvider> {
    pub fn new(config: BundleConfig) -> Self {
        Self::with_provider(RustCryptoProvider, config)
    }
}

impl Default for KeyBundleExporter<RustCryptoProvider> {
    fn default() -> Self {
        Self::new(BundleConfig::default())
    }
}

impl<P: CryptoProvider> KeyBundleExporter<P> {
    pub fn with_provider(provider: P, config: BundleConfig) -> Self {
        Self { provider, config }
    }

    /// Seal any serializable key map under `password`
    #[instrument(skip_all, fields(iterations = self.config.iterations))]
    pub fn export<T: Serialize + ?Sized>(&self, keys: &T, password: &str) -> Result<KeyBundle> {
        self.config.check_password(password)?;
        check_iterations(self.config.iterations)?;

        let version = BundleVersion::CURRENT;
        let mut salt = vec![0u8; version.salt_size()];
        self.provider.fill_random(&mut salt).map_err(export_error)?;
        let nonce = self.provider.generate_nonce().map_err(export_error)?;

        let derived = self
            .provider
            .derive_key(password.as_bytes(), &salt, self.config.iterations)
            .map_err(export_error)?;
        let serialized = Zeroizing::new(serde_json::to_vec(keys).map_err(|e| {
            CryptoError::Encryption(format!("key map is not JSON-serializable: {e}"))
        })?);
        let ciphertext = self
            .provider
            .seal(&derived, &nonce, &serialized)
            .map_err(export_error)?;

        tracing::debug!(ciphertext_len = ciphertext.len(), "exported key bundle");

        Ok(KeyBundle {
            version: version.as_str().to_string(),
            algorithm: version.algorithm().to_string(),
            iterations: self.config.iterations,
            salt,
            iv: nonce.as_bytes().to_vec(),
            ciphertext,
            exported_at: Utc::now(),
        })
    }
}

/// Opens bundles
pub struct KeyBundleImporter<P: CryptoProvider = RustCryptoProvider> {
    provider: P,
}

impl KeyBundleImporter<RustCryptoProvider> {
    pub fn new() -> Self {
        Self::with_provider(RustCryptoProvider)
    }
}

impl Default for KeyBundleImporter<RustCryptoProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: CryptoProvider> KeyBundleImporter<P> {
    pub fn with_provider(provider: P) -> Self {
        Self { provider }
    }

    /// Open a bundle into a [`KeyMap`]
    pub fn import(&self, bundle: &KeyBundle, password: &str) -> Result<KeyMap> {
        self.import_as(bundle, password)
    }

    /// Open a bundle given as JSON; version is checked before anything else
    pub fn import_json(&self, bundle: &Value, password: &str) -> Result<KeyMap> {
        let bundle = KeyBundle::from_value(bundle)?;
        self.import(&bundle, password)
    }

    /// Open a bundle into any deserializable key map
    ///
    /// A wrong password and a corrupted bundle both yield
    /// [`CryptoError::KeyPasswordIncorrect`].
    #[instrument(skip_all, fields(version = %bundle.version, iterations = bundle.iterations))]
    pub fn import_as<T: DeserializeOwned>(&self, bundle: &KeyBundle, password: &str) -> Result<T> {
        bundle.validate()?;

        let keys = self.open(bundle, password).map_err(|e| {
            tracing::trace!(error = %e, "key bundle rejected");
            CryptoError::KeyPasswordIncorrect
        })?;
        tracing::debug!("imported key bundle");
        Ok(keys)
    }

    fn open<T: DeserializeOwned>(&self, bundle: &KeyBundle, password: &str) -> Result<T> {
        let nonce = Nonce::from_bytes(&bundle.iv)?;
        let derived = self
            .provider
            .derive_key(password.as_bytes(), &bundle.salt, bundle.iterations)?;
        let plaintext = Zeroizing::new(self.provider.open(&derived, &nonce, &bundle.ciphertext)?);
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Seal `keys` under `password` with the default parameters
pub fn export_private_keys(keys: &KeyMap, password: &str) -> Result<KeyBundle> {
    KeyBundleExporter::default().export(keys, password)
}

/// Open a bundle sealed by [`export_private_keys`]
pub fn import_private_keys(bundle: &KeyBundle, password: &str) -> Result<KeyMap> {
    KeyBundleImporter::new().import(bundle, password)
}

/// Re-seal a bundle under a new password, with fresh salt and IV
pub fn change_bundle_password(
    bundle: &KeyBundle,
    old_password: &str,
    new_password: &str,
    config: BundleConfig,
) -> Result<KeyBundle> {
    let exporter = KeyBundleExporter::new(config);
    exporter.config.check_password(new_password)?;
    let keys = import_private_keys(bundle, old_password)?;
    exporter.export(&keys, new_password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PASSWORD: &str = "correct-password-123";

    fn fast() -> KeyBundleExporter {
        KeyBundleExporter::new(BundleConfig::default().with_iterations(1_000))
    }

    fn sample_keys() -> KeyMap {
        let mut record = KeyRecord::public_from_components(&[0xab; 256], &[1, 0, 1]);
        record.d = Some("ZA".to_string());
        record.p = Some("cA".to_string());
        record.q = Some("cQ".to_string());
        record.key_ops = Some(vec!["decrypt".to_string()]);
        KeyMap::from([("form-1".to_string(), record)])
    }

    #[test]
    fn test_version_table() {
        assert_eq!(BundleVersion::from_wire("1.0").unwrap(), BundleVersion::V1);
        assert_eq!(BundleVersion::CURRENT.algorithm(), "PBKDF2-AES-GCM-256");
        assert!(matches!(
            BundleVersion::from_wire("9.9"),
            Err(CryptoError::BundleVersion(_))
        ));
    }

    #[test]
    fn test_bundle_wire_shape() {
        let bundle = fast().export(&sample_keys(), PASSWORD).unwrap();
        let wire = serde_json::to_value(&bundle).unwrap();

        assert_eq!(wire["version"], "1.0");
        assert_eq!(wire["algorithm"], "PBKDF2-AES-GCM-256");
        assert_eq!(wire["iterations"], 1_000);
        assert!(wire["exportedAt"].is_string());
        assert_eq!(bundle.salt.len(), SALT_SIZE);
        assert_eq!(bundle.iv.len(), NONCE_SIZE);
    }

    #[test]
    fn test_default_iterations_recorded() {
        let bundle = export_private_keys(&sample_keys(), PASSWORD).unwrap();
        assert_eq!(bundle.iterations, DEFAULT_ITERATIONS);
        assert_eq!(import_private_keys(&bundle, PASSWORD).unwrap(), sample_keys());
    }

    #[test]
    fn test_weak_password_rejected() {
        let result = fast().export(&sample_keys(), "short");
        assert!(matches!(result, Err(CryptoError::WeakPassword { min_length: 8 })));
    }

    #[test]
    fn test_password_policy_counts_characters() {
        // eight characters, sixteen bytes
        assert!(BundleConfig::default().check_password("ééééééé").is_err());
        assert!(BundleConfig::default().check_password("éééééééé").is_ok());
    }

    #[test]
    fn test_arbitrary_serializable_map() {
        let keys = json!({"form-a": {"kty": "RSA", "n": "AQAB", "e": "AQAB"}, "meta": [1, 2]});
        let bundle = fast().export(&keys, PASSWORD).unwrap();
        let opened: Value = KeyBundleImporter::new().import_as(&bundle, PASSWORD).unwrap();
        assert_eq!(opened, keys);
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        let mut bundle = fast().export(&sample_keys(), PASSWORD).unwrap();
        bundle.algorithm = "PBKDF2-AES-CBC-256".to_string();
        assert!(matches!(
            import_private_keys(&bundle, PASSWORD),
            Err(CryptoError::InvalidBundle(_))
        ));
    }

    #[test]
    fn test_iteration_bounds_enforced() {
        let mut bundle = fast().export(&sample_keys(), PASSWORD).unwrap();
        bundle.iterations = 0;
        assert!(matches!(bundle.validate(), Err(CryptoError::InvalidBundle(_))));
        bundle.iterations = MAX_ITERATIONS + 1;
        assert!(matches!(bundle.validate(), Err(CryptoError::InvalidBundle(_))));
    }

    #[test]
    fn test_missing_version_rejected_from_json() {
        let bundle = fast().export(&sample_keys(), PASSWORD).unwrap();
        let mut wire = serde_json::to_value(&bundle).unwrap();
        wire.as_object_mut().unwrap().remove("version");
        assert!(matches!(
            KeyBundle::from_value(&wire),
            Err(CryptoError::BundleVersion(_))
        ));
    }

    #[test]
    fn test_change_password() {
        let bundle = fast().export(&sample_keys(), PASSWORD).unwrap();
        let config = BundleConfig::default().with_iterations(1_000);
        let rekeyed =
            change_bundle_password(&bundle, PASSWORD, "another-password-456", config).unwrap();

        assert_ne!(rekeyed.salt, bundle.salt);
        assert!(import_private_keys(&rekeyed, PASSWORD).is_err());
        assert_eq!(
            import_private_keys(&rekeyed, "another-password-456").unwrap(),
            sample_keys()
        );
    }
}
