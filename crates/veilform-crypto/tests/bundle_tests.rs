use rstest::rstest;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use veilform_crypto::{
    bundle::{BundleConfig, KeyBundleExporter, KeyBundleImporter, KeyMap},
    generate_key_pair, import_private_keys,
    keygen::RsaKeyParams,
    keys::{DataKey, KeyRecord},
    symmetric::Nonce,
    CryptoError, CryptoProvider, KeyBundle, Result, RustCryptoProvider,
};

const PASSWORD: &str = "correct-password-123";

/// Wraps the default provider and counts the calls a bundle import could make
#[derive(Clone, Default)]
struct CountingProvider {
    inner: RustCryptoProvider,
    derive_calls: Arc<AtomicUsize>,
    open_calls: Arc<AtomicUsize>,
}

impl CountingProvider {
    fn crypto_calls(&self) -> usize {
        self.derive_calls.load(Ordering::SeqCst) + self.open_calls.load(Ordering::SeqCst)
    }
}

impl CryptoProvider for CountingProvider {
    type PublicKey = <RustCryptoProvider as CryptoProvider>::PublicKey;
    type PrivateKey = <RustCryptoProvider as CryptoProvider>::PrivateKey;

    fn generate_key_pair(
        &self,
        params: &RsaKeyParams,
    ) -> Result<(Self::PublicKey, Self::PrivateKey)> {
        self.inner.generate_key_pair(params)
    }

    fn import_public_key(&self, record: &KeyRecord) -> Result<Self::PublicKey> {
        self.inner.import_public_key(record)
    }

    fn import_private_key(&self, record: &KeyRecord) -> Result<Self::PrivateKey> {
        self.inner.import_private_key(record)
    }

    fn export_public_key(&self, key: &Self::PublicKey) -> Result<KeyRecord> {
        self.inner.export_public_key(key)
    }

    fn export_private_key(&self, key: &Self::PrivateKey) -> Result<KeyRecord> {
        self.inner.export_private_key(key)
    }

    fn wrap_key(&self, recipient: &Self::PublicKey, key: &DataKey) -> Result<Vec<u8>> {
        self.inner.wrap_key(recipient, key)
    }

    fn unwrap_key(&self, key: &Self::PrivateKey, wrapped: &[u8]) -> Result<DataKey> {
        self.inner.unwrap_key(key, wrapped)
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        self.inner.fill_random(buf)
    }

    fn seal(&self, key: &DataKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.inner.seal(key, nonce, plaintext)
    }

    fn open(&self, key: &DataKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.open(key, nonce, ciphertext)
    }

    fn derive_key(&self, password: &[u8], salt: &[u8], iterations: u32) -> Result<DataKey> {
        self.derive_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.derive_key(password, salt, iterations)
    }

    fn digest(&self, data: &[u8]) -> [u8; 32] {
        self.inner.digest(data)
    }
}

fn fast_exporter() -> KeyBundleExporter {
    KeyBundleExporter::new(BundleConfig::default().with_iterations(2_000))
}

static KEYS: LazyLock<KeyMap> = LazyLock::new(|| {
    let first = generate_key_pair().unwrap();
    let second = generate_key_pair().unwrap();
    KeyMap::from([
        ("form-contact".to_string(), first.private_key.clone()),
        ("form-signup".to_string(), second.private_key.clone()),
    ])
});

fn key_map() -> KeyMap {
    KEYS.clone()
}

#[test_log::test]
fn bundle_roundtrip() {
    let keys = key_map();
    let bundle = fast_exporter().export(&keys, PASSWORD).unwrap();
    let restored = import_private_keys(&bundle, PASSWORD).unwrap();
    assert_eq!(restored, keys);
}

#[test]
fn bundle_roundtrip_through_json_text() {
    let keys = key_map();
    let text = fast_exporter().export(&keys, PASSWORD).unwrap().to_json().unwrap();
    let bundle = KeyBundle::from_json(&text).unwrap();
    assert_eq!(import_private_keys(&bundle, PASSWORD).unwrap(), keys);
}

#[test]
fn restored_key_still_decrypts() {
    let pair = generate_key_pair().unwrap();
    let envelope =
        veilform_crypto::encrypt_submission(&json!({"q": "a"}), &pair.public_key).unwrap();

    let keys = KeyMap::from([("form-1".to_string(), pair.private_key.clone())]);
    let bundle = fast_exporter().export(&keys, PASSWORD).unwrap();
    let restored = import_private_keys(&bundle, PASSWORD).unwrap();

    let opened =
        veilform_crypto::decrypt_submission(&envelope.to_value().unwrap(), &restored["form-1"])
            .unwrap();
    assert_eq!(opened, json!({"q": "a"}));
}

#[test]
fn empty_key_map_roundtrip() {
    let bundle = fast_exporter().export(&KeyMap::new(), PASSWORD).unwrap();
    assert!(import_private_keys(&bundle, PASSWORD).unwrap().is_empty());
}

#[rstest]
#[case::wrong("wrong-password")]
#[case::case_changed("Correct-password-123")]
#[case::empty("")]
fn wrong_password_fails(#[case] password: &str) {
    let bundle = fast_exporter().export(&key_map(), PASSWORD).unwrap();
    let result = import_private_keys(&bundle, password);
    assert!(matches!(result, Err(CryptoError::KeyPasswordIncorrect)));
}

#[test]
fn corruption_and_wrong_password_are_indistinguishable() {
    let bundle = fast_exporter().export(&key_map(), PASSWORD).unwrap();
    let wrong = import_private_keys(&bundle, "wrong-password")
        .unwrap_err()
        .to_string();

    let mut corrupted = bundle.clone();
    corrupted.ciphertext[0] ^= 0x80;
    let corrupt = import_private_keys(&corrupted, PASSWORD)
        .unwrap_err()
        .to_string();

    assert_eq!(wrong, corrupt);
}

#[rstest]
#[case::four_bytes(4)]
#[case::empty(0)]
#[case::tag_minus_one(15)]
fn truncated_ciphertext_looks_like_a_wrong_password(#[case] len: usize) {
    let bundle = fast_exporter().export(&key_map(), PASSWORD).unwrap();
    let mut truncated = bundle.clone();
    truncated.ciphertext.truncate(len);

    let result = import_private_keys(&truncated, PASSWORD);
    assert!(matches!(result, Err(CryptoError::KeyPasswordIncorrect)));
}

#[test]
fn exports_are_not_deterministic() {
    let keys = key_map();
    let exporter = fast_exporter();
    let first = exporter.export(&keys, PASSWORD).unwrap();
    let second = exporter.export(&keys, PASSWORD).unwrap();

    assert_ne!(first.salt, second.salt);
    assert_ne!(first.iv, second.iv);
    assert_ne!(first.ciphertext, second.ciphertext);
}

#[test]
fn import_honors_recorded_iterations() {
    let keys = key_map();
    let bundle = KeyBundleExporter::new(BundleConfig::default().with_iterations(1_234))
        .export(&keys, PASSWORD)
        .unwrap();
    assert_eq!(bundle.iterations, 1_234);
    assert_eq!(import_private_keys(&bundle, PASSWORD).unwrap(), keys);

    let mut altered = bundle.clone();
    altered.iterations = 1_235;
    assert!(import_private_keys(&altered, PASSWORD).is_err());
}

#[test]
fn weak_password_is_rejected_on_export() {
    let result = fast_exporter().export(&key_map(), "1234567");
    assert!(matches!(result, Err(CryptoError::WeakPassword { .. })));
}

#[test]
fn unsupported_version_rejected_before_any_crypto() {
    let bundle = fast_exporter().export(&key_map(), PASSWORD).unwrap();
    let mut future = bundle.clone();
    future.version = "9.9".to_string();

    let provider = CountingProvider::default();
    let importer = KeyBundleImporter::with_provider(provider.clone());

    let result = importer.import(&future, PASSWORD);
    assert!(matches!(result, Err(CryptoError::BundleVersion(v)) if v == "9.9"));
    assert_eq!(provider.crypto_calls(), 0);

    // the same importer does reach the primitives for a supported version
    importer.import(&bundle, PASSWORD).unwrap();
    assert_eq!(provider.derive_calls.load(Ordering::SeqCst), 1);
    assert_eq!(provider.open_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn malformed_structure_rejected_before_any_crypto() {
    let bundle = fast_exporter().export(&key_map(), PASSWORD).unwrap();
    let provider = CountingProvider::default();
    let importer = KeyBundleImporter::with_provider(provider.clone());

    let mut short_salt = bundle.clone();
    short_salt.salt.truncate(16);
    assert!(matches!(
        importer.import(&short_salt, PASSWORD),
        Err(CryptoError::InvalidBundle(_))
    ));

    let mut short_iv = bundle.clone();
    short_iv.iv.truncate(8);
    assert!(matches!(
        importer.import(&short_iv, PASSWORD),
        Err(CryptoError::InvalidBundle(_))
    ));

    assert_eq!(provider.crypto_calls(), 0);
}

#[test]
fn missing_version_in_json_is_a_version_error() {
    let provider = CountingProvider::default();
    let importer = KeyBundleImporter::with_provider(provider.clone());
    let wire = json!({
        "algorithm": "PBKDF2-AES-GCM-256",
        "iterations": 100000,
        "salt": "AAAA",
        "iv": "AAAA",
        "ciphertext": "AAAA",
        "exportedAt": "2024-01-01T00:00:00Z"
    });

    let result = importer.import_json(&wire, PASSWORD);
    assert!(matches!(result, Err(CryptoError::BundleVersion(_))));
    assert_eq!(provider.crypto_calls(), 0);
}

#[test]
fn exporter_over_custom_provider() {
    let provider = CountingProvider::default();
    let exporter = KeyBundleExporter::with_provider(
        provider.clone(),
        BundleConfig::default().with_iterations(1_000),
    );
    let bundle = exporter.export(&KeyMap::new(), PASSWORD).unwrap();
    assert_eq!(provider.derive_calls.load(Ordering::SeqCst), 1);
    assert_eq!(bundle.iterations, 1_000);
}
