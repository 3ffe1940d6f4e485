//! Platform cryptography behind one capability trait
//!
//! The protocol modules never touch RSA, AES or PBKDF2 directly. They ask a
//! [`CryptoProvider`] to generate, import, export, wrap, seal, derive and
//! digest, the same shape a browser's WebCrypto offers. The default
//! [`RustCryptoProvider`] is backed by the RustCrypto crates and the OS RNG.
//!
//! Import adapters validate key records structurally before any numeric
//! parsing, so malformed records never reach the primitives.

use crate::{
    encoding,
    keygen::RsaKeyParams,
    keys::{DataKey, KeyRecord, KeyUsage, KEY_SIZE},
    symmetric::{Aead, Nonce},
    CryptoError, Result,
};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Size of a SHA-256 digest in bytes
pub const DIGEST_SIZE: usize = 32;

/// Smallest RSA modulus accepted on import or generation
pub const MIN_MODULUS_BITS: usize = 2048;

/// Capability interface over the platform's cryptographic engine
///
/// Implementations must hold no mutable state: every method may be called
/// concurrently from any thread.
pub trait CryptoProvider: Send + Sync {
    /// Imported RSA-OAEP public key, usable only to wrap
    type PublicKey: Send + Sync;
    /// Imported RSA-OAEP private key, usable only to unwrap
    type PrivateKey: Send + Sync;

    /// Generate an RSA-OAEP (SHA-256) key pair
    fn generate_key_pair(&self, params: &RsaKeyParams)
        -> Result<(Self::PublicKey, Self::PrivateKey)>;

    /// Import a public key record restricted to `encrypt`
    fn import_public_key(&self, record: &KeyRecord) -> Result<Self::PublicKey>;

    /// Import a private key record restricted to `decrypt`
    fn import_private_key(&self, record: &KeyRecord) -> Result<Self::PrivateKey>;

    /// Export a public key to its interoperable record
    fn export_public_key(&self, key: &Self::PublicKey) -> Result<KeyRecord>;

    /// Export a private key to its interoperable record
    fn export_private_key(&self, key: &Self::PrivateKey) -> Result<KeyRecord>;

    /// Wrap raw symmetric key bytes with RSA-OAEP
    fn wrap_key(&self, recipient: &Self::PublicKey, key: &DataKey) -> Result<Vec<u8>>;

    /// Unwrap RSA-OAEP wrapped bytes back into a symmetric key
    fn unwrap_key(&self, key: &Self::PrivateKey, wrapped: &[u8]) -> Result<DataKey>;

    /// Fill `buf` with cryptographically secure random bytes
    fn fill_random(&self, buf: &mut [u8]) -> Result<()>;

    /// AES-256-GCM encrypt
    fn seal(&self, key: &DataKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// AES-256-GCM decrypt; fails on tag mismatch
    fn open(&self, key: &DataKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>>;

    /// PBKDF2-HMAC-SHA256 to a 256-bit key
    fn derive_key(&self, password: &[u8], salt: &[u8], iterations: u32) -> Result<DataKey>;

    /// SHA-256
    fn digest(&self, data: &[u8]) -> [u8; DIGEST_SIZE];

    /// Generate a fresh one-time AES-256 key
    fn generate_data_key(&self) -> Result<DataKey> {
        let mut bytes = Zeroizing::new([0u8; KEY_SIZE]);
        self.fill_random(bytes.as_mut_slice())?;
        DataKey::from_bytes(bytes.as_slice())
    }

    /// Generate a fresh 96-bit nonce
    fn generate_nonce(&self) -> Result<Nonce> {
        let mut bytes = [0u8; crate::keys::NONCE_SIZE];
        self.fill_random(&mut bytes)?;
        Nonce::from_bytes(&bytes)
    }
}

/// [`CryptoProvider`] backed by RustCrypto and the operating system RNG
#[derive(Clone, Copy, Debug, Default)]
pub struct RustCryptoProvider;

impl RustCryptoProvider {
    pub fn new() -> Self {
        Self
    }
}

fn decode_uint(name: &str, value: &str) -> Result<BigUint> {
    let bytes = encoding::from_base64url(value)
        .map_err(|_| CryptoError::KeyFormat(format!("`{name}` is not base64url")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn required<'a>(name: &str, value: &'a Option<String>) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| CryptoError::KeyFormat(format!("private key is missing `{name}`")))
}

fn check_modulus(bits: usize) -> Result<()> {
    if bits < MIN_MODULUS_BITS {
        return Err(CryptoError::InvalidKey(format!(
            "modulus must be at least {MIN_MODULUS_BITS} bits, got {bits}"
        )));
    }
    Ok(())
}

impl CryptoProvider for RustCryptoProvider {
    type PublicKey = RsaPublicKey;
    type PrivateKey = RsaPrivateKey;

    fn generate_key_pair(&self, params: &RsaKeyParams) -> Result<(RsaPublicKey, RsaPrivateKey)> {
        check_modulus(params.modulus_bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let exponent = BigUint::from(params.public_exponent);
        let private = RsaPrivateKey::new_with_exp(&mut OsRng, params.modulus_bits, &exponent)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok((public, private))
    }

    fn import_public_key(&self, record: &KeyRecord) -> Result<RsaPublicKey> {
        record.validate_public()?;
        let n = decode_uint("n", &record.n)?;
        let e = decode_uint("e", &record.e)?;
        let key = RsaPublicKey::new(n, e).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        check_modulus(key.size() * 8)?;
        Ok(key)
    }

    fn import_private_key(&self, record: &KeyRecord) -> Result<RsaPrivateKey> {
        record.validate_private()?;
        let n = decode_uint("n", &record.n)?;
        let e = decode_uint("e", &record.e)?;
        let d = decode_uint("d", required("d", &record.d)?)?;
        let p = decode_uint("p", required("p", &record.p)?)?;
        let q = decode_uint("q", required("q", &record.q)?)?;

        let mut key = RsaPrivateKey::from_components(n, e, d, vec![p, q])
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        key.validate()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        key.precompute()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        check_modulus(key.size() * 8)?;
        Ok(key)
    }

    fn export_public_key(&self, key: &RsaPublicKey) -> Result<KeyRecord> {
        Ok(KeyRecord::public_from_components(
            &key.n().to_bytes_be(),
            &key.e().to_bytes_be(),
        ))
    }

    fn export_private_key(&self, key: &RsaPrivateKey) -> Result<KeyRecord> {
        let [p, q] = key.primes() else {
            return Err(CryptoError::InvalidKey(
                "only two-prime RSA keys can be exported".to_string(),
            ));
        };
        let (dp, dq) = match (key.dp(), key.dq()) {
            (Some(dp), Some(dq)) => (dp, dq),
            _ => {
                return Err(CryptoError::InvalidKey(
                    "private key has no CRT values".to_string(),
                ))
            }
        };
        let qi = key.crt_coefficient().ok_or_else(|| {
            CryptoError::InvalidKey("private key has no CRT coefficient".to_string())
        })?;

        let mut record =
            KeyRecord::public_from_components(&key.n().to_bytes_be(), &key.e().to_bytes_be());
        record.d = Some(encoding::to_base64url(&key.d().to_bytes_be()));
        record.p = Some(encoding::to_base64url(&p.to_bytes_be()));
        record.q = Some(encoding::to_base64url(&q.to_bytes_be()));
        record.dp = Some(encoding::to_base64url(&dp.to_bytes_be()));
        record.dq = Some(encoding::to_base64url(&dq.to_bytes_be()));
        record.qi = Some(encoding::to_base64url(&qi.to_bytes_be()));
        record.key_ops = Some(vec![KeyUsage::Decrypt.as_str().to_string()]);
        Ok(record)
    }

    fn wrap_key(&self, recipient: &RsaPublicKey, key: &DataKey) -> Result<Vec<u8>> {
        recipient
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    // rsa 0.9 private-key operations are not constant time (RUSTSEC-2023-0071,
    // Marvin). Exposing unwrap to remote callers who can time it needs a
    // provider without that side channel.
    fn unwrap_key(&self, key: &RsaPrivateKey, wrapped: &[u8]) -> Result<DataKey> {
        let raw = Zeroizing::new(
            key.decrypt(Oaep::new::<Sha256>(), wrapped)
                .map_err(|_| CryptoError::Decryption)?,
        );
        DataKey::from_bytes(&raw)
    }

    fn fill_random(&self, buf: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::KeyGeneration(format!("entropy source failed: {e}")))
    }

    fn seal(&self, key: &DataKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        Aead::new(key).encrypt(nonce, plaintext)
    }

    fn open(&self, key: &DataKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        Aead::new(key).decrypt(nonce, ciphertext)
    }

    fn derive_key(&self, password: &[u8], salt: &[u8], iterations: u32) -> Result<DataKey> {
        if iterations == 0 {
            return Err(CryptoError::InvalidKey(
                "PBKDF2 iteration count must be positive".to_string(),
            ));
        }
        let mut out = Zeroizing::new([0u8; KEY_SIZE]);
        pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, out.as_mut_slice());
        DataKey::from_bytes(out.as_slice())
    }

    fn digest(&self, data: &[u8]) -> [u8; DIGEST_SIZE] {
        Sha256::digest(data).into()
    }
}
