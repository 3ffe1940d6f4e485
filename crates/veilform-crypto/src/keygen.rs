//! Form key pair generation
//!
//! Each form gets one RSA-OAEP key pair. The public half is embedded in the
//! form's public configuration; the private half never leaves the owner.

use crate::{
    keys::KeyPair,
    provider::{CryptoProvider, RustCryptoProvider},
    CryptoError, Result,
};
use chrono::Utc;
use tracing::instrument;

/// RSA key generation parameters
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RsaKeyParams {
    /// Modulus length in bits
    pub modulus_bits: usize,
    /// Public exponent
    pub public_exponent: u64,
}

impl Default for RsaKeyParams {
    fn default() -> Self {
        Self {
            modulus_bits: 2048,
            public_exponent: 65537,
        }
    }
}

/// Generates form key pairs through a [`CryptoProvider`]
pub struct KeyPairGenerator<P: CryptoProvider = RustCryptoProvider> {
    provider: P,
    params: RsaKeyParams,
}

impl KeyPairGenerator<RustCryptoProvider> {
    /// Create a generator with the default provider and parameters
    pub fn new() -> Self {
        Self::with_provider(RustCryptoProvider)
    }
}

impl Default for KeyPairGenerator<RustCryptoProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: CryptoProvider> KeyPairGenerator<P> {
    /// Create a generator over a specific provider
    pub fn with_provider(provider: P) -> Self {
        Self {
            provider,
            params: RsaKeyParams::default(),
        }
    }

    /// Override the RSA parameters
    pub fn with_params(mut self, params: RsaKeyParams) -> Self {
        self.params = params;
        self
    }

    /// Generate a key pair and export both halves as key records
    ///
    /// Any provider failure surfaces as [`CryptoError::KeyGeneration`].
    #[instrument(skip(self), fields(bits = self.params.modulus_bits))]
    pub fn generate(&self) -> Result<KeyPair> {
        let (public, private) = self.provider.generate_key_pair(&self.params)?;
        let public_key = self
            .provider
            .export_public_key(&public)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let private_key = self
            .provider
            .export_private_key(&private)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;

        let pair = KeyPair {
            public_key,
            private_key,
            created_at: Utc::now(),
        };
        tracing::debug!("generated form key pair");
        Ok(pair)
    }
}

/// Generate an RSA-OAEP 2048-bit key pair with the default provider
pub fn generate_key_pair() -> Result<KeyPair> {
    KeyPairGenerator::new().generate()
}
