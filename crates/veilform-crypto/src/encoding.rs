//! Binary-to-text encoding
//!
//! Envelope and bundle fields are binary payloads carried in JSON, encoded
//! with the standard padded base64 alphabet. Key records use the unpadded
//! base64url alphabet, as JSON Web Keys do.

use crate::Result;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

/// Encode bytes as standard base64
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64
pub fn from_base64(s: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(s)?)
}

/// Encode bytes as unpadded base64url
pub fn to_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url
pub fn from_base64url(s: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(s)?)
}

/// Serde adapter for `Vec<u8>` fields carried as standard base64 strings
pub(crate) mod base64_vec_serde {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}
