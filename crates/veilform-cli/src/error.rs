//! Error types for the CLI

use std::path::PathBuf;
use thiserror::Error;
use veilform_crypto::CryptoError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("failed to access {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid key file: {0}")]
    InvalidKeyFile(String),

    #[error("a password is required: pass --password or set VEILFORM_PASSWORD")]
    MissingPassword,
}

pub type Result<T> = std::result::Result<T, CliError>;
