//! # Veilform CLI
//!
//! Offline tools for form owners, built on `veilform-crypto`.
//!
//! This crate provides:
//! - **Keys**: generate a form's RSA-OAEP key pair
//! - **Submissions**: encrypt test submissions and decrypt stored ones
//! - **Backups**: seal private keys into password-protected bundles and open them again
//! - **Fingerprints**: per-form salts and salted field hashes
//!
//! Every command reads files or stdin and writes JSON to a file or stdout.
//! Logs go to stderr so output can be piped.

pub mod commands;
pub mod config;
pub mod error;

pub use config::CliConfig;
pub use error::{CliError, Result};
