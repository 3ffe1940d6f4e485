//! CLI configuration

use crate::error::{CliError, Result};
use veilform_crypto::bundle::{BundleConfig, DEFAULT_ITERATIONS, MIN_PASSWORD_LENGTH};

/// Settings shared by every `veilform` subcommand
#[derive(Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// PBKDF2 iterations for newly written bundles
    pub iterations: u32,
    /// Minimum bundle password length, in characters
    pub min_password_length: usize,
    /// Bundle password, usually from `VEILFORM_PASSWORD`
    pub password: Option<String>,
    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            min_password_length: MIN_PASSWORD_LENGTH,
            password: None,
            pretty: false,
        }
    }
}

impl CliConfig {
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    /// Bundle parameters for exports
    pub fn bundle_config(&self) -> BundleConfig {
        BundleConfig {
            iterations: self.iterations,
            min_password_length: self.min_password_length,
        }
    }

    /// The configured password, or an error telling the user how to set one
    pub fn password(&self) -> Result<&str> {
        self.password.as_deref().ok_or(CliError::MissingPassword)
    }
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("iterations", &self.iterations)
            .field("min_password_length", &self.min_password_length)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("pretty", &self.pretty)
            .finish()
    }
}
