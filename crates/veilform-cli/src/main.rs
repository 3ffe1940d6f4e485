//! Veilform - offline key management and decryption for form owners

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use veilform_cli::{commands, CliConfig};

#[derive(Parser, Debug)]
#[command(name = "veilform")]
#[command(about = "Zero-knowledge form submission keys, envelopes, and backups")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// PBKDF2 iterations for new key bundles
    #[arg(long, global = true, default_value_t = 100_000, env = "VEILFORM_PBKDF2_ITERATIONS")]
    iterations: u32,

    /// Key bundle password
    #[arg(long, global = true, env = "VEILFORM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "VEILFORM_DEBUG")]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key pair for a new form
    Keygen {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Encrypt a JSON submission
    Encrypt {
        /// Public key or key pair file
        #[arg(short = 'k', long)]
        public_key: PathBuf,
        /// Submission JSON (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Decrypt a stored submission payload
    Decrypt {
        /// Private key or key pair file
        #[arg(short = 'k', long)]
        private_key: PathBuf,
        /// Payload JSON (defaults to stdin)
        #[arg(short, long)]
        input: Option<PathBuf>,
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Reject payloads that are not encrypted envelopes
        #[arg(long)]
        strict: bool,
    },

    /// Seal a JSON map of private keys into a password-protected bundle
    ExportKeys {
        /// JSON object mapping names to private keys
        #[arg(short, long)]
        keys: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Open a key bundle
    ImportKeys {
        #[arg(short, long)]
        bundle: PathBuf,
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Also write the rebuilt public keys and thumbprints here
        #[arg(long)]
        public_out: Option<PathBuf>,
    },

    /// Re-seal a key bundle under a new password
    ChangePassword {
        #[arg(short, long)]
        bundle: PathBuf,
        /// New bundle password
        #[arg(long, env = "VEILFORM_NEW_PASSWORD", hide_env_values = true)]
        new_password: String,
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Fingerprint a field value under a form salt
    HashField {
        value: String,
        #[arg(short, long)]
        salt: String,
    },

    /// Generate a salt for a new form
    Salt,
}

fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Logs go to stderr; stdout carries command output
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("veilform_cli={log_level},veilform_crypto={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = CliConfig::default()
        .with_iterations(args.iterations)
        .with_pretty(args.pretty);
    if let Some(password) = args.password {
        config = config.with_password(password);
    }
    tracing::debug!(?config, "configuration loaded");

    match args.command {
        Command::Keygen { out } => {
            commands::keygen(out.as_deref(), &config)?;
        }
        Command::Encrypt {
            public_key,
            input,
            out,
        } => {
            commands::encrypt(&public_key, input.as_deref(), out.as_deref(), &config)?;
        }
        Command::Decrypt {
            private_key,
            input,
            out,
            strict,
        } => {
            commands::decrypt(
                &private_key,
                input.as_deref(),
                out.as_deref(),
                strict,
                &config,
            )?;
        }
        Command::ExportKeys { keys, out } => {
            commands::export_keys(&keys, out.as_deref(), &config)?;
        }
        Command::ImportKeys {
            bundle,
            out,
            public_out,
        } => {
            commands::import_keys(&bundle, out.as_deref(), public_out.as_deref(), &config)?;
        }
        Command::ChangePassword {
            bundle,
            new_password,
            out,
        } => {
            commands::change_password(&bundle, &new_password, out.as_deref(), &config)?;
        }
        Command::HashField { value, salt } => {
            commands::hash(&value, &salt)?;
        }
        Command::Salt => {
            commands::salt()?;
        }
    }

    Ok(())
}
