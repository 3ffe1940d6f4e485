//! Subcommand implementations
//!
//! Each command reads its inputs from files or stdin, writes JSON to a file
//! or stdout, and returns the value it wrote so callers can inspect it.

use crate::{
    config::CliConfig,
    error::{CliError, Result},
};
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs,
    io::{self, Read, Write},
    path::Path,
};
use tracing::{debug, info, instrument};
use veilform_crypto::{
    bundle::{change_bundle_password, KeyBundleExporter, KeyBundleImporter, KeyMap},
    decrypt_submission, decrypt_submission_strict, encrypt_submission, generate_field_salt,
    generate_key_pair, hash_field, EncryptedEnvelope, KeyBundle, KeyPair, KeyRecord, KeyUsage,
};

/// Read a file, or stdin when no path is given
pub fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|source| CliError::File {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

/// Write to a file, or stdout when no path is given
pub fn write_output(path: Option<&Path>, contents: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, format!("{contents}\n")).map_err(|source| CliError::File {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{contents}")?;
            Ok(())
        }
    }
}

fn render<T: Serialize + ?Sized>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

/// Load a key for `usage` from a key file
///
/// The file may hold a bare key record or a full key pair as written by
/// [`keygen`]. Encrypting with a private record uses its public half.
pub fn load_key(path: &Path, usage: KeyUsage) -> Result<KeyRecord> {
    let mut value: Value = serde_json::from_str(&read_input(Some(path))?)?;

    let field = match usage {
        KeyUsage::Encrypt => "publicKey",
        KeyUsage::Decrypt => "privateKey",
    };
    if let Some(half) = value.get_mut(field).map(Value::take) {
        value = half;
    }

    let record: KeyRecord = serde_json::from_value(value)?;
    match usage {
        KeyUsage::Encrypt if record.is_private() => Ok(record.to_public()),
        KeyUsage::Encrypt => Ok(record),
        KeyUsage::Decrypt if record.is_private() => Ok(record),
        KeyUsage::Decrypt => Err(CliError::InvalidKeyFile(format!(
            "{} does not contain a private key",
            path.display()
        ))),
    }
}

/// Generate a key pair for a new form
#[instrument(skip(config))]
pub fn keygen(out: Option<&Path>, config: &CliConfig) -> Result<KeyPair> {
    let pair = generate_key_pair()?;
    info!(thumbprint = %pair.thumbprint()?, "generated key pair");
    write_output(out, &render(&pair, config.pretty)?)?;
    Ok(pair)
}

/// Encrypt a JSON submission for a form's public key
#[instrument(skip(config))]
pub fn encrypt(
    public_key: &Path,
    input: Option<&Path>,
    out: Option<&Path>,
    config: &CliConfig,
) -> Result<EncryptedEnvelope> {
    let key = load_key(public_key, KeyUsage::Encrypt)?;
    let submission: Value = serde_json::from_str(&read_input(input)?)?;
    let envelope = encrypt_submission(&submission, &key)?;
    debug!(ciphertext_len = envelope.data.len(), "submission encrypted");
    write_output(out, &render(&envelope, config.pretty)?)?;
    Ok(envelope)
}

/// Decrypt a stored payload with a form's private key
///
/// Payloads not marked as encrypted are written back unchanged unless
/// `strict` is set.
#[instrument(skip(config))]
pub fn decrypt(
    private_key: &Path,
    input: Option<&Path>,
    out: Option<&Path>,
    strict: bool,
    config: &CliConfig,
) -> Result<Value> {
    let key = load_key(private_key, KeyUsage::Decrypt)?;
    let payload: Value = serde_json::from_str(&read_input(input)?)?;
    let opened = if strict {
        decrypt_submission_strict(&payload, &key)?
    } else {
        decrypt_submission(&payload, &key)?
    };
    write_output(out, &render(&opened, config.pretty)?)?;
    Ok(opened)
}

/// Seal a JSON map of private keys into a password-protected bundle
#[instrument(skip(config))]
pub fn export_keys(keys: &Path, out: Option<&Path>, config: &CliConfig) -> Result<KeyBundle> {
    let password = config.password()?;
    let keys: KeyMap = serde_json::from_str(&read_input(Some(keys))?)?;
    let bundle = KeyBundleExporter::new(config.bundle_config()).export(&keys, password)?;
    info!(
        keys = keys.len(),
        iterations = bundle.iterations,
        "exported key bundle"
    );
    write_output(out, &render(&bundle, config.pretty)?)?;
    Ok(bundle)
}

/// Open a key bundle and write the private keys it holds
///
/// Every restored key is checked by rebuilding its pair. With `public_out`,
/// the public halves are written there keyed by name, each with its
/// thumbprint, ready to publish again.
#[instrument(skip(config))]
pub fn import_keys(
    bundle: &Path,
    out: Option<&Path>,
    public_out: Option<&Path>,
    config: &CliConfig,
) -> Result<KeyMap> {
    let password = config.password()?;
    let bundle = KeyBundle::from_json(&read_input(Some(bundle))?)?;
    let keys = KeyBundleImporter::new().import(&bundle, password)?;

    let mut public = BTreeMap::new();
    for (name, record) in &keys {
        let pair = KeyPair::from_private_record(record.clone())?;
        let thumbprint = pair.thumbprint()?;
        debug!(form = %name, %thumbprint, "restored private key");
        public.insert(
            name.clone(),
            RestoredPublicKey {
                thumbprint,
                public_key: pair.public_key.clone(),
            },
        );
    }
    info!(keys = keys.len(), "imported key bundle");

    write_output(out, &render(&keys, config.pretty)?)?;
    if let Some(path) = public_out {
        write_output(Some(path), &render(&public, config.pretty)?)?;
    }
    Ok(keys)
}

/// Public half of a key restored from a bundle
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredPublicKey {
    pub thumbprint: String,
    pub public_key: KeyRecord,
}

/// Re-seal a bundle under a new password
#[instrument(skip(config, new_password))]
pub fn change_password(
    bundle: &Path,
    new_password: &str,
    out: Option<&Path>,
    config: &CliConfig,
) -> Result<KeyBundle> {
    let old_password = config.password()?;
    let bundle = KeyBundle::from_json(&read_input(Some(bundle))?)?;
    let resealed =
        change_bundle_password(&bundle, old_password, new_password, config.bundle_config())?;
    info!(iterations = resealed.iterations, "bundle password changed");
    write_output(out, &render(&resealed, config.pretty)?)?;
    Ok(resealed)
}

/// Fingerprint a field value under a form's salt
pub fn hash(value: &str, salt: &str) -> Result<String> {
    let fingerprint = hash_field(value, salt);
    write_output(None, &fingerprint)?;
    Ok(fingerprint)
}

/// Generate a salt for a new form
pub fn salt() -> Result<String> {
    let salt = generate_field_salt()?;
    write_output(None, &salt)?;
    Ok(salt)
}
