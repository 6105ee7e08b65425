// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Selects and constructs the configured envelope implementation.
//!
//! `Envelope = { Sym, Hybrid }` is a sum type picked by which key material
//! is present in configuration; once built, the rest of the pipeline only
//! ever sees `EnvelopeService`/`EnvelopeWriter`/`EnvelopeReader`.

pub mod hybrid;
pub mod sym;

use std::sync::Arc;

use backup_bootstrap::config::CryptSection;
use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::envelope::EnvelopeService;
use backup_domain::value_objects::{IdentityKey, RecipientKey, SymKey};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub use hybrid::HybridEnvelope;
pub use sym::SymEnvelope;

fn load_sym_key(path: &str) -> BackupResult<SymKey> {
    let encoded = std::fs::read_to_string(path).map_err(|e| BackupError::ConfigInvalid(format!("could not read sym key file {path}: {e}")))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BackupError::ConfigInvalid(format!("sym key file {path} is not valid base64: {e}")))?;
    Ok(SymKey::new(bytes))
}

fn load_recipient_key(path: &str) -> BackupResult<RecipientKey> {
    let encoded = std::fs::read_to_string(path).map_err(|e| BackupError::ConfigInvalid(format!("could not read public key file {path}: {e}")))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BackupError::ConfigInvalid(format!("public key file {path} is not valid base64: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| BackupError::ConfigInvalid(format!("public key file {path} is not 32 bytes")))?;
    Ok(RecipientKey::new(array))
}

fn load_identity_key(path: &str) -> BackupResult<IdentityKey> {
    let encoded = std::fs::read_to_string(path).map_err(|e| BackupError::ConfigInvalid(format!("could not read private key file {path}: {e}")))?;
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| BackupError::ConfigInvalid(format!("private key file {path} is not valid base64: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| BackupError::ConfigInvalid(format!("private key file {path} is not 32 bytes")))?;
    Ok(IdentityKey::new(array))
}

/// Builds the write-side envelope: hybrid if a recipient public key is
/// configured, symmetric otherwise.
pub fn build_writer_envelope(crypt: &CryptSection) -> BackupResult<Arc<dyn EnvelopeService>> {
    if let Some(path) = &crypt.crypt4gh_public_key {
        let recipient = load_recipient_key(path)?;
        return Ok(Arc::new(HybridEnvelope::for_writer(vec![recipient])));
    }
    if let Some(path) = &crypt.sym_key_file {
        return Ok(Arc::new(SymEnvelope::new(load_sym_key(path)?)));
    }
    Err(BackupError::ConfigInvalid(
        "no envelope key material configured: set crypt4ghPublicKey or symKeyFile".into(),
    ))
}

/// Builds the read-side envelope: hybrid if an identity private key is
/// configured, symmetric otherwise. `crypt4ghPassphrase` is accepted in
/// configuration but passphrase-protected private key files are not
/// supported by this loader — see `DESIGN.md`.
pub fn build_reader_envelope(crypt: &CryptSection) -> BackupResult<Arc<dyn EnvelopeService>> {
    if let Some(path) = &crypt.crypt4gh_private_key {
        let identity = load_identity_key(path)?;
        return Ok(Arc::new(HybridEnvelope::for_reader(identity)));
    }
    if let Some(path) = &crypt.sym_key_file {
        return Ok(Arc::new(SymEnvelope::new(load_sym_key(path)?)));
    }
    Err(BackupError::ConfigInvalid(
        "no envelope key material configured: set crypt4ghPrivateKey or symKeyFile".into(),
    ))
}
