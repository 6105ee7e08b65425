// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Layered configuration.
//!
//! File (`config.yaml`) + environment overrides, dotted keys mapped to
//! underscores (`s3.accesskey` -> `S3_ACCESSKEY`). Values are parsed once
//! into an immutable `AppConfig` at startup and passed by value into every
//! component's constructor — no global config object is read from inside
//! business logic.

use std::path::{Path, PathBuf};

use backup_domain::BackupError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ObjectStoreSection {
    pub url: String,
    pub port: u16,
    pub accesskey: String,
    pub secretkey: String,
    pub bucket: String,
    pub region: String,
    pub cacert: Option<String>,
    /// MiB; the adapter's default is the underlying SDK's own default.
    pub chunksize: Option<u64>,
    pub pathprefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ElasticSection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub cacert: Option<String>,
    pub batch_size: Option<usize>,
    pub file_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DbSection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub sslmode: Option<String>,
    pub cacert: Option<String>,
    pub clientcert: Option<String>,
    pub clientkey: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MongoSection {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub auth_source: Option<String>,
    pub replica_set: Option<String>,
    pub tls: bool,
    pub cacert: Option<String>,
    pub clientcert: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CryptSection {
    pub crypt4gh_public_key: Option<String>,
    pub crypt4gh_private_key: Option<String>,
    pub crypt4gh_passphrase: Option<String>,
    /// Path to a file holding a base64-encoded shared secret; selects the
    /// symmetric envelope instead of the hybrid one when the crypt4gh keys
    /// above are absent.
    pub sym_key_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub s3: ObjectStoreSection,
    #[serde(rename = "s3Source")]
    pub s3_source: Option<ObjectStoreSection>,
    #[serde(rename = "s3Destination")]
    pub s3_destination: Option<ObjectStoreSection>,
    pub elastic: ElasticSection,
    pub db: DbSection,
    pub mongo: MongoSection,
    #[serde(flatten)]
    pub crypt: CryptSection,
    pub loglevel: Option<String>,
}

/// Loads configuration from `config.yaml` (searched under `config_path`, or
/// read directly from `config_file` if given) plus environment overrides.
/// A missing file is not fatal — the original tool runs on ENVs alone.
pub fn load(config_path: Option<&Path>, config_file: Option<&Path>) -> Result<AppConfig, BackupError> {
    let mut builder = config::Config::builder();

    if let Some(file) = config_file {
        builder = builder.add_source(config::File::from(file));
    } else {
        let search_dir = config_path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        builder = builder.add_source(config::File::from(search_dir.join("config")).required(false));
    }

    builder = builder.add_source(
        config::Environment::default()
            .separator("_")
            .try_parsing(true),
    );

    let raw = builder
        .build()
        .map_err(|e| BackupError::ConfigInvalid(e.to_string()))?;

    raw.try_deserialize()
        .map_err(|e| BackupError::ConfigInvalid(e.to_string()))
}
