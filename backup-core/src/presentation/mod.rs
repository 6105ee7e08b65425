// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! CLI action dispatcher.
//!
//! Resolves the loaded `AppConfig` into concrete adapters for whichever
//! action was requested, then calls straight into the matching
//! `application` use case. Nothing here is itself a port — this module is
//! the one place allowed to know about `S3ObjectStore`, `PostgresClient`,
//! `MongoClient`, and `ElasticIndexCluster` all at once.

use std::sync::Arc;

use backup_bootstrap::config::{AppConfig, ObjectStoreSection};
use backup_bootstrap::{CancellationToken, Cli};
use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::document_store::DocumentStoreClient;
use backup_domain::services::envelope::EnvelopeService;
use backup_domain::services::index_cluster::IndexClusterClient;
use backup_domain::services::object_store::ObjectStoreService;
use backup_domain::services::relational::RelationalClient;
use backup_domain::value_objects::SslMode;
use backup_domain::BackupAction;

use crate::application;
use crate::infrastructure::document_store::{MongoClient, MongoConfig};
use crate::infrastructure::elastic::{ElasticConfig, ElasticIndexCluster};
use crate::infrastructure::envelope::{build_reader_envelope, build_writer_envelope};
use crate::infrastructure::object_store::{ObjectStoreConfig, S3ObjectStore};
use crate::infrastructure::relational::{PostgresClient, RelationalConfig};

fn object_store_config(section: &ObjectStoreSection) -> ObjectStoreConfig {
    ObjectStoreConfig {
        url: section.url.clone(),
        port: section.port,
        access_key: section.accesskey.clone(),
        secret_key: section.secretkey.clone(),
        bucket: section.bucket.clone(),
        region: section.region.clone(),
        cacert: section.cacert.clone(),
        chunk_size: section.chunksize,
        path_prefix: section.pathprefix.clone(),
    }
}

async fn open_primary_store(config: &AppConfig) -> BackupResult<S3ObjectStore> {
    S3ObjectStore::open(&object_store_config(&config.s3)).await
}

fn parse_ssl_mode(raw: &Option<String>) -> BackupResult<SslMode> {
    match raw {
        Some(s) => s.parse(),
        None => Ok(SslMode::Prefer),
    }
}

fn relational_client(config: &AppConfig) -> BackupResult<PostgresClient> {
    let relational = RelationalConfig {
        host: config.db.host.clone(),
        port: config.db.port,
        user: config.db.user.clone(),
        password: config.db.password.clone(),
        database: config.db.database.clone(),
        ssl_mode: parse_ssl_mode(&config.db.sslmode)?,
        cacert: config.db.cacert.clone(),
        clientcert: config.db.clientcert.clone(),
        clientkey: config.db.clientkey.clone(),
    };
    Ok(PostgresClient::new(relational))
}

fn document_store_client(config: &AppConfig) -> MongoClient {
    let mongo = MongoConfig {
        host: format!("{}:{}", config.mongo.host, config.mongo.port),
        user: config.mongo.user.clone(),
        password: config.mongo.password.clone(),
        replica_set: config.mongo.replica_set.clone(),
        tls: config.mongo.tls,
        cacert: config.mongo.cacert.clone(),
        clientcert: config.mongo.clientcert.clone(),
    };
    MongoClient::new(mongo)
}

fn index_cluster_client(config: &AppConfig) -> BackupResult<ElasticIndexCluster> {
    let elastic = ElasticConfig {
        host: config.elastic.host.clone(),
        port: config.elastic.port,
        user: config.elastic.user.clone(),
        password: config.elastic.password.clone(),
        cacert: config.elastic.cacert.clone(),
    };
    ElasticIndexCluster::open(&elastic)
}

fn require_name<'a>(cli: &'a Cli, what: &str) -> BackupResult<&'a str> {
    cli.name.as_deref().ok_or_else(|| BackupError::ConfigInvalid(format!("--name is required for {what}")))
}

/// Runs the action named by `cli.action`, building only the adapters that
/// action needs from `config`. `cancellation` is checked between the
/// iterations of the multi-item use cases (index-cluster backup, bucket
/// mirroring); the single-shot use cases run to completion once started,
/// matching the already-accepted one-in-flight-upload cancellation cost.
pub async fn dispatch(cli: &Cli, config: &AppConfig, cancellation: &CancellationToken) -> BackupResult<()> {
    match cli.action {
        BackupAction::EsBackup => {
            let store = open_primary_store(config).await?;
            let envelope = build_writer_envelope(&config.crypt)?;
            let cluster = index_cluster_client(config)?;
            let glob = require_name(cli, "es_backup")?;
            let batch_size = config.elastic.batch_size.unwrap_or(1000);
            let file_prefix = config.elastic.file_prefix.clone().unwrap_or_default();
            application::es_backup(&store, envelope.as_ref(), &cluster, glob, batch_size, &file_prefix, cancellation).await
        }
        BackupAction::EsRestore => {
            let store = open_primary_store(config).await?;
            let envelope = build_reader_envelope(&config.crypt)?;
            let cluster: Arc<dyn IndexClusterClient> = Arc::new(index_cluster_client(config)?);
            let archive_key = require_name(cli, "es_restore")?;
            application::es_restore(&store, envelope.as_ref(), cluster, archive_key).await
        }
        BackupAction::MongoDump => {
            let store = open_primary_store(config).await?;
            let envelope = build_writer_envelope(&config.crypt)?;
            let mongo = document_store_client(config);
            let database = require_name(cli, "mongo_dump")?;
            application::mongo_dump(&store, envelope.as_ref(), &mongo, database).await
        }
        BackupAction::MongoRestore => {
            let store = open_primary_store(config).await?;
            let envelope = build_reader_envelope(&config.crypt)?;
            let mongo = document_store_client(config);
            let archive_key = require_name(cli, "mongo_restore")?;
            application::mongo_restore(&store, envelope.as_ref(), &mongo, archive_key).await
        }
        BackupAction::PgDump => {
            let store = open_primary_store(config).await?;
            let envelope = build_writer_envelope(&config.crypt)?;
            let pg = relational_client(config)?;
            let database = require_name(cli, "pg_dump")?;
            application::pg_dump(&store, envelope.as_ref(), &pg, database).await
        }
        BackupAction::PgRestore => {
            let store = open_primary_store(config).await?;
            let envelope = build_reader_envelope(&config.crypt)?;
            let pg = relational_client(config)?;
            let archive_key = require_name(cli, "pg_restore")?;
            application::pg_restore(&store, envelope.as_ref(), &pg, archive_key).await
        }
        BackupAction::PgBaseBackup => {
            let store = open_primary_store(config).await?;
            let envelope = build_writer_envelope(&config.crypt)?;
            let pg = relational_client(config)?;
            let database = require_name(cli, "pg_basebackup")?;
            application::pg_basebackup(&store, envelope.as_ref(), &pg, database).await
        }
        BackupAction::PgDbUnpack => {
            let store = open_primary_store(config).await?;
            let envelope = build_reader_envelope(&config.crypt)?;
            let pg = relational_client(config)?;
            let archive_key = require_name(cli, "pg_db-unpack")?;
            application::pg_db_unpack(&store, envelope.as_ref(), &pg, archive_key).await
        }
        BackupAction::BackupBucket => {
            let source = open_primary_store(config).await?;
            let destination_section = config.s3_destination.as_ref().unwrap_or(&config.s3);
            let destination = S3ObjectStore::open(&object_store_config(destination_section)).await?;
            let envelope = build_writer_envelope(&config.crypt)?;
            let prefix = cli.name.as_deref().unwrap_or("");
            application::backup_bucket(&source, &destination, envelope.as_ref(), prefix, cancellation).await
        }
        BackupAction::RestoreBucket => {
            let source_section = config.s3_source.as_ref().unwrap_or(&config.s3);
            let source = S3ObjectStore::open(&object_store_config(source_section)).await?;
            let destination = open_primary_store(config).await?;
            let envelope = build_reader_envelope(&config.crypt)?;
            let prefix = cli.name.as_deref().unwrap_or("");
            application::restore_bucket(&source, &destination, envelope.as_ref(), prefix, cancellation).await
        }
        BackupAction::SyncBuckets => {
            let source_section = config.s3_source.as_ref().unwrap_or(&config.s3);
            let source = S3ObjectStore::open(&object_store_config(source_section)).await?;
            let destination_section = config.s3_destination.as_ref().unwrap_or(&config.s3);
            let destination = S3ObjectStore::open(&object_store_config(destination_section)).await?;
            let prefix = cli.name.as_deref().unwrap_or("");
            application::sync_buckets(&source, &destination, prefix, cancellation).await
        }
    }
}
