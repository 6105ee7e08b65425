// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

use std::str::FromStr;

use crate::error::BackupError;

/// The ten operator actions exposed on the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAction {
    EsBackup,
    EsRestore,
    MongoDump,
    MongoRestore,
    PgDump,
    PgRestore,
    PgBaseBackup,
    PgDbUnpack,
    BackupBucket,
    RestoreBucket,
    SyncBuckets,
}

impl FromStr for BackupAction {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "es_backup" => Ok(Self::EsBackup),
            "es_restore" => Ok(Self::EsRestore),
            "mongo_dump" => Ok(Self::MongoDump),
            "mongo_restore" => Ok(Self::MongoRestore),
            "pg_dump" => Ok(Self::PgDump),
            "pg_restore" => Ok(Self::PgRestore),
            "pg_basebackup" => Ok(Self::PgBaseBackup),
            "pg_db-unpack" => Ok(Self::PgDbUnpack),
            "backup_bucket" => Ok(Self::BackupBucket),
            "restore_bucket" => Ok(Self::RestoreBucket),
            "sync_buckets" => Ok(Self::SyncBuckets),
            other => Err(BackupError::ConfigInvalid(format!("unknown action: {other:?}"))),
        }
    }
}

impl BackupAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EsBackup => "es_backup",
            Self::EsRestore => "es_restore",
            Self::MongoDump => "mongo_dump",
            Self::MongoRestore => "mongo_restore",
            Self::PgDump => "pg_dump",
            Self::PgRestore => "pg_restore",
            Self::PgBaseBackup => "pg_basebackup",
            Self::PgDbUnpack => "pg_db-unpack",
            Self::BackupBucket => "backup_bucket",
            Self::RestoreBucket => "restore_bucket",
            Self::SyncBuckets => "sync_buckets",
        }
    }
}
