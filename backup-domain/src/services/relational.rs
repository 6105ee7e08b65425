// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain port for the relational-database collaborator.
//!
//! This trait specifies only the I/O contract of the dumper/restorer/
//! base-backup/verifier tools, not their invocation as subprocesses: dump
//! produces bytes, restore consumes bytes, base backup produces a
//! directory that the core tars, and unpack consumes a tar file path.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::BackupResult;

#[async_trait]
pub trait RelationalClient: Send + Sync {
    /// Best-effort connectivity probe, ahead of the (expensive) dump
    /// subprocess spawn.
    async fn probe(&self) -> BackupResult<()>;

    /// Spawns the logical dumper (tar-format archive) and returns its
    /// captured stdout.
    async fn logical_dump(&self, database: &str) -> BackupResult<Vec<u8>>;

    /// Feeds `data` into the logical restorer's stdin.
    async fn logical_restore(&self, data: Vec<u8>) -> BackupResult<()>;

    /// Spawns the physical base backup tool into `output_dir`, then the
    /// verifier against that directory.
    async fn physical_base_backup(&self, output_dir: &Path) -> BackupResult<()>;

    /// Unpacks a tar file into a target directory via `tar -xvf`.
    async fn physical_unpack(&self, tar_path: &Path, target_dir: &Path) -> BackupResult<()>;
}

/// Where the physical base backup writes its working directory, relative
/// to the process's working directory — matches the original tool's fixed
/// `db-backup` / `/home/backup.tar` paths.
pub fn default_base_backup_dir() -> PathBuf {
    PathBuf::from("db-backup")
}
