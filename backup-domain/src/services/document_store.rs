// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain port for the document-store collaborator.

use async_trait::async_trait;

use crate::error::BackupResult;

#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// Runs the dump subprocess and returns its captured stdout (the
    /// archive-format bytes).
    async fn dump(&self, database: &str) -> BackupResult<Vec<u8>>;

    /// Feeds `data` into the restore subprocess's stdin.
    async fn restore(&self, data: Vec<u8>) -> BackupResult<()>;
}
