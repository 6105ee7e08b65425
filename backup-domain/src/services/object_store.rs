// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain port for the object-store component.
//!
//! `ObjectStoreService` is the one infrastructure port the rest of the
//! system is built on: every other adapter opens its sealed streams through
//! it. Readers and writers are boxed trait objects over `futures::io`
//! primitives so the domain layer never has to name a concrete async
//! runtime.

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};
use std::pin::Pin;

use crate::error::BackupResult;
use crate::value_objects::ObjectKey;

/// One `(key, size)` pair as returned by `List`.
#[derive(Debug, Clone)]
pub struct ObjectListing {
    pub key: ObjectKey,
    pub size: u64,
}

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// The write end of a pipeline. Must be driven to EOF via `AsyncWrite`,
/// then `finish`ed — `finish` is the synchronization barrier:
/// it does not return until the background uploader has committed (or
/// failed) the multipart upload.
#[async_trait]
pub trait PipelineWriter: AsyncWrite + Send + Unpin {
    async fn finish(self: Box<Self>) -> BackupResult<()>;
}

#[async_trait]
pub trait ObjectStoreService: Send + Sync {
    /// Opens a streaming GET. Fails with `NotFound` or `Connectivity`.
    async fn new_reader(&self, key: &ObjectKey) -> BackupResult<BoxedReader>;

    /// Opens the write end of a multipart upload. The caller MUST await
    /// `PipelineWriter::finish` after closing the `AsyncWrite` half before
    /// treating the operation as complete.
    async fn new_writer(&self, key: &ObjectKey) -> BackupResult<Box<dyn PipelineWriter>>;

    /// Lists objects under `prefix`. A single page is sufficient; callers
    /// that need more cooperate with adapter-level pagination.
    async fn list(&self, prefix: &str) -> BackupResult<Vec<ObjectListing>>;
}
