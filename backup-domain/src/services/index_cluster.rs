// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain port for the search-cluster collaborator.
//!
//! This trait specifies only the operations the core consumes from the
//! wire client — catalogue resolution,
//! the scroll protocol, and a one-shot refresh — independent of which HTTP
//! client or JSON library backs the concrete adapter.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::BackupResult;

/// One page of scroll results: the raw `hits.hits` JSON array and the
/// scroll id to use for the next step, if any.
#[derive(Debug, Clone)]
pub struct ScrollPage {
    pub hits: Value,
    pub scroll_id: Option<String>,
}

/// One document queued for indexing by the restore-side bulk indexer.
#[derive(Debug, Clone)]
pub struct BulkItem {
    pub index: String,
    pub source: Value,
}

/// The per-item result of a bulk request, in request order.
#[derive(Debug, Clone)]
pub struct BulkItemOutcome {
    pub success: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait IndexClusterClient: Send + Sync {
    /// Resolves a glob against the catalogue. Empty result is the caller's
    /// responsibility to turn into `NoIndicesMatched`.
    async fn resolve_indices(&self, glob: &str) -> BackupResult<Vec<String>>;

    /// Makes recent writes searchable before a backup begins scrolling.
    async fn refresh(&self, index: &str) -> BackupResult<()>;

    /// Opens the first scroll window with the given page size and a
    /// 60-second TTL.
    async fn open_scroll(&self, index: &str, page_size: usize) -> BackupResult<ScrollPage>;

    /// Continues scrolling with a 1-minute TTL using the prior scroll id.
    async fn continue_scroll(&self, scroll_id: &str) -> BackupResult<ScrollPage>;

    /// Submits one flushed batch to the cluster's bulk API. The returned
    /// vector has one entry per input item, in order; a request-level
    /// failure (rather than a per-item one) fails every item in the batch.
    async fn bulk_index(&self, items: &[BulkItem]) -> BackupResult<Vec<BulkItemOutcome>>;
}
