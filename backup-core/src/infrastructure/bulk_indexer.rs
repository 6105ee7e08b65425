// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Hand-rolled bulk indexer, grounded on the original tool's use of
//! `esutil.NewBulkIndexer` (`elastic.go`): single worker, a byte-size flush
//! threshold, and a flush interval, with a per-item success/failure
//! callback. There is no Rust equivalent of `esutil.BulkIndexer`, so this
//! is built directly on `tokio::sync::mpsc` plus the `IndexClusterClient`
//! port's `bulk_index`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backup_domain::error::BackupResult;
use backup_domain::services::index_cluster::{BulkItem, IndexClusterClient};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bytes of JSON source accumulated before a flush is forced early.
const FLUSH_BYTES: usize = 2048;
const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Counts of items the worker has observed succeed or fail, shared with
/// the caller so it can report a final tally once the indexer is closed.
#[derive(Default)]
pub struct BulkIndexerStats {
    pub successful: AtomicU64,
    pub failed: AtomicU64,
}

pub struct BulkIndexer {
    sender: mpsc::Sender<BulkItem>,
    worker: JoinHandle<()>,
    stats: Arc<BulkIndexerStats>,
}

impl BulkIndexer {
    pub fn start(client: Arc<dyn IndexClusterClient>) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        let stats = Arc::new(BulkIndexerStats::default());
        let worker = tokio::spawn(run_worker(client, receiver, stats.clone()));
        Self { sender, worker, stats }
    }

    /// Enqueues one document for indexing; backpressure is applied via the
    /// channel rather than buffering unboundedly in the caller.
    pub async fn add(&self, item: BulkItem) -> BackupResult<()> {
        let _ = self.sender.send(item).await;
        Ok(())
    }

    /// Closes the queue and waits for the worker to flush everything
    /// outstanding, mirroring `esutil.BulkIndexer.Close`.
    pub async fn close(self) -> (u64, u64) {
        drop(self.sender);
        let _ = self.worker.await;
        (self.stats.successful.load(Ordering::Relaxed), self.stats.failed.load(Ordering::Relaxed))
    }
}

async fn run_worker(client: Arc<dyn IndexClusterClient>, mut receiver: mpsc::Receiver<BulkItem>, stats: Arc<BulkIndexerStats>) {
    let mut batch: Vec<BulkItem> = Vec::new();
    let mut batch_bytes = 0usize;
    let mut interval = tokio::time::interval(FLUSH_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            item = receiver.recv() => {
                match item {
                    Some(item) => {
                        batch_bytes += item.source.to_string().len();
                        batch.push(item);
                        if batch_bytes >= FLUSH_BYTES {
                            flush(&client, &mut batch, &stats).await;
                            batch_bytes = 0;
                        }
                    }
                    None => {
                        flush(&client, &mut batch, &stats).await;
                        return;
                    }
                }
            }
            _ = interval.tick() => {
                if !batch.is_empty() {
                    flush(&client, &mut batch, &stats).await;
                    batch_bytes = 0;
                }
            }
        }
    }
}

async fn flush(client: &Arc<dyn IndexClusterClient>, batch: &mut Vec<BulkItem>, stats: &BulkIndexerStats) {
    if batch.is_empty() {
        return;
    }
    match client.bulk_index(batch).await {
        Ok(outcomes) => {
            for outcome in outcomes {
                if outcome.success {
                    stats.successful.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    if let Some(reason) = outcome.error {
                        tracing::error!(error = %reason, "bulk index item failed");
                    }
                }
            }
        }
        Err(e) => {
            stats.failed.fetch_add(batch.len() as u64, Ordering::Relaxed);
            tracing::error!(error = %e, batch_size = batch.len(), "bulk request failed outright");
        }
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use backup_domain::error::BackupResult as Res;
    use backup_domain::services::index_cluster::{BulkItemOutcome, ScrollPage};
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeCluster {
        received: Mutex<Vec<BulkItem>>,
    }

    #[async_trait]
    impl IndexClusterClient for FakeCluster {
        async fn resolve_indices(&self, _glob: &str) -> Res<Vec<String>> {
            Ok(vec![])
        }
        async fn refresh(&self, _index: &str) -> Res<()> {
            Ok(())
        }
        async fn open_scroll(&self, _index: &str, _page_size: usize) -> Res<ScrollPage> {
            Ok(ScrollPage { hits: json!([]), scroll_id: None })
        }
        async fn continue_scroll(&self, _scroll_id: &str) -> Res<ScrollPage> {
            Ok(ScrollPage { hits: json!([]), scroll_id: None })
        }
        async fn bulk_index(&self, items: &[BulkItem]) -> Res<Vec<BulkItemOutcome>> {
            self.received.lock().unwrap().extend_from_slice(items);
            Ok(items.iter().map(|_| BulkItemOutcome { success: true, error: None }).collect())
        }
    }

    #[tokio::test]
    async fn flushes_all_items_on_close() {
        let cluster = Arc::new(FakeCluster { received: Mutex::new(Vec::new()) });
        let indexer = BulkIndexer::start(cluster.clone());

        for i in 0..10 {
            indexer.add(BulkItem { index: "docs".into(), source: json!({ "_id": i }) }).await.unwrap();
        }

        let (successful, failed) = indexer.close().await;
        assert_eq!(successful, 10);
        assert_eq!(failed, 0);
        assert_eq!(cluster.received.lock().unwrap().len(), 10);
    }
}
