// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Search-cluster adapter, grounded on the original tool's `elastic.go`
//! (`es.Indices.Refresh`, `es.Search(...WithScroll(60s))`, `es.Scroll`) and
//! rebuilt on the official `elasticsearch` crate instead of
//! `go-elasticsearch`.

use async_trait::async_trait;
use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::index_cluster::{BulkItem, BulkItemOutcome, IndexClusterClient, ScrollPage};
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::request::JsonBody;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::{IndicesGetParts, IndicesRefreshParts};
use elasticsearch::{BulkParts, Elasticsearch, ScrollParts, SearchParts};
use serde_json::{json, Value};
use url::Url;

pub struct ElasticConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub cacert: Option<String>,
}

pub struct ElasticIndexCluster {
    client: Elasticsearch,
}

impl ElasticIndexCluster {
    pub fn open(config: &ElasticConfig) -> BackupResult<Self> {
        let url = Url::parse(&format!("{}:{}", config.host, config.port))
            .map_err(|e| BackupError::ConfigInvalid(format!("invalid elastic.host/elastic.port: {e}")))?;
        let pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(pool);

        if !config.user.is_empty() {
            builder = builder.auth(Credentials::Basic(config.user.clone(), config.password.clone()));
        }
        if let Some(cacert) = &config.cacert {
            let pem = std::fs::read(cacert).map_err(|e| BackupError::ConfigInvalid(format!("could not read elastic.cacert: {e}")))?;
            let cert = elasticsearch::cert::Certificate::from_pem(&pem)
                .map_err(|e| BackupError::ConfigInvalid(format!("invalid elastic.cacert: {e}")))?;
            builder = builder.cert_validation(CertificateValidation::Full(cert));
        }

        let transport = builder.build().map_err(|e| BackupError::ConfigInvalid(format!("could not build elastic transport: {e}")))?;
        Ok(Self { client: Elasticsearch::new(transport) })
    }
}

fn hits_array(body: &Value) -> Value {
    body.pointer("/hits/hits").cloned().unwrap_or_else(|| json!([]))
}

const MAX_SCROLL_ATTEMPTS: u32 = 5;
const RETRYABLE_STATUSES: [u16; 4] = [429, 502, 503, 504];

async fn backoff_sleep(attempt: u32) {
    let millis = 100u64.saturating_mul(1u64 << attempt.min(10));
    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
}

#[async_trait]
impl IndexClusterClient for ElasticIndexCluster {
    async fn resolve_indices(&self, glob: &str) -> BackupResult<Vec<String>> {
        let response = self
            .client
            .indices()
            .get(IndicesGetParts::Index(&[glob]))
            .send()
            .await
            .map_err(|e| BackupError::Connectivity(format!("index catalogue lookup failed: {e}")))?;

        if !response.status_code().is_success() {
            return Err(BackupError::Connectivity(format!("index catalogue lookup returned {}", response.status_code())));
        }

        let body: Value = response.json().await.map_err(|e| BackupError::Connectivity(format!("could not parse catalogue response: {e}")))?;
        let names = body.as_object().map(|obj| obj.keys().cloned().collect()).unwrap_or_default();
        Ok(names)
    }

    async fn refresh(&self, index: &str) -> BackupResult<()> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| BackupError::Connectivity(format!("refresh of {index} failed: {e}")))?;

        if !response.status_code().is_success() {
            return Err(BackupError::Connectivity(format!("refresh of {index} returned {}", response.status_code())));
        }
        Ok(())
    }

    async fn open_scroll(&self, index: &str, page_size: usize) -> BackupResult<ScrollPage> {
        let mut last_status = 0u16;
        for attempt in 0..MAX_SCROLL_ATTEMPTS {
            let response = self
                .client
                .search(SearchParts::Index(&[index]))
                .scroll("60s")
                .size(page_size as i64)
                .sort(&["_doc"])
                .send()
                .await
                .map_err(|e| BackupError::ScrollFailed(format!("initial scroll search on {index} failed: {e}")))?;

            let status = response.status_code().as_u16();
            if response.status_code().is_success() {
                let body: Value = response.json().await.map_err(|e| BackupError::ScrollFailed(format!("could not parse scroll response: {e}")))?;
                return Ok(ScrollPage { hits: hits_array(&body), scroll_id: body.get("_scroll_id").and_then(Value::as_str).map(str::to_string) });
            }
            last_status = status;
            if !RETRYABLE_STATUSES.contains(&status) {
                break;
            }
            backoff_sleep(attempt).await;
        }
        Err(BackupError::ScrollFailed(format!("initial scroll search on {index} returned {last_status}")))
    }

    async fn continue_scroll(&self, scroll_id: &str) -> BackupResult<ScrollPage> {
        let mut last_status = 0u16;
        for attempt in 0..MAX_SCROLL_ATTEMPTS {
            let response = self
                .client
                .scroll(ScrollParts::None)
                .body(json!({ "scroll": "1m", "scroll_id": scroll_id }))
                .send()
                .await
                .map_err(|e| BackupError::ScrollFailed(format!("scroll continuation failed: {e}")))?;

            let status = response.status_code().as_u16();
            if response.status_code().is_success() {
                let body: Value = response.json().await.map_err(|e| BackupError::ScrollFailed(format!("could not parse scroll response: {e}")))?;
                return Ok(ScrollPage { hits: hits_array(&body), scroll_id: body.get("_scroll_id").and_then(Value::as_str).map(str::to_string) });
            }
            last_status = status;
            if !RETRYABLE_STATUSES.contains(&status) {
                break;
            }
            backoff_sleep(attempt).await;
        }
        Err(BackupError::ScrollFailed(format!("scroll continuation returned {last_status}")))
    }

    async fn bulk_index(&self, items: &[BulkItem]) -> BackupResult<Vec<BulkItemOutcome>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(items.len() * 2);
        for item in items {
            body.push(JsonBody::new(json!({ "index": { "_index": item.index } })));
            body.push(JsonBody::new(item.source.clone()));
        }

        let response = self
            .client
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| BackupError::Connectivity(format!("bulk request failed: {e}")))?;

        if !response.status_code().is_success() {
            let failure = format!("bulk request returned {}", response.status_code());
            return Ok(items.iter().map(|_| BulkItemOutcome { success: false, error: Some(failure.clone()) }).collect());
        }

        let body: Value = response.json().await.map_err(|e| BackupError::Connectivity(format!("could not parse bulk response: {e}")))?;
        let item_results = body.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

        Ok(items
            .iter()
            .enumerate()
            .map(|(i, _)| match item_results.get(i).and_then(|entry| entry.get("index")) {
                Some(result) => {
                    let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
                    if (200..300).contains(&status) {
                        BulkItemOutcome { success: true, error: None }
                    } else {
                        let reason = result.pointer("/error/reason").and_then(Value::as_str).unwrap_or("unknown bulk item error").to_string();
                        BulkItemOutcome { success: false, error: Some(reason) }
                    }
                }
                None => BulkItemOutcome { success: false, error: Some("malformed bulk response item".into()) },
            })
            .collect())
    }
}
