// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! S3-compatible object store adapter, grounded on the original tool's
//! `newS3Backend` / `NewFileReader` / `NewFileWriter` (`s3.go`) and on
//! `deltaglider_proxy::storage::s3::S3Backend` for the `aws-sdk-s3`
//! wiring idiom.

use std::pin::Pin;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::object_store::{BoxedReader, ObjectListing, ObjectStoreService, PipelineWriter};
use backup_domain::value_objects::ObjectKey;
use futures::io::AsyncWrite;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio_util::compat::{TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

/// Used when `s3.chunksize` is not configured. S3 requires every part but
/// the last to be at least 5 MiB; this is comfortably above that floor.
const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Connection parameters for one logical S3-compatible endpoint; backup
/// and restore may use distinct endpoints for bucket mirroring
/// (`s3Source.*` / `s3Destination.*`).
#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub url: String,
    pub port: u16,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub cacert: Option<String>,
    /// Multipart chunk size in bytes; `None` uses the SDK's own default.
    pub chunk_size: Option<u64>,
    pub path_prefix: Option<String>,
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    path_prefix: Option<String>,
    chunk_size: usize,
}

impl S3ObjectStore {
    /// Establishes a session and idempotently ensures the bucket exists:
    /// `BucketAlreadyOwnedByYou` and `BucketAlreadyExists` are swallowed,
    /// any other creation failure is logged but non-fatal, and the
    /// subsequent `ListObjectsV2` probe must succeed or `open` fails with
    /// a connectivity error.
    pub async fn open(config: &ObjectStoreConfig) -> BackupResult<Self> {
        let endpoint = format!("{}:{}", config.url, config.port);
        let scheme_is_tls = config.url.starts_with("https:");

        let mut builder = aws_sdk_s3::config::Builder::new()
            .region(Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .force_path_style(true)
            .credentials_provider(Credentials::new(
                &config.access_key,
                &config.secret_key,
                None,
                None,
                "backup-tool-config",
            ));

        if scheme_is_tls {
            let http_client = build_tls_http_client(config.cacert.as_deref())?;
            builder = builder.http_client(http_client);
        }

        let client = Client::from_conf(builder.build());

        match client.create_bucket().bucket(&config.bucket).send().await {
            Ok(_) => {}
            Err(SdkError::ServiceError(service_err)) => match service_err.err() {
                CreateBucketError::BucketAlreadyOwnedByYou(_) => {}
                CreateBucketError::BucketAlreadyExists(_) => {}
                other => tracing::error!(error = %other, "unexpected issue while creating bucket"),
            },
            Err(e) => tracing::error!(error = %e, "unexpected issue while creating bucket"),
        }

        client
            .list_objects_v2()
            .bucket(&config.bucket)
            .send()
            .await
            .map_err(|e| BackupError::Connectivity(format!("probe list failed: {e}")))?;

        let chunk_size = config.chunk_size.map(|n| n as usize).unwrap_or(DEFAULT_CHUNK_SIZE);
        Ok(Self { client, bucket: config.bucket.clone(), path_prefix: config.path_prefix.clone(), chunk_size })
    }

    fn full_key(&self, key: &ObjectKey) -> String {
        match &self.path_prefix {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}{key}"),
            _ => key.to_string(),
        }
    }
}

/// rustls never negotiates below TLS 1.2, satisfying the "reject TLS < 1.2"
/// requirement by construction; a custom CA augments (not replaces) the
/// system trust store.
fn build_tls_http_client(cacert_path: Option<&str>) -> BackupResult<aws_smithy_runtime_api::client::http::SharedHttpClient> {
    use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
    use hyper_rustls::HttpsConnectorBuilder;
    use rustls::{Certificate, ClientConfig, RootCertStore};

    let mut roots = RootCertStore::empty();
    for cert in rustls_native_certs::load_native_certs()
        .map_err(|e| BackupError::Connectivity(format!("could not load system trust store: {e}")))?
    {
        let _ = roots.add(&Certificate(cert.0));
    }

    if let Some(path) = cacert_path {
        let pem = std::fs::read(path).map_err(|e| BackupError::ConfigInvalid(format!("could not read s3.cacert: {e}")))?;
        let der_certs = rustls_pemfile::certs(&mut pem.as_slice())
            .map_err(|e| BackupError::ConfigInvalid(format!("invalid s3.cacert PEM: {e}")))?;
        for der in der_certs {
            roots
                .add(&Certificate(der))
                .map_err(|e| BackupError::ConfigInvalid(format!("could not add s3.cacert to trust store: {e}")))?;
        }
    }

    let tls_config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let https = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build();

    Ok(HyperClientBuilder::new().build(https))
}

/// The write end of the pipe; bytes written here are forwarded to the
/// multipart uploader task. `finish` is the synchronization barrier: it
/// joins the uploader task and surfaces its error, if any.
pub struct S3PipelineWriter {
    sink: Pin<Box<dyn AsyncWrite + Send + Unpin>>,
    uploader: tokio::task::JoinHandle<BackupResult<()>>,
}

impl futures::io::AsyncWrite for S3PipelineWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>, buf: &[u8]) -> std::task::Poll<std::io::Result<usize>> {
        self.sink.as_mut().poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        self.sink.as_mut().poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> std::task::Poll<std::io::Result<()>> {
        self.sink.as_mut().poll_close(cx)
    }
}

#[async_trait]
impl PipelineWriter for S3PipelineWriter {
    async fn finish(self: Box<Self>) -> BackupResult<()> {
        drop(self.sink);
        self.uploader
            .await
            .map_err(|e| BackupError::UploadFailed(format!("uploader task panicked: {e}")))?
    }
}

#[async_trait]
impl ObjectStoreService for S3ObjectStore {
    async fn new_reader(&self, key: &ObjectKey) -> BackupResult<BoxedReader> {
        let out = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|e| classify_get_error(key, e))?;

        let reader = out.body.into_async_read().compat();
        Ok(Box::pin(reader))
    }

    async fn new_writer(&self, key: &ObjectKey) -> BackupResult<Box<dyn PipelineWriter>> {
        let (writer_half, reader_half): (DuplexStream, DuplexStream) = tokio::io::duplex(256 * 1024);
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let full_key = self.full_key(key);
        let chunk_size = self.chunk_size;

        let uploader = tokio::spawn(async move { upload_multipart(&client, &bucket, &full_key, reader_half, chunk_size).await });

        Ok(Box::new(S3PipelineWriter {
            sink: Box::pin(writer_half.compat_write()),
            uploader,
        }))
    }

    async fn list(&self, prefix: &str) -> BackupResult<Vec<ObjectListing>> {
        let full_prefix = match &self.path_prefix {
            Some(p) if !p.is_empty() => format!("{p}{prefix}"),
            _ => prefix.to_string(),
        };

        let out = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .send()
            .await
            .map_err(|e| BackupError::Connectivity(format!("list failed: {e}")))?;

        Ok(out
            .contents()
            .iter()
            .filter_map(|obj| {
                let key = obj.key()?.to_string();
                let key = self.path_prefix.as_deref().and_then(|p| key.strip_prefix(p)).unwrap_or(&key).to_string();
                Some(ObjectListing { key: ObjectKey::new(key), size: obj.size().unwrap_or(0).max(0) as u64 })
            })
            .collect())
    }
}

/// Drives one multipart upload to completion: `create_multipart_upload`,
/// `upload_part` in `chunk_size`-sized chunks read off `reader`, then
/// `complete_multipart_upload`. `LeavePartsOnError = false`: any failure
/// aborts the upload so no orphaned parts are billed.
async fn upload_multipart(client: &Client, bucket: &str, key: &str, reader: DuplexStream, chunk_size: usize) -> BackupResult<()> {
    let create = client
        .create_multipart_upload()
        .bucket(bucket)
        .key(key)
        .send()
        .await
        .map_err(|e| BackupError::UploadFailed(format!("create_multipart_upload({key}) failed: {e}")))?;

    let upload_id = create
        .upload_id()
        .ok_or_else(|| BackupError::UploadFailed(format!("create_multipart_upload({key}) returned no upload id")))?
        .to_string();

    match upload_parts(client, bucket, key, &upload_id, reader, chunk_size).await {
        Ok(parts) => client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BackupError::UploadFailed(format!("complete_multipart_upload({key}) failed: {e}"))),
        Err(e) => {
            let _ = client.abort_multipart_upload().bucket(bucket).key(key).upload_id(&upload_id).send().await;
            Err(e)
        }
    }
}

async fn upload_parts(
    client: &Client,
    bucket: &str,
    key: &str,
    upload_id: &str,
    mut reader: DuplexStream,
    chunk_size: usize,
) -> BackupResult<Vec<CompletedPart>> {
    let mut parts = Vec::new();
    let mut part_number: i32 = 1;

    loop {
        let mut buf = vec![0u8; chunk_size];
        let mut filled = 0;
        while filled < chunk_size {
            let n = reader
                .read(&mut buf[filled..])
                .await
                .map_err(|e| BackupError::UploadFailed(format!("reading upload body for {key} failed: {e}")))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 && part_number > 1 {
            break;
        }
        buf.truncate(filled);

        let out = client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(buf))
            .send()
            .await
            .map_err(|e| BackupError::UploadFailed(format!("upload_part({part_number}) of {key} failed: {e}")))?;

        parts.push(CompletedPart::builder().part_number(part_number).set_e_tag(out.e_tag().map(str::to_string)).build());

        let was_short = filled < chunk_size;
        part_number += 1;
        if was_short {
            break;
        }
    }

    Ok(parts)
}

fn classify_get_error(key: &ObjectKey, e: SdkError<aws_sdk_s3::operation::get_object::GetObjectError>) -> BackupError {
    use aws_sdk_s3::operation::get_object::GetObjectError;
    match &e {
        SdkError::ServiceError(se) if matches!(se.err(), GetObjectError::NoSuchKey(_)) => {
            BackupError::NotFound(key.to_string())
        }
        other => BackupError::Connectivity(format!("GetObject({key}) failed: {other}")),
    }
}
