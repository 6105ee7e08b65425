// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Assembles the `compressor -> envelope -> object-store writer` (backup)
//! and `decompressor <- envelope <- object-store reader` (restore) chains
//! behind a single opaque stream, grounded on the original tool's pipeline
//! builder (`pipeline.go`'s `newCompressor(e)` wrapping `newEncryptor(...)`
//! wrapping the S3 file writer). Callers never see the envelope or
//! compression boundary; they drive one `AsyncWrite`/`AsyncRead` and call
//! `finish()`/drop to close it.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::envelope::EnvelopeService;
use backup_domain::services::object_store::{ObjectStoreService, PipelineWriter};
use backup_domain::value_objects::ObjectKey;
use futures::io::{AsyncRead, AsyncWrite};

use crate::infrastructure::compression::{CompressionReader, CompressionWriter};

/// Forwards `AsyncWrite` calls to the boxed object-store writer, leaving
/// ownership reachable afterwards (through the shared cell) so the pipeline
/// barrier can be awaited once the compressor/envelope layers above have
/// finished cascading their own trailers through `poll_close`.
struct WriterHandle(Arc<Mutex<Option<Box<dyn PipelineWriter>>>>);

impl AsyncWrite for WriterHandle {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        let mut guard = self.0.lock().expect("pipeline writer cell poisoned");
        let writer = guard.as_mut().expect("pipeline writer used after finish");
        Pin::new(writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let mut guard = self.0.lock().expect("pipeline writer cell poisoned");
        let writer = guard.as_mut().expect("pipeline writer used after finish");
        Pin::new(writer).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let mut guard = self.0.lock().expect("pipeline writer cell poisoned");
        let writer = guard.as_mut().expect("pipeline writer used after finish");
        Pin::new(writer).poll_close(cx)
    }
}

/// The backup-side sealed stream: write plaintext here, then `finish()`.
pub struct SealedWriter {
    compressor: CompressionWriter<Box<dyn backup_domain::services::envelope::EnvelopeWriter>>,
    store_writer: Arc<Mutex<Option<Box<dyn PipelineWriter>>>>,
}

impl AsyncWrite for SealedWriter {
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.compressor).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.compressor).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.compressor).poll_close(cx)
    }
}

impl SealedWriter {
    /// Closes in the documented order — compressor (flushes the trailing
    /// DEFLATE block and zlib checksum, which cascades into the envelope's
    /// own trailing framing via `poll_close`, which in turn closes the
    /// object-store writer's pipe) — then awaits the upload barrier.
    pub async fn finish(self) -> BackupResult<()> {
        self.compressor.finish().await?;
        let store_writer = self
            .store_writer
            .lock()
            .expect("pipeline writer cell poisoned")
            .take()
            .expect("store writer taken exactly once");
        store_writer.finish().await
    }
}

/// Opens a sealed write stream to `key`: `compressor -> envelope ->
/// object-store writer -> uploader -> object-store backend`.
pub async fn open_sealed_writer(
    store: &dyn ObjectStoreService,
    envelope: &dyn EnvelopeService,
    key: &ObjectKey,
) -> BackupResult<SealedWriter> {
    let store_writer = store.new_writer(key).await?;
    let cell = Arc::new(Mutex::new(Some(store_writer)));
    let handle: Box<dyn AsyncWrite + Send + Unpin> = Box::new(WriterHandle(cell.clone()));
    let envelope_writer = envelope.writer(handle).await?;
    let compressor = CompressionWriter::new(envelope_writer);
    Ok(SealedWriter { compressor, store_writer: cell })
}

/// The restore-side sealed stream: read plaintext from here.
pub struct SealedReader {
    decompressor: CompressionReader<Box<dyn backup_domain::services::envelope::EnvelopeReader>>,
}

impl AsyncRead for SealedReader {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.decompressor).poll_read(cx, buf)
    }
}

/// Opens a sealed read stream for `key`: `object-store reader -> envelope
/// -> decompressor`.
pub async fn open_sealed_reader(
    store: &dyn ObjectStoreService,
    envelope: &dyn EnvelopeService,
    key: &ObjectKey,
) -> BackupResult<SealedReader> {
    let store_reader = store.new_reader(key).await?;
    let inner: Box<dyn AsyncRead + Send + Unpin> = Pin::into_inner(store_reader);
    let envelope_reader = envelope.reader(inner).await?;
    Ok(SealedReader { decompressor: CompressionReader::new(envelope_reader) })
}

/// Reads `reader` to completion into an in-memory buffer, the documented
/// "restore currently buffers artifacts" simplification used by both the
/// index-cluster and relational logical-restore paths.
pub async fn read_to_end(mut reader: SealedReader) -> BackupResult<Vec<u8>> {
    use futures::io::AsyncReadExt;
    let mut out = Vec::new();
    reader.read_to_end(&mut out).await.map_err(|e| BackupError::Corruption(e.to_string()))?;
    Ok(out)
}
