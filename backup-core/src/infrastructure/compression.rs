// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Zlib compression stage of the pipeline, wrapping whichever stage comes
//! next (the envelope writer on backup, the pipeline reader on restore)
//! in an `AsyncWrite`/`AsyncRead` adapter, grounded on the original tool's
//! `compression.go` (`zlib.NewWriterLevel(w, zlib.BestCompression)` /
//! `zlib.NewReader`).

use std::pin::Pin;
use std::task::{Context, Poll};

use async_compression::tokio::bufread::ZlibDecoder as TokioZlibDecoder;
use async_compression::tokio::write::ZlibEncoder as TokioZlibEncoder;
use async_compression::Level;
use backup_domain::error::{BackupError, BackupResult};
use futures::io::{AsyncRead, AsyncWrite};
use tokio::io::{AsyncRead as TokioAsyncRead, AsyncWrite as TokioAsyncWrite, BufReader};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt, FuturesAsyncWriteCompatExt, TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

/// Wraps `inner` so that bytes written here are zlib-compressed at
/// maximum compression level before being forwarded downstream.
pub struct CompressionWriter<W> {
    encoder: TokioZlibEncoder<Compat<W>>,
}

impl<W> CompressionWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self { encoder: TokioZlibEncoder::with_quality(inner.compat_write(), Level::Best) }
    }

    /// Flushes the trailing DEFLATE block and the zlib checksum, then
    /// shuts the underlying writer down. Must be called before the
    /// downstream stage is itself finished.
    pub async fn finish(mut self) -> BackupResult<()> {
        use tokio::io::AsyncWriteExt;
        self.encoder.shutdown().await.map_err(|e| BackupError::Io(e.to_string()))
    }
}

impl<W> AsyncWrite for CompressionWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    fn poll_write(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.encoder).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.encoder).poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.encoder).poll_shutdown(cx)
    }
}

/// Wraps `inner` so that reads here yield the decompressed plaintext of
/// whatever zlib stream `inner` produces.
pub struct CompressionReader<R> {
    decoder: Compat<TokioZlibDecoder<BufReader<Compat<R>>>>,
}

impl<R> CompressionReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self { decoder: TokioZlibDecoder::new(BufReader::new(inner.compat())).compat() }
    }
}

impl<R> AsyncRead for CompressionReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.decoder).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn round_trips_arbitrary_bytes() {
        let plaintext = b"the quick brown fox jumps over the lazy dog".repeat(200);

        let mut compressed = Vec::new();
        {
            let mut w = CompressionWriter::new(futures::io::Cursor::new(&mut compressed));
            w.write_all(&plaintext).await.unwrap();
            w.finish().await.unwrap();
        }
        assert!(compressed.len() < plaintext.len());

        let mut r = CompressionReader::new(futures::io::Cursor::new(compressed));
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, plaintext);
    }
}
