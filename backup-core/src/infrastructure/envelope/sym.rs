// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Symmetric stream cipher envelope, grounded on the original tool's
//! `sym.go` (`cipher.NewCFBEncrypter` / `cipher.NewCFBDecrypter`): a
//! random IV is written first, then every subsequent byte is XORed with
//! the CFB keystream. AES accepts any of its three legal key lengths, so
//! the concrete block cipher is chosen from the key length at `writer`/
//! `reader` construction time, matching Go's `aes.NewCipher` behavior.

use std::pin::Pin;
use std::task::{Context, Poll};

use aes::{Aes128, Aes192, Aes256};
use async_trait::async_trait;
use backup_domain::error::{BackupError, BackupResult};
use backup_domain::services::envelope::{EnvelopeReader, EnvelopeService, EnvelopeWriter};
use backup_domain::value_objects::SymKey;
use cfb_mode::cipher::generic_array::GenericArray;
use cfb_mode::cipher::{KeyIvInit, StreamCipher};
use cfb_mode::{Decryptor, Encryptor};
use futures::io::{AsyncRead, AsyncWrite};
use rand::RngCore;

const BLOCK_SIZE: usize = 16;

enum CfbEncryptor {
    Aes128(Box<Encryptor<Aes128>>),
    Aes192(Box<Encryptor<Aes192>>),
    Aes256(Box<Encryptor<Aes256>>),
}

enum CfbDecryptor {
    Aes128(Box<Decryptor<Aes128>>),
    Aes192(Box<Decryptor<Aes192>>),
    Aes256(Box<Decryptor<Aes256>>),
}

fn new_encryptor(key: &[u8], iv: &[u8; BLOCK_SIZE]) -> BackupResult<CfbEncryptor> {
    let iv = GenericArray::from_slice(iv);
    match key.len() {
        16 => Ok(CfbEncryptor::Aes128(Box::new(Encryptor::<Aes128>::new(GenericArray::from_slice(key), iv)))),
        24 => Ok(CfbEncryptor::Aes192(Box::new(Encryptor::<Aes192>::new(GenericArray::from_slice(key), iv)))),
        32 => Ok(CfbEncryptor::Aes256(Box::new(Encryptor::<Aes256>::new(GenericArray::from_slice(key), iv)))),
        other => Err(BackupError::EnvelopeFailed(format!("unsupported sym key length: {other} bytes"))),
    }
}

fn new_decryptor(key: &[u8], iv: &[u8; BLOCK_SIZE]) -> BackupResult<CfbDecryptor> {
    let iv = GenericArray::from_slice(iv);
    match key.len() {
        16 => Ok(CfbDecryptor::Aes128(Box::new(Decryptor::<Aes128>::new(GenericArray::from_slice(key), iv)))),
        24 => Ok(CfbDecryptor::Aes192(Box::new(Decryptor::<Aes192>::new(GenericArray::from_slice(key), iv)))),
        32 => Ok(CfbDecryptor::Aes256(Box::new(Decryptor::<Aes256>::new(GenericArray::from_slice(key), iv)))),
        other => Err(BackupError::EnvelopeFailed(format!("unsupported sym key length: {other} bytes"))),
    }
}

impl CfbEncryptor {
    fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            CfbEncryptor::Aes128(e) => e.apply_keystream(buf),
            CfbEncryptor::Aes192(e) => e.apply_keystream(buf),
            CfbEncryptor::Aes256(e) => e.apply_keystream(buf),
        }
    }
}

impl CfbDecryptor {
    fn apply_keystream(&mut self, buf: &mut [u8]) {
        match self {
            CfbDecryptor::Aes128(d) => d.apply_keystream(buf),
            CfbDecryptor::Aes192(d) => d.apply_keystream(buf),
            CfbDecryptor::Aes256(d) => d.apply_keystream(buf),
        }
    }
}

/// A symmetric envelope bound to one shared key; produces `SymWriter` and
/// `SymReader` instances per stream.
pub struct SymEnvelope {
    key: SymKey,
}

impl SymEnvelope {
    pub fn new(key: SymKey) -> Self {
        Self { key }
    }
}

pub struct SymWriter<W> {
    inner: W,
    key: Vec<u8>,
    iv: [u8; BLOCK_SIZE],
    iv_written: usize,
    cipher: Option<CfbEncryptor>,
}

impl<W> SymWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    fn new(inner: W, key: &SymKey) -> Self {
        let mut iv = [0u8; BLOCK_SIZE];
        rand::rng().fill_bytes(&mut iv);
        Self { inner, key: key.as_bytes().to_vec(), iv, iv_written: 0, cipher: None }
    }
}

impl<W> AsyncWrite for SymWriter<W>
where
    W: AsyncWrite + Send + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();

        while this.iv_written < BLOCK_SIZE {
            match Pin::new(&mut this.inner).poll_write(cx, &this.iv[this.iv_written..]) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "iv write failed")))
                }
                Poll::Ready(Ok(n)) => this.iv_written += n,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }

        if this.cipher.is_none() {
            this.cipher = Some(new_encryptor(&this.key, &this.iv).map_err(to_io_err)?);
        }

        let mut scratch = buf.to_vec();
        this.cipher.as_mut().unwrap().apply_keystream(&mut scratch);
        Pin::new(&mut this.inner).poll_write(cx, &scratch)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_close(cx)
    }
}

#[async_trait]
impl<W> EnvelopeWriter for SymWriter<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    async fn finish(self: Box<Self>) -> BackupResult<()> {
        Ok(())
    }
}

pub struct SymReader<R> {
    inner: R,
    key: Vec<u8>,
    iv: [u8; BLOCK_SIZE],
    iv_filled: usize,
    cipher: Option<CfbDecryptor>,
}

impl<R> SymReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    fn new(inner: R, key: &SymKey) -> Self {
        Self { inner, key: key.as_bytes().to_vec(), iv: [0u8; BLOCK_SIZE], iv_filled: 0, cipher: None }
    }
}

impl<R> AsyncRead for SymReader<R>
where
    R: AsyncRead + Send + Unpin,
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut [u8]) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();

        while this.iv_filled < BLOCK_SIZE {
            let mut tmp = [0u8; BLOCK_SIZE];
            let want = BLOCK_SIZE - this.iv_filled;
            match Pin::new(&mut this.inner).poll_read(cx, &mut tmp[..want]) {
                Poll::Ready(Ok(0)) => {
                    return Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream too short for iv")))
                }
                Poll::Ready(Ok(n)) => {
                    this.iv[this.iv_filled..this.iv_filled + n].copy_from_slice(&tmp[..n]);
                    this.iv_filled += n;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }

        if this.cipher.is_none() {
            this.cipher = Some(new_decryptor(&this.key, &this.iv).map_err(to_io_err)?);
        }

        match Pin::new(&mut this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(n)) => {
                this.cipher.as_mut().unwrap().apply_keystream(&mut buf[..n]);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }
}

impl<R> EnvelopeReader for SymReader<R> where R: AsyncRead + Send + Unpin + 'static {}

fn to_io_err(e: BackupError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

#[async_trait]
impl EnvelopeService for SymEnvelope {
    async fn writer(&self, inner: Box<dyn AsyncWrite + Send + Unpin>) -> BackupResult<Box<dyn EnvelopeWriter>> {
        Ok(Box::new(SymWriter::new(inner, &self.key)))
    }

    async fn reader(&self, inner: Box<dyn AsyncRead + Send + Unpin>) -> BackupResult<Box<dyn EnvelopeReader>> {
        Ok(Box::new(SymReader::new(inner, &self.key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::{AsyncReadExt, AsyncWriteExt, Cursor};

    fn key16() -> SymKey {
        SymKey::new(vec![7u8; 16])
    }

    #[tokio::test]
    async fn round_trips_and_ivs_differ_across_runs() {
        let plaintext = b"the five boxing wizards jump quickly".to_vec();
        let key = key16();

        let mut ciphertext_a = Vec::new();
        {
            let env = SymEnvelope::new(key.clone());
            let inner: Box<dyn AsyncWrite + Send + Unpin> = Box::new(Cursor::new(&mut ciphertext_a));
            let mut w = env.writer(inner).await.unwrap();
            w.write_all(&plaintext).await.unwrap();
            w.close().await.unwrap();
            w.finish().await.unwrap();
        }

        let mut ciphertext_b = Vec::new();
        {
            let env = SymEnvelope::new(key.clone());
            let inner: Box<dyn AsyncWrite + Send + Unpin> = Box::new(Cursor::new(&mut ciphertext_b));
            let mut w = env.writer(inner).await.unwrap();
            w.write_all(&plaintext).await.unwrap();
            w.close().await.unwrap();
            w.finish().await.unwrap();
        }

        assert_ne!(&ciphertext_a[..BLOCK_SIZE], &ciphertext_b[..BLOCK_SIZE], "IVs must be freshly random per stream");
        assert_eq!(ciphertext_a.len(), BLOCK_SIZE + plaintext.len());

        let env = SymEnvelope::new(key);
        let inner: Box<dyn AsyncRead + Send + Unpin> = Box::new(Cursor::new(ciphertext_a));
        let mut r = env.reader(inner).await.unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, plaintext);
    }

    use proptest::prelude::*;

    proptest! {
        /// Round trip holds and the ciphertext is always exactly
        /// `BLOCK_SIZE` bytes longer than the plaintext, for any key length
        /// AES-CFB accepts and any plaintext.
        #[test]
        fn round_trip_holds_for_arbitrary_plaintext(
            key_len in proptest::sample::select(vec![16usize, 24, 32]),
            plaintext in proptest::collection::vec(any::<u8>(), 0..512),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let key = SymKey::new(vec![3u8; key_len]);
                let env = SymEnvelope::new(key.clone());

                let mut ciphertext = Vec::new();
                {
                    let inner: Box<dyn AsyncWrite + Send + Unpin> = Box::new(Cursor::new(&mut ciphertext));
                    let mut w = env.writer(inner).await.unwrap();
                    w.write_all(&plaintext).await.unwrap();
                    w.close().await.unwrap();
                    w.finish().await.unwrap();
                }
                prop_assert_eq!(ciphertext.len(), BLOCK_SIZE + plaintext.len());

                let env = SymEnvelope::new(key);
                let inner: Box<dyn AsyncRead + Send + Unpin> = Box::new(Cursor::new(ciphertext));
                let mut r = env.reader(inner).await.unwrap();
                let mut out = Vec::new();
                r.read_to_end(&mut out).await.unwrap();
                prop_assert_eq!(out, plaintext);
                Ok(())
            });
            result?;
        }
    }
}
