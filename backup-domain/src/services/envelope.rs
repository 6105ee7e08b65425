// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain port for the envelope codec.
//!
//! `Envelope = { Sym, Hybrid }` is a sum type selected by configuration; the
//! pipeline assembly in `backup-core` never switches on which variant is in
//! use — it only ever sees `EnvelopeWriter`/`EnvelopeReader`.

use async_trait::async_trait;
use futures::io::{AsyncRead, AsyncWrite};

use crate::error::BackupResult;

#[async_trait]
pub trait EnvelopeWriter: AsyncWrite + Send + Unpin {
    /// Flushes any trailing framing (data block terminator, MAC, etc.) and
    /// consumes self. Must be called before the underlying writer is closed.
    async fn finish(self: Box<Self>) -> BackupResult<()>;
}

#[async_trait]
pub trait EnvelopeReader: AsyncRead + Send + Unpin {}

/// Seals a stream: wraps `inner` with an envelope writer bound to the given
/// recipients (symmetric key, or one-or-more public keys for Hybrid).
#[async_trait]
pub trait EnvelopeService: Send + Sync {
    async fn writer(&self, inner: Box<dyn AsyncWrite + Send + Unpin>) -> BackupResult<Box<dyn EnvelopeWriter>>;

    async fn reader(&self, inner: Box<dyn AsyncRead + Send + Unpin>) -> BackupResult<Box<dyn EnvelopeReader>>;
}
