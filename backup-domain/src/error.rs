// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Domain error taxonomy for the backup/restore pipeline.
//!
//! One variant per row of the error taxonomy: configuration, connectivity,
//! authentication, missing objects, scroll failures, envelope failures,
//! upload failures, subprocess failures, and corruption. Infrastructure
//! adapters convert their own error types into this enum at the boundary;
//! the domain and application layers only ever see `BackupError`.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BackupError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("connectivity failure: {0}")]
    Connectivity(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("no indices matched glob {0:?}")]
    NoIndicesMatched(String),

    #[error("scroll failed: {0}")]
    ScrollFailed(String),

    #[error("envelope operation failed: {0}")]
    EnvelopeFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("subprocess failed (exit {exit_code:?}): {stderr}")]
    SubprocessFailed { exit_code: Option<i32>, stderr: String },

    #[error("data corruption detected: {0}")]
    Corruption(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("operation cancelled by signal")]
    Cancelled,
}

impl From<std::io::Error> for BackupError {
    fn from(e: std::io::Error) -> Self {
        BackupError::Io(e.to_string())
    }
}

pub type BackupResult<T> = Result<T, BackupError>;
