// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Shutdown signal handling.
//!
//! A signal sets a `CancellationToken`-style flag. The multi-item use cases
//! (index-cluster backup, bucket mirroring) check it between items and stop
//! early with `BackupError::Cancelled`; a signal received mid-item does not
//! abort that item's in-flight multipart upload — the object-store's own
//! abort-incomplete-multipart policy is expected to reap it.

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio_util_cancellation::CancellationToken;

pub mod tokio_util_cancellation {
    //! Minimal cancellation token, avoiding a dependency on `tokio-util`
    //! for a single `AtomicBool`-backed flag.
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct CancellationToken(Arc<AtomicBool>);

    impl CancellationToken {
        pub fn new() -> Self {
            Self(Arc::new(AtomicBool::new(false)))
        }

        pub fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }

        pub fn is_cancelled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }
}

/// Spawns a task that sets `token` once SIGTERM or SIGINT is received.
#[cfg(unix)]
pub fn install(token: CancellationToken) {
    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "could not install SIGTERM handler");
                return;
            }
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "could not install SIGINT handler");
                return;
            }
        };

        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = int.recv() => tracing::info!("received SIGINT"),
        }
        token.cancel();
    });
}

#[cfg(not(unix))]
pub fn install(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C");
            token.cancel();
        }
    });
}
