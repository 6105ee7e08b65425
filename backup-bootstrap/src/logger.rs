// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Logging initialization, driven by the `loglevel` config key.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `level` comes from the
/// `loglevel` config key; an unrecognized value falls back to `info` and a
/// warning is emitted, mirroring the original tool's fallback to its most
/// verbose level on a bad `loglevel` string.
pub fn init(level: Option<&str>) {
    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(l) = level {
        if EnvFilter::try_new(l).is_err() {
            tracing::warn!(requested = %l, "unrecognized log level, defaulting to info");
        }
    }
}
