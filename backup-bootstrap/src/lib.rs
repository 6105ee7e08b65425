// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Backup Bootstrap
//!
//! Sits outside the domain/application/infrastructure layers and owns:
//! CLI parsing, layered configuration loading, logger initialization,
//! signal handling, and process exit codes. `backup-core` depends on this
//! crate; nothing here depends on `backup-core`.

pub mod cli;
pub mod config;
pub mod exit_code;
pub mod logger;
pub mod signals;

pub use cli::Cli;
pub use config::AppConfig;
pub use exit_code::ExitCode;
pub use signals::tokio_util_cancellation::CancellationToken;
