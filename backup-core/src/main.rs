// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Process entry point: parse the CLI, load configuration, install
//! logging and signal handling, then dispatch to the requested action.

use backup_bootstrap::{cli, config, logger, signals, CancellationToken, ExitCode};
use backup_core::presentation::dispatch;

#[tokio::main]
async fn main() {
    let cli = cli::parse();
    let config = match config::load(cli.config_path.as_deref(), cli.config_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(ExitCode::from_error(&e).code());
        }
    };

    logger::init(config.loglevel.as_deref());

    let cancellation = CancellationToken::new();
    signals::install(cancellation.clone());

    tracing::info!(action = cli.action.as_str(), "starting");

    match dispatch(&cli, &config, &cancellation).await {
        Ok(()) => {
            tracing::info!(action = cli.action.as_str(), "completed");
            std::process::exit(ExitCode::Success.code());
        }
        Err(e) => {
            let exit_code = ExitCode::from_error(&e);
            let report = anyhow::Error::new(e).context(format!("action {:?} failed", cli.action.as_str()));
            tracing::error!(action = cli.action.as_str(), error = %report, "failed");
            std::process::exit(exit_code.code());
        }
    }
}
