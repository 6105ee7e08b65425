// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Command-line surface.
//!
//! One positional action (`es_backup`, `es_restore`, …), a `--name` flag
//! that doubles as the archive key or the index glob depending on the
//! action, and the usual config overrides. Deliberately flatter than a
//! clap subcommand tree: the original tool models `action` as a single
//! string flag, and the operators scripting around it expect that shape.

use std::path::PathBuf;

use backup_domain::BackupAction;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "backup-tool", version, about = "Backup and restore a search cluster, document store, relational database, and object-storage buckets.")]
pub struct Cli {
    /// Action to perform.
    #[arg(value_parser = parse_action)]
    pub action: BackupAction,

    /// Archive key, index glob, or database name, depending on `action`.
    #[arg(long)]
    pub name: Option<String>,

    /// Path to a directory to search for `config.yaml`.
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Explicit path to a configuration file, overriding `--config-path`.
    #[arg(long)]
    pub config_file: Option<PathBuf>,
}

fn parse_action(raw: &str) -> Result<BackupAction, String> {
    raw.parse().map_err(|e: backup_domain::BackupError| e.to_string())
}

pub fn parse() -> Cli {
    Cli::parse()
}
