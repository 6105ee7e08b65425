// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Process exit codes. Every surfaced `BackupError` maps to a non-zero
//! code; success is always zero.

use backup_domain::BackupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    ConfigError = 2,
    RuntimeError = 1,
}

impl ExitCode {
    pub fn from_error(err: &BackupError) -> Self {
        match err {
            BackupError::ConfigInvalid(_) => ExitCode::ConfigError,
            _ => ExitCode::RuntimeError,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}
