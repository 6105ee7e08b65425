// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Backup Core
//!
//! Infrastructure adapters, application use cases, and the CLI dispatcher
//! that together implement the backup/restore actions against the
//! `backup_domain` service ports.

pub mod application;
pub mod infrastructure;
pub mod presentation;
