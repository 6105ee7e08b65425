// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Concrete adapters implementing the `backup_domain::services` ports.

pub mod bulk_indexer;
pub mod compression;
pub mod document_store;
pub mod elastic;
pub mod envelope;
pub mod object_store;
pub mod relational;
