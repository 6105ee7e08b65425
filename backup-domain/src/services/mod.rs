// /////////////////////////////////////////////////////////////////////////////
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

pub mod document_store;
pub mod envelope;
pub mod index_cluster;
pub mod object_store;
pub mod relational;

pub use document_store::DocumentStoreClient;
pub use envelope::{EnvelopeReader, EnvelopeService, EnvelopeWriter};
pub use index_cluster::{BulkItem, BulkItemOutcome, IndexClusterClient, ScrollPage};
pub use object_store::{BoxedReader, ObjectListing, ObjectStoreService, PipelineWriter};
pub use relational::RelationalClient;
