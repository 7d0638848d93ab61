//! Network-facing protocol layer for the metadata replication fabric:
//! push replication (components E/F), fetch replication (components G/H),
//! and the cross-cluster query engine (component I). All mutation logic
//! still lives in `meta-core`; every handler here decodes/encodes the wire
//! contract and calls into a `meta_core::store::ResourceStore`.

pub mod error;
pub mod fetch;
pub mod push;
pub mod query;

pub use error::{NetError, NetResult};
