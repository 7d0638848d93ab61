//! Core in-memory model for the metadata replication fabric: the
//! resource/event types (component A), typed indexed stores (component B),
//! the fan-out bus (component D), and the cluster registry (component C).
//!
//! Network-facing components (push, fetch, query) live in `meta-net`, which
//! depends on this crate and never duplicates its mutation logic — every
//! wire handler ends up calling into a [`store::ResourceStore`].

pub mod bus;
pub mod error;
pub mod model;
pub mod registry;
pub mod store;

pub use error::CoreError;
