//! Push protocol: an agent (component E, [`exporter`]) continuously ships
//! its local stores to an aggregator (component F, [`acceptor`]) over
//! HTTP, using the checkpoint handshake in `meta_core::model` to detect and
//! recover from desync (spec.md §4.A, §6).

pub mod acceptor;
pub mod exporter;
