//! Fetch protocol: a WebSocket fan-out from an aggregator (component G,
//! [`server`]) to any number of type-filtered subscribers (component H,
//! [`client`]), used by read-side consumers that want a live local replica
//! instead of polling the query engine (spec.md §4.G/§4.H).

pub mod client;
pub mod server;
