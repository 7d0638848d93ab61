//! Transport-facing error taxonomy (spec.md §7(e)).
//!
//! `meta-core::CoreError` covers programmer errors against the in-memory
//! model; `NetError` covers everything that can go wrong getting bytes
//! from one agent to another — the push exporter's HTTP round trip, the
//! fetch client's WebSocket dial, and the wire codec both ends share.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("transport error talking to {peer}: {source}")]
    Transport {
        peer: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode message as JSON: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("peer sent a message outside the expected protocol sequence: {0}")]
    ProtocolDesync(String),

    #[error("exporter backpressure: queue did not drain within the {0:?} send timeout")]
    Backpressure(std::time::Duration),

    #[error("push acceptor rejected the batch: {0}")]
    Rejected(String),
}

pub type NetResult<T> = Result<T, NetError>;
