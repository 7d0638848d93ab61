//! Fetch client (component H): dials an aggregator's `/fetch` WebSocket,
//! subscribes to a type filter, and applies every event it receives to a
//! local set of stores — giving a read-side consumer a live replica
//! without polling the query engine.
//!
//! Retries forever on any error (dial failure, protocol desync, socket
//! close) with a fixed backoff, matching the fetch server's "this
//! connection is disposable, state lives in the stores" design.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use meta_core::model::{ResOperation, ResType, ResourceEvent};
use meta_core::registry::ClusterRegistry;

use crate::fetch::server::FetchSubscribe;

const RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    pub server_url: String,
    pub resource_types: Vec<ResType>,
}

/// Applies a decoded [`ResourceEvent`] to the local registry, creating the
/// cluster/type store on demand exactly like the push acceptor does.
fn apply_event(registry: &ClusterRegistry, event: ResourceEvent) {
    let store = registry.get_or_create_store(&event.cluster_id, event.resource_type, |_| {});
    store.set_cluster_id(&event.cluster_id);
    match event.operation {
        ResOperation::Reset => store.reset(event.res),
        ResOperation::Add => {
            for res in event.res {
                store.add(res);
            }
        }
        ResOperation::Update => {
            for res in event.res {
                store.update(res);
            }
        }
        ResOperation::Delete => {
            for res in event.res {
                store.delete(&res.res_uid);
            }
        }
    }
}

async fn run_once(config: &FetchClientConfig, registry: &ClusterRegistry) -> crate::error::NetResult<()> {
    let (mut stream, _response) = tokio_tungstenite::connect_async(&config.server_url).await?;

    let subscribe = FetchSubscribe {
        resource_types: config.resource_types.clone(),
    };
    let payload = serde_json::to_string(&subscribe)?;
    stream.send(Message::Text(payload)).await?;

    while let Some(message) = stream.next().await {
        match message? {
            Message::Text(text) => {
                let event: ResourceEvent = serde_json::from_str(&text)?;
                apply_event(registry, event);
            }
            Message::Ping(payload) => {
                stream.send(Message::Pong(payload)).await?;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    Ok(())
}

/// Runs until the process exits: connect, stream events into `registry`,
/// and on any error wait [`RETRY_DELAY`] and reconnect from scratch (the
/// reconnect's fresh subscribe always comes with a full `Reset` snapshot,
/// so there is no local checkpoint to reconcile).
pub async fn run_fetch_client(config: FetchClientConfig, registry: Arc<ClusterRegistry>) {
    loop {
        info!(server = %config.server_url, "connecting fetch client");
        if let Err(error) = run_once(&config, &registry).await {
            warn!(%error, "fetch client disconnected, retrying");
        } else {
            warn!("fetch client stream closed cleanly, reconnecting");
        }
        tokio::time::sleep(RETRY_DELAY).await;
    }
}
