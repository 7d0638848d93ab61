//! Fetch server (component G): the aggregator side of the fetch protocol.
//!
//! Every `ResourceStore` an aggregator knows about has the server's
//! [`FetchBroadcast`] registered as an exporter (wired by the push
//! acceptor's `default_exporters`, see [`crate::push::acceptor`]). Each
//! connected WebSocket fetcher gets its own filtered view over that same
//! broadcast: an initial `Reset` snapshot per matching `(cluster, type)`,
//! then every subsequent event whose type passes the fetcher's filter.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, warn};

use meta_core::bus::Exporter;
use meta_core::model::{ResType, ResourceEvent};
use meta_core::registry::ClusterRegistry;

const FETCHER_QUEUE_CAPACITY: usize = 1024;
/// Bounds a single send attempt to a fetcher, not the wait for the next
/// broadcast event — a quiet broadcast never disconnects a healthy fetcher,
/// only one whose own send is stuck past this long does (spec.md §4.G).
const FETCHER_SEND_TIMEOUT: Duration = Duration::from_secs(10);
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// First message a fetcher sends: the resource types it wants. An empty
/// list subscribes to every type (spec.md §4.H).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchSubscribe {
    pub resource_types: Vec<ResType>,
}

impl FetchSubscribe {
    fn matches(&self, res_type: ResType) -> bool {
        self.resource_types.is_empty() || self.resource_types.contains(&res_type)
    }
}

/// Exporter every aggregator store carries; fans every mutation out to a
/// broadcast channel that each connected fetcher subscribes to
/// independently.
pub struct FetchBroadcast {
    tx: broadcast::Sender<ResourceEvent>,
}

impl FetchBroadcast {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(FETCHER_QUEUE_CAPACITY);
        Arc::new(FetchBroadcast { tx })
    }

    fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.tx.subscribe()
    }
}

impl Exporter for FetchBroadcast {
    fn export(&self, event: &ResourceEvent) {
        // No receivers yet is the common case at startup; not an error.
        let _ = self.tx.send(event.clone());
    }
}

pub struct FetchServerState {
    pub registry: Arc<ClusterRegistry>,
    pub broadcast: Arc<FetchBroadcast>,
}

/// `GET /fetch` handler: upgrades to a WebSocket and hands off to
/// [`run_fetcher`].
pub async fn handle_fetch(
    State(state): State<Arc<FetchServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| run_fetcher(socket, state))
}

async fn run_fetcher(mut socket: WebSocket, state: Arc<FetchServerState>) {
    let subscribe = match socket.recv().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<FetchSubscribe>(&text) {
            Ok(sub) => sub,
            Err(error) => {
                warn!(%error, "fetcher sent an invalid subscribe message, closing");
                return;
            }
        },
        _ => {
            warn!("fetcher disconnected before sending a subscribe message");
            return;
        }
    };

    debug!(resource_types = ?subscribe.resource_types, "fetcher subscribed");

    for cluster_id in state.registry.cluster_ids() {
        let Some(cluster) = state.registry.cluster(&cluster_id) else { continue };
        for res_type in cluster.res_types() {
            if !subscribe.matches(res_type) {
                continue;
            }
            if let Some(store) = cluster.get(res_type) {
                let event = ResourceEvent::reset(cluster_id.clone(), res_type, store.snapshot());
                if send_event(&mut socket, &event).await.is_err() {
                    return;
                }
            }
        }
    }

    let mut events = state.broadcast.subscribe();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if !subscribe.matches(event.resource_type) {
                            continue;
                        }
                        match timeout(FETCHER_SEND_TIMEOUT, send_event(&mut socket, &event)).await {
                            Ok(Ok(())) => {}
                            Ok(Err(())) => return,
                            Err(_elapsed) => {
                                warn!("fetcher send blocked past the idle timeout, unregistering slow consumer");
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "fetcher lagged behind the broadcast, some events were dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = ping_interval.tick() => {
                if timeout(FETCHER_SEND_TIMEOUT, socket.send(Message::Ping(Vec::new()))).await.is_err() {
                    return;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => {}
                    _ => return,
                }
            }
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ResourceEvent) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(%error, "failed to encode event for a fetcher");
            return Err(());
        }
    };
    socket.send(Message::Text(payload)).await.map_err(|_| ())
}

/// Used by the fetch client (component H) when dialing in from a process
/// that does not go through axum — kept here so both sides agree on the
/// exact bytes of a subscribe request.
pub fn encode_subscribe(subscribe: &FetchSubscribe) -> Result<String, serde_json::Error> {
    serde_json::to_string(subscribe)
}
