//! Push acceptor (component F): the aggregator side of the push protocol.
//!
//! One [`PushAcceptor`] fronts an axum route (see [`handle_push`]) and
//! dispatches every incoming [`SyncRequest`] to the right branch per
//! spec.md §4.A's classification:
//!
//! - health check: allocate a fresh agent index and checkpoint session.
//! - sync check: validate the agent's last-known checkpoint against the
//!   one this acceptor actually has on file.
//! - init request (has `checkpoint`, no `last_checkpoint`): a full `Reset`
//!   batch — replace the named store's contents outright.
//! - otherwise: an incremental batch, applied resource by resource to the
//!   appropriate store after checkpoint continuity is confirmed.
//!
//! Resources route to stores via the cluster registry (component C),
//! keyed by the `cluster_id`/`resource_type` carried on each event — this
//! is also where an unrecognized resource type falls through to a
//! [`meta_core::store::GenericStore`] created on demand (spec.md §4.F).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, warn};

use meta_core::bus::Exporter;
use meta_core::model::{CheckPoint, ResOperation, ResourceEvent, SyncRequest, SyncResponse};
use meta_core::registry::ClusterRegistry;

const CHECKPOINT_CACHE_CAPACITY: usize = 1000;

pub struct PushAcceptor {
    registry: Arc<ClusterRegistry>,
    /// Exporters registered on every store the moment it is first created
    /// (e.g. the fetch server's broadcast hook), so a freshly discovered
    /// cluster/type pair is wired up without a separate registration pass.
    default_exporters: Vec<Arc<dyn Exporter>>,
    next_agent_index: AtomicI64,
    checkpoints: Mutex<LruCache<i64, CheckPoint>>,
}

impl PushAcceptor {
    pub fn new(registry: Arc<ClusterRegistry>) -> Arc<Self> {
        Self::with_default_exporters(registry, Vec::new())
    }

    pub fn with_default_exporters(registry: Arc<ClusterRegistry>, default_exporters: Vec<Arc<dyn Exporter>>) -> Arc<Self> {
        Arc::new(PushAcceptor {
            registry,
            default_exporters,
            next_agent_index: AtomicI64::new(1),
            checkpoints: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(CHECKPOINT_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    fn allocate_health_check(&self) -> SyncResponse {
        let agent_index = self.next_agent_index.fetch_add(1, Ordering::Relaxed);
        let checkpoint = CheckPoint {
            agent_index,
            timestamp: 0,
            event_index: 0,
        };
        self.checkpoints.lock().put(agent_index, checkpoint);
        debug!(agent_index, "allocated new push session");
        SyncResponse {
            last_checkpoint: Some(checkpoint),
            is_stop_push: false,
            is_init: false,
            is_accepted: true,
        }
    }

    fn handle_sync_check(&self, last_checkpoint: CheckPoint) -> SyncResponse {
        let on_file = self.checkpoints.lock().get(&last_checkpoint.agent_index).copied();
        match on_file {
            Some(known) if known.matches(&last_checkpoint) => SyncResponse {
                last_checkpoint: Some(known),
                is_stop_push: false,
                is_init: false,
                is_accepted: true,
            },
            _ => {
                warn!(
                    agent_index = last_checkpoint.agent_index,
                    "sync check mismatch, requesting full re-init"
                );
                SyncResponse {
                    last_checkpoint: None,
                    is_stop_push: true,
                    is_init: false,
                    is_accepted: false,
                }
            }
        }
    }

    fn apply_event(&self, event: &ResourceEvent) {
        let store = self.registry.get_or_create_store(&event.cluster_id, event.resource_type, |store| {
            for exporter in &self.default_exporters {
                let _ = store.register_exporter(exporter.clone());
            }
        });
        store.set_cluster_id(&event.cluster_id);
        match event.operation {
            ResOperation::Reset => store.reset(event.res.clone()),
            ResOperation::Add => {
                for res in &event.res {
                    store.add(res.clone());
                }
            }
            ResOperation::Update => {
                for res in &event.res {
                    store.update(res.clone());
                }
            }
            ResOperation::Delete => {
                for res in &event.res {
                    store.delete(&res.res_uid);
                }
            }
        }
    }

    /// Applies every event in a batch in order, per spec.md §4.F: "for each
    /// event, look up or create a per-cluster handler-map; if the cluster
    /// has never been seen and the first event is not a Reset, respond
    /// with `IsInit=true` without applying any events." Registering the
    /// cluster happens even on the rejecting path — matching
    /// `examples/original_source/source/metasource/meta_push_server.go`'s
    /// `handlerSyncRequest`, which stores the new `ClusterHandlerMap`
    /// before checking whether the event may be applied — so the next
    /// batch for that cluster is no longer treated as unseen.
    ///
    /// Returns `Ok(())` if every event was applied, or `Err(())` the
    /// moment an unseen cluster's first event turns out not to be a
    /// Reset; in that case nothing from this batch is applied.
    fn apply_batch_events(&self, events: &[ResourceEvent]) -> Result<(), ()> {
        for event in events {
            let cluster_already_seen = self.registry.has_cluster(&event.cluster_id);
            if !cluster_already_seen {
                self.registry.get_or_create_cluster(&event.cluster_id);
            }
            if !cluster_already_seen && event.operation != ResOperation::Reset {
                warn!(
                    cluster_id = %event.cluster_id,
                    "accepted a non-Reset event on an unseen cluster, requesting full re-init"
                );
                return Err(());
            }
            self.apply_event(event);
        }
        Ok(())
    }

    fn handle_init_request(&self, req: &SyncRequest, checkpoint: CheckPoint) -> SyncResponse {
        let events: Vec<ResourceEvent> = req.events.iter().flatten().cloned().collect();
        if self.apply_batch_events(&events).is_err() {
            return SyncResponse {
                last_checkpoint: None,
                is_stop_push: false,
                is_init: true,
                is_accepted: true,
            };
        }
        self.checkpoints.lock().put(checkpoint.agent_index, checkpoint);
        SyncResponse {
            last_checkpoint: Some(checkpoint),
            is_stop_push: false,
            is_init: true,
            is_accepted: true,
        }
    }

    fn handle_batch(&self, req: &SyncRequest, last_checkpoint: CheckPoint, checkpoint: CheckPoint) -> SyncResponse {
        let on_file = self.checkpoints.lock().get(&last_checkpoint.agent_index).copied();
        let continuous = on_file.map(|known| known.matches(&last_checkpoint)).unwrap_or(false);
        if !continuous {
            warn!(
                agent_index = last_checkpoint.agent_index,
                "batch checkpoint discontinuity, requesting full re-init"
            );
            return SyncResponse {
                last_checkpoint: None,
                is_stop_push: true,
                is_init: false,
                is_accepted: false,
            };
        }

        let events: Vec<ResourceEvent> = req.events.iter().flatten().cloned().collect();
        if self.apply_batch_events(&events).is_err() {
            return SyncResponse {
                last_checkpoint: None,
                is_stop_push: false,
                is_init: true,
                is_accepted: true,
            };
        }

        self.checkpoints.lock().put(checkpoint.agent_index, checkpoint);
        SyncResponse {
            last_checkpoint: Some(checkpoint),
            is_stop_push: false,
            is_init: false,
            is_accepted: true,
        }
    }

    pub fn handle(&self, req: SyncRequest) -> SyncResponse {
        if req.is_health_check() {
            return self.allocate_health_check();
        }
        if req.is_sync_check() {
            return self.handle_sync_check(req.last_checkpoint.expect("checked by is_sync_check"));
        }
        if req.is_init_request() {
            let checkpoint = req.checkpoint.expect("checked by is_init_request");
            return self.handle_init_request(&req, checkpoint);
        }
        let last_checkpoint = req.last_checkpoint.expect("normal batch always carries last_checkpoint");
        let checkpoint = req.checkpoint.expect("normal batch always carries checkpoint");
        self.handle_batch(&req, last_checkpoint, checkpoint)
    }
}

/// `POST /push` handler: decodes a [`SyncRequest`], dispatches it, and
/// encodes the resulting [`SyncResponse`].
pub async fn handle_push(
    State(acceptor): State<Arc<PushAcceptor>>,
    headers: HeaderMap,
    Json(req): Json<SyncRequest>,
) -> Json<SyncResponse> {
    if headers.get("X-Data-Flow").and_then(|v| v.to_str().ok()) != Some("meta-push") {
        warn!("push request missing or mismatched X-Data-Flow header");
    }
    Json(acceptor.handle(req))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_core::model::{ResOperation, ResType, Resource};

    fn acceptor() -> Arc<PushAcceptor> {
        PushAcceptor::new(Arc::new(ClusterRegistry::new()))
    }

    #[test]
    fn health_check_allocates_a_fresh_agent_index() {
        let acceptor = acceptor();
        let first = acceptor.handle(SyncRequest::health_check());
        let second = acceptor.handle(SyncRequest::health_check());
        assert_ne!(
            first.last_checkpoint.unwrap().agent_index,
            second.last_checkpoint.unwrap().agent_index
        );
    }

    #[test]
    fn init_request_resets_the_store() {
        let acceptor = acceptor();
        let health = acceptor.handle(SyncRequest::health_check());
        let agent_index = health.last_checkpoint.unwrap().agent_index;

        let event = ResourceEvent::reset(
            "cluster-a",
            ResType::POD,
            vec![Resource::new("uid-1", ResType::POD, "pod-a")],
        );
        let checkpoint = CheckPoint { agent_index, timestamp: 1, event_index: 1 };
        let response = acceptor.handle(SyncRequest::batch(vec![event], None, checkpoint));

        assert!(response.is_init);
        assert!(response.is_accepted);
        let store = acceptor.registry.get_cache("cluster-a", ResType::POD).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn batch_with_stale_last_checkpoint_forces_stop_push() {
        let acceptor = acceptor();
        let health = acceptor.handle(SyncRequest::health_check());
        let agent_index = health.last_checkpoint.unwrap().agent_index;

        let stale = CheckPoint { agent_index, timestamp: 99, event_index: 99 };
        let next = CheckPoint { agent_index, timestamp: 100, event_index: 100 };
        let response = acceptor.handle(SyncRequest::batch(Vec::new(), Some(stale), next));

        assert!(response.is_stop_push);
        assert!(!response.is_accepted);
    }

    #[test]
    fn normal_batch_on_unseen_cluster_with_non_reset_event_forces_reinit_without_applying() {
        let acceptor = acceptor();
        let health = acceptor.handle(SyncRequest::health_check());
        let agent_index = health.last_checkpoint.unwrap().agent_index;

        let event = ResourceEvent::single(
            "cluster-new",
            ResType::POD,
            ResOperation::Add,
            Resource::new("uid-1", ResType::POD, "pod-a"),
        );
        let last = CheckPoint { agent_index, timestamp: 0, event_index: 0 };
        let next = CheckPoint { agent_index, timestamp: 1, event_index: 1 };
        let response = acceptor.handle(SyncRequest::batch(vec![event], Some(last), next));

        assert!(response.is_init);
        assert!(response.last_checkpoint.is_none());
        // The cluster is registered even though its event was rejected,
        // matching the original's eager `ClusterMaps.Store`.
        assert!(acceptor.registry.has_cluster("cluster-new"));
        assert!(acceptor.registry.get_cache("cluster-new", ResType::POD).is_none());
    }

    #[test]
    fn normal_batch_on_unseen_cluster_starting_with_reset_is_applied() {
        let acceptor = acceptor();
        let health = acceptor.handle(SyncRequest::health_check());
        let agent_index = health.last_checkpoint.unwrap().agent_index;

        let event = ResourceEvent::reset(
            "cluster-new",
            ResType::POD,
            vec![Resource::new("uid-1", ResType::POD, "pod-a")],
        );
        let last = CheckPoint { agent_index, timestamp: 0, event_index: 0 };
        let next = CheckPoint { agent_index, timestamp: 1, event_index: 1 };
        let response = acceptor.handle(SyncRequest::batch(vec![event], Some(last), next));

        assert!(!response.is_init);
        assert!(response.is_accepted);
        let store = acceptor.registry.get_cache("cluster-new", ResType::POD).unwrap();
        assert_eq!(store.len(), 1);
    }
}
