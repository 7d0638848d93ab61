//! Cluster registry (component C).
//!
//! An agent sees a single cluster and only ever needs its own
//! [`ClusterCache`]; an aggregator fans in many agents and needs the
//! multi-cluster [`ClusterRegistry`] to find the right cache per incoming
//! `cluster_id`. Both are built on the same per-type store map, so the
//! query engine can treat a one-cluster agent and a many-cluster
//! aggregator identically by going through [`ClusterRegistry`] either way.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::model::ResType;
use crate::store::{GenericStore, NodeStore, PodStore, ResourceStore, ServiceStore};

/// Builds the store for a resource type, falling back to [`GenericStore`]
/// for anything without a dedicated index (spec.md §4.F: "creating a
/// generic store on demand for unknown types").
pub fn new_store(res_type: ResType, cluster_id: &str) -> Arc<dyn ResourceStore> {
    let store: Arc<dyn ResourceStore> = match res_type {
        ResType::POD => Arc::new(PodStore::new()),
        ResType::SERVICE => Arc::new(ServiceStore::new()),
        ResType::NODE => Arc::new(NodeStore::new()),
        _ => Arc::new(GenericStore::new(res_type)),
    };
    store.set_cluster_id(cluster_id);
    store
}

/// The per-type store map for a single cluster.
pub struct ClusterCache {
    cluster_id: String,
    stores: DashMap<ResType, Arc<dyn ResourceStore>>,
}

impl ClusterCache {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        ClusterCache {
            cluster_id: cluster_id.into(),
            stores: DashMap::new(),
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Returns the store for `res_type`, creating one on demand the first
    /// time this cluster sends that type (spec.md §4.F).
    pub fn get_or_create(&self, res_type: ResType) -> Arc<dyn ResourceStore> {
        self.get_or_create_with(res_type, |_| {})
    }

    /// Like [`ClusterCache::get_or_create`], but runs `on_create` once
    /// against a freshly created store (and only a freshly created one) —
    /// used to register default exporters, such as the fetch server's
    /// broadcast hook, on every store as it comes into existence rather
    /// than requiring a second pass over the registry.
    ///
    /// There is a narrow window between the store becoming visible to
    /// other callers and `on_create` finishing (e.g. a concurrent reader
    /// could observe the store before its exporter is registered); this is
    /// judged acceptable for a handler that only misses events during
    /// first-contact registration, not steady-state operation.
    pub fn get_or_create_with<F>(&self, res_type: ResType, on_create: F) -> Arc<dyn ResourceStore>
    where
        F: FnOnce(&Arc<dyn ResourceStore>),
    {
        let mut created = false;
        let store = self
            .stores
            .entry(res_type)
            .or_insert_with(|| {
                created = true;
                new_store(res_type, &self.cluster_id)
            })
            .value()
            .clone();
        if created {
            on_create(&store);
        }
        store
    }

    pub fn get(&self, res_type: ResType) -> Option<Arc<dyn ResourceStore>> {
        self.stores.get(&res_type).map(|s| s.clone())
    }

    pub fn res_types(&self) -> Vec<ResType> {
        self.stores.iter().map(|e| *e.key()).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn ResourceStore>> {
        self.stores.iter().map(|e| e.value().clone()).collect()
    }
}

/// Maps `cluster_id` to its [`ClusterCache`]. The push acceptor is the only
/// writer — it calls [`ClusterRegistry::get_or_create_cluster`] the first
/// time it sees a given cluster; the query engine and fetch server only
/// ever read.
#[derive(Default)]
pub struct ClusterRegistry {
    clusters: DashMap<String, Arc<ClusterCache>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache for `cluster_id`, creating it if this is the first
    /// time the cluster has been seen. Goes through `DashMap::entry` so two
    /// concurrent first-sight registrations of the same cluster can't race
    /// a load-then-store into creating two caches and silently dropping one
    /// (spec.md §9(c) — the original's `Caches.Load`-then-`Store` pattern).
    pub fn get_or_create_cluster(&self, cluster_id: &str) -> Arc<ClusterCache> {
        self.clusters
            .entry(cluster_id.to_string())
            .or_insert_with(|| {
                info!(cluster_id, "registering new cluster");
                Arc::new(ClusterCache::new(cluster_id))
            })
            .value()
            .clone()
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<Arc<ClusterCache>> {
        self.clusters.get(cluster_id).map(|c| c.clone())
    }

    /// Whether `cluster_id` has already been registered — a pure peek,
    /// unlike [`ClusterRegistry::get_or_create_cluster`] which creates it.
    /// The push acceptor uses this to detect a cluster's first-ever event
    /// before deciding whether to apply it (spec.md §4.F).
    pub fn has_cluster(&self, cluster_id: &str) -> bool {
        self.clusters.contains_key(cluster_id)
    }

    /// Registers or creates the cluster, then returns its store for
    /// `res_type`, running `on_create` once if the store is new. The one
    /// call a push acceptor needs for every incoming event.
    pub fn get_or_create_store<F>(&self, cluster_id: &str, res_type: ResType, on_create: F) -> Arc<dyn ResourceStore>
    where
        F: FnOnce(&Arc<dyn ResourceStore>),
    {
        self.get_or_create_cluster(cluster_id).get_or_create_with(res_type, on_create)
    }

    /// `GetCache`: the store for one `(cluster_id, resource_type)` pair, or
    /// `None` if the cluster or the type hasn't been seen yet.
    pub fn get_cache(&self, cluster_id: &str, res_type: ResType) -> Option<Arc<dyn ResourceStore>> {
        self.clusters.get(cluster_id)?.get(res_type)
    }

    /// `GetCaches`: every cluster's store for `res_type`, used by list
    /// queries that span all clusters.
    pub fn get_caches(&self, res_type: ResType) -> Vec<Arc<dyn ResourceStore>> {
        self.clusters
            .iter()
            .filter_map(|entry| entry.value().get(res_type))
            .collect()
    }

    pub fn cluster_ids(&self) -> Vec<String> {
        self.clusters.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn remove_cluster(&self, cluster_id: &str) {
        self.clusters.remove(cluster_id);
    }
}
