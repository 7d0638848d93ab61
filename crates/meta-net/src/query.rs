//! Query engine (component I): point and list lookups across the cluster
//! registry, for callers that want an answer now rather than a live feed
//! (that's what the fetch client is for).
//!
//! `cluster_id` is optional on every point query: when absent, every known
//! cluster is searched and the first hit wins, in the order
//! `ClusterRegistry::cluster_ids` returns them (spec.md §4.I). This is also
//! where the `ListService` fix from spec.md §9(b) lives — the original
//! always consulted the pod store, which happened to return *something*
//! for any resource type and masked the bug; this looks the resource type
//! up in the resource's own store.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use meta_core::model::{ResType, ResUid, Resource};
use meta_core::registry::ClusterRegistry;
use meta_core::store::{NodeStore, PodStore, ServiceStore};

pub struct QueryEngine {
    registry: Arc<ClusterRegistry>,
}

impl QueryEngine {
    pub fn new(registry: Arc<ClusterRegistry>) -> Self {
        QueryEngine { registry }
    }

    fn clusters_to_search<'a>(&'a self, cluster_id: Option<&'a str>) -> Vec<String> {
        match cluster_id {
            Some(id) => vec![id.to_string()],
            None => self.registry.cluster_ids(),
        }
    }

    /// Generic point lookup by UID for any resource type, searching every
    /// cluster when `cluster_id` is `None`.
    pub fn get_resource(&self, cluster_id: Option<&str>, res_type: ResType, uid: &ResUid) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, res_type) {
                if let Some(res) = store.snapshot().into_iter().find(|r| &r.res_uid == uid) {
                    return Some(res);
                }
            }
        }
        None
    }

    /// Generic list query: every resource of `res_type`, in every searched
    /// cluster.
    pub fn list_resources(&self, cluster_id: Option<&str>, res_type: ResType) -> Vec<Resource> {
        let mut out = Vec::new();
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, res_type) {
                out.extend(store.snapshot());
            }
        }
        out
    }

    /// Pod point-query by `namespace/name`.
    pub fn get_pod_by_namespace_name(&self, cluster_id: Option<&str>, namespace: &str, name: &str) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, ResType::POD) {
                if let Some(pod_store) = store.downcast_ref::<PodStore>() {
                    if let Some(pod) = pod_store.by_namespace_name(namespace, name) {
                        return Some(pod);
                    }
                }
            }
        }
        None
    }

    /// Pod lookup by container id, truncated to 12 characters the same way
    /// `PodStore` indexes it (spec.md Invariant 9).
    pub fn get_pod_by_container_id(&self, cluster_id: Option<&str>, container_id: &str) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, ResType::POD) {
                if let Some(pod_store) = store.downcast_ref::<PodStore>() {
                    if let Some(pod) = pod_store.by_container_id(container_id) {
                        return Some(pod);
                    }
                }
            }
        }
        None
    }

    pub fn get_pod_by_ip(&self, cluster_id: Option<&str>, ip: &str) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, ResType::POD) {
                if let Some(pod_store) = store.downcast_ref::<PodStore>() {
                    if let Some(pod) = pod_store.by_ip(ip) {
                        return Some(pod);
                    }
                }
            }
        }
        None
    }

    /// `ListService` per namespace/name. Fixed per spec.md §9(b): this
    /// consults the `ServiceStore`, not the `PodStore` the original
    /// mistakenly fell through to.
    pub fn get_service(&self, cluster_id: Option<&str>, namespace: &str, name: &str) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, ResType::SERVICE) {
                if let Some(service_store) = store.downcast_ref::<ServiceStore>() {
                    if let Some(service) = service_store.by_namespace_name(namespace, name) {
                        return Some(service.resource().clone());
                    }
                }
            }
        }
        None
    }

    pub fn get_service_by_ip(&self, cluster_id: Option<&str>, ip: &str) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, ResType::SERVICE) {
                if let Some(service_store) = store.downcast_ref::<ServiceStore>() {
                    if let Some(service) = service_store.by_ip(ip) {
                        return Some(service.resource().clone());
                    }
                }
            }
        }
        None
    }

    pub fn get_node_by_ip(&self, cluster_id: Option<&str>, ip: &str) -> Option<Resource> {
        for cluster in self.clusters_to_search(cluster_id) {
            if let Some(store) = self.registry.get_cache(&cluster, ResType::NODE) {
                if let Some(node_store) = store.downcast_ref::<NodeStore>() {
                    if let Some(node) = node_store.by_ip(ip) {
                        return Some(node);
                    }
                }
            }
        }
        None
    }
}

/// The single `POST /query` wire request (spec.md §6): a missing/empty
/// `ClusterID` searches every cluster, first hit wins (spec.md Invariant
/// 10).
#[derive(Debug, Deserialize)]
pub struct QueryResRequest {
    #[serde(rename = "ClusterID", default)]
    pub cluster_id: String,
    #[serde(rename = "ResType")]
    pub res_type: ResType,
    #[serde(rename = "ResName", default)]
    pub res_name: String,
    #[serde(rename = "ResNamespace", default)]
    pub res_namespace: String,
    #[serde(rename = "IP", default)]
    pub ip: String,
    #[serde(rename = "ListAll", default)]
    pub list_all: bool,
}

#[derive(Debug, Serialize)]
pub struct QueryResResponse {
    #[serde(rename = "IsFind")]
    pub is_find: bool,
    #[serde(rename = "Object")]
    pub object: serde_json::Value,
}

fn to_object(resource: &Resource) -> serde_json::Value {
    serde_json::to_value(resource).unwrap_or(serde_json::Value::Null)
}

/// `POST /query` handler: the one entry point for both point and list
/// queries (spec.md §4.I, §6). Point-query selector is driven by
/// `ResType`: Pod resolves by `(ResNamespace, ResName)` when both are set,
/// else by `IP`; Service and Node resolve by `IP` — the same dispatch the
/// original's `QueryResource` handler performs.
pub async fn query_handler(State(engine): State<Arc<QueryEngine>>, Json(req): Json<QueryResRequest>) -> Json<QueryResResponse> {
    let cluster_id = (!req.cluster_id.is_empty()).then_some(req.cluster_id.as_str());

    if req.list_all {
        let resources = engine.list_resources(cluster_id, req.res_type);
        let object = serde_json::to_value(&resources).unwrap_or(serde_json::Value::Null);
        return Json(QueryResResponse { is_find: true, object });
    }

    let found = match req.res_type {
        ResType::POD if !req.res_namespace.is_empty() && !req.res_name.is_empty() => {
            engine.get_pod_by_namespace_name(cluster_id, &req.res_namespace, &req.res_name)
        }
        ResType::POD => engine.get_pod_by_ip(cluster_id, &req.ip),
        ResType::SERVICE => engine.get_service_by_ip(cluster_id, &req.ip),
        ResType::NODE => engine.get_node_by_ip(cluster_id, &req.ip),
        _ => None,
    };

    match found {
        Some(resource) => Json(QueryResResponse { is_find: true, object: to_object(&resource) }),
        None => Json(QueryResResponse { is_find: false, object: serde_json::Value::Null }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meta_core::model::AttrKey;
    use meta_core::store::ResourceStore;

    fn registry_with_pod_and_service() -> Arc<ClusterRegistry> {
        let registry = Arc::new(ClusterRegistry::new());
        let cluster = registry.get_or_create_cluster("cluster-a");

        let pod = cluster.get_or_create(ResType::POD);
        pod.add(Resource::new("pod-uid-1", ResType::POD, "pod-a"));

        let mut svc = Resource::new("svc-uid-1", ResType::SERVICE, "svc-a");
        svc.string_attr.insert(AttrKey::NAMESPACE, "default".to_string());
        let service = cluster.get_or_create(ResType::SERVICE);
        service.add(svc);

        registry
    }

    #[test]
    fn list_service_consults_the_service_store_not_pod_store() {
        let registry = registry_with_pod_and_service();
        let engine = QueryEngine::new(registry);

        let found = engine
            .get_service(Some("cluster-a"), "default", "svc-a")
            .expect("service should be found via the service store");
        assert_eq!(found.res_uid, ResUid::new("svc-uid-1"));

        // A pod sharing the namespace/name shape must never satisfy a
        // service query — this is the regression the original's bug let
        // through.
        assert!(engine.get_service(Some("cluster-a"), "", "pod-a").is_none());
    }

    #[test]
    fn get_resource_searches_every_cluster_when_cluster_id_is_none() {
        let registry = registry_with_pod_and_service();
        let engine = QueryEngine::new(registry);

        let found = engine.get_resource(None, ResType::POD, &ResUid::new("pod-uid-1"));
        assert!(found.is_some());
    }

    fn registry_with_pod_named() -> Arc<ClusterRegistry> {
        let registry = Arc::new(ClusterRegistry::new());
        let cluster = registry.get_or_create_cluster("cluster-a");
        let mut pod = Resource::new("pod-uid-1", ResType::POD, "pod-a");
        pod.string_attr.insert(AttrKey::NAMESPACE, "default".to_string());
        let store = cluster.get_or_create(ResType::POD);
        store.add(pod);
        registry
    }

    #[tokio::test]
    async fn query_handler_resolves_pod_by_namespace_and_name() {
        let engine = Arc::new(QueryEngine::new(registry_with_pod_named()));
        let req = QueryResRequest {
            cluster_id: "cluster-a".to_string(),
            res_type: ResType::POD,
            res_name: "pod-a".to_string(),
            res_namespace: "default".to_string(),
            ip: String::new(),
            list_all: false,
        };

        let response = query_handler(State(engine), Json(req)).await.0;

        assert!(response.is_find);
        assert_eq!(response.object["ResUID"], "pod-uid-1");
    }

    #[tokio::test]
    async fn query_handler_list_all_flattens_every_matching_store() {
        let engine = Arc::new(QueryEngine::new(registry_with_pod_and_service()));
        let req = QueryResRequest {
            cluster_id: String::new(),
            res_type: ResType::POD,
            res_name: String::new(),
            res_namespace: String::new(),
            ip: String::new(),
            list_all: true,
        };

        let response = query_handler(State(engine), Json(req)).await.0;

        assert!(response.is_find);
        assert_eq!(response.object.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn query_handler_reports_is_find_false_on_miss() {
        let engine = Arc::new(QueryEngine::new(registry_with_pod_and_service()));
        let req = QueryResRequest {
            cluster_id: "cluster-a".to_string(),
            res_type: ResType::SERVICE,
            res_name: String::new(),
            res_namespace: String::new(),
            ip: "10.0.0.9".to_string(),
            list_all: false,
        };

        let response = query_handler(State(engine), Json(req)).await.0;

        assert!(!response.is_find);
        assert!(response.object.is_null());
    }
}
