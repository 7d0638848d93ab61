use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::bus::Exporter;
use crate::error::CoreError;
use crate::model::{AttrKey, Relation, RelationType, ResOperation, ResType, ResUid, Resource, ResourceEvent};

use super::base::{self, ResourceListCore};
use super::pod::POD_PHASE_PENDING;
use super::ResourceStore;

fn parse_kv_attr(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let mut it = pair.splitn(2, '=');
            let key = it.next()?.trim();
            if key.is_empty() {
                return None;
            }
            let value = it.next().unwrap_or("").trim();
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Read-only accessor over a `ResType::SERVICE` resource, exposing the
/// attributes the query engine and the endpoint matcher care about without
/// forcing every caller to know the raw attribute keys.
#[derive(Debug, Clone)]
pub struct Service(Resource);

impl Service {
    pub fn from_resource(res: Resource) -> Self {
        Service(res)
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    pub fn selectors(&self) -> HashMap<String, String> {
        self.0
            .string_attr
            .get(&AttrKey::SERVICE_SELECTORS)
            .map(|raw| parse_kv_attr(raw))
            .unwrap_or_default()
    }

    pub fn ip(&self) -> Option<&str> {
        self.0.string_attr.get(&AttrKey::SERVICE_IP).map(String::as_str)
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &Relation> {
        self.0
            .relations
            .iter()
            .filter(|rel| rel.re_type == RelationType::ENDPOINT)
    }
}

/// Returns whether `pod` is a member of the endpoint set for `selectors`:
/// every selector key/value pair must appear in the pod's labels, and a
/// `Pending` pod is never a member (spec.md Invariant 4 / Scenario S3 —
/// pods are only wired into a service's endpoints once they leave
/// `Pending`).
pub fn match_pod(pod: &Resource, selectors: &HashMap<String, String>) -> bool {
    if selectors.is_empty() {
        return false;
    }
    if pod.string_attr.get(&AttrKey::PHASE).map(String::as_str) == Some(POD_PHASE_PENDING) {
        return false;
    }
    let labels = pod
        .string_attr
        .get(&AttrKey::POD_LABELS)
        .map(|raw| parse_kv_attr(raw))
        .unwrap_or_default();
    selectors
        .iter()
        .all(|(key, value)| labels.get(key).map(|v| v == value).unwrap_or(false))
}

/// The pods and services the endpoint matcher tracks for one namespace.
/// Kept per-namespace so a pod mutation only has to recompute the services
/// that could possibly select it, rather than every service in the
/// cluster.
#[derive(Default)]
pub struct PodServiceMap {
    pods: DashMap<ResUid, Resource>,
    services: DashMap<ResUid, Resource>,
}

impl PodServiceMap {
    fn new() -> Self {
        Self::default()
    }
}

/// Indexed store for `ResType::SERVICE`: UID, `namespace/name`, and
/// cluster-IP lookups, plus the selector-to-pod endpoint matcher
/// (spec.md §4.B). The matcher subscribes to the companion `PodStore`'s
/// fan-out bus as an [`Exporter`] — wiring is done once at startup
/// (`meta-agent`'s registry assembly) — and keeps each service's `Endpoint`
/// relations in sync with the pods currently selected.
pub struct ServiceStore {
    core: ResourceListCore,
    uid_index: DashMap<ResUid, Resource>,
    ns_name_index: DashMap<String, ResUid>,
    ip_index: DashMap<String, ResUid>,
    namespaces: DashMap<String, Arc<PodServiceMap>>,
}

impl ServiceStore {
    pub fn new() -> Self {
        ServiceStore {
            core: ResourceListCore::new(ResType::SERVICE),
            uid_index: DashMap::new(),
            ns_name_index: DashMap::new(),
            ip_index: DashMap::new(),
            namespaces: DashMap::new(),
        }
    }

    fn namespace_entry(&self, namespace: String) -> Arc<PodServiceMap> {
        self.namespaces
            .entry(namespace)
            .or_insert_with(|| Arc::new(PodServiceMap::new()))
            .value()
            .clone()
    }

    fn index(&self, res: &Resource) {
        self.uid_index.insert(res.res_uid.clone(), res.clone());
        self.ns_name_index.insert(res.ns_name_key(), res.res_uid.clone());
        if let Some(ip) = res.string_attr.get(&AttrKey::SERVICE_IP) {
            if !ip.is_empty() {
                self.ip_index.insert(ip.clone(), res.res_uid.clone());
            }
        }
    }

    fn unindex(&self, res: &Resource) {
        self.uid_index.remove(&res.res_uid);
        self.ns_name_index.remove(&res.ns_name_key());
        if let Some(ip) = res.string_attr.get(&AttrKey::SERVICE_IP) {
            self.ip_index.remove(ip);
        }
        if let Some(map) = self.namespaces.get(res.namespace()) {
            map.services.remove(&res.res_uid);
        }
    }

    /// Recomputes the `Endpoint` relations for one service from the pods
    /// currently known in its namespace, and emits an `Update` event if
    /// the set changed.
    fn recompute_service_endpoints(&self, svc_uid: &ResUid) {
        let svc = match self.uid_index.get(svc_uid) {
            Some(s) => s.clone(),
            None => return,
        };
        let selectors = svc
            .string_attr
            .get(&AttrKey::SERVICE_SELECTORS)
            .map(|raw| parse_kv_attr(raw))
            .unwrap_or_default();
        if selectors.is_empty() {
            return;
        }
        let pods = self
            .namespaces
            .get(svc.namespace())
            .map(|m| m.pods.iter().map(|e| e.value().clone()).collect::<Vec<_>>())
            .unwrap_or_default();

        let mut new_relations: Vec<Relation> = pods
            .iter()
            .filter(|pod| match_pod(pod, &selectors))
            .map(|pod| {
                Relation::endpoint(
                    pod.res_uid.clone(),
                    pod.string_attr.get(&AttrKey::POD_IP).cloned().unwrap_or_default(),
                )
            })
            .collect();
        new_relations.sort_by(|a, b| a.res_uid.as_str().cmp(b.res_uid.as_str()));

        self.core.with_write_lock(|list| {
            let idx = match base::find_index(list, svc_uid) {
                Some(idx) => idx,
                None => return ((), None),
            };
            if list[idx].relations == new_relations {
                return ((), None);
            }
            list[idx].relations = new_relations;
            let updated = list[idx].clone();
            self.uid_index.insert(svc_uid.clone(), updated.clone());
            ((), Some(self.core.single_event(ResOperation::Update, updated)))
        });
    }

    fn recompute_namespace(&self, namespace: &str) {
        let svc_uids: Vec<ResUid> = self
            .namespaces
            .get(namespace)
            .map(|m| m.services.iter().map(|e| e.key().clone()).collect())
            .unwrap_or_default();
        for uid in svc_uids {
            self.recompute_service_endpoints(&uid);
        }
    }

    pub fn by_uid(&self, uid: &ResUid) -> Option<Service> {
        self.uid_index.get(uid).map(|r| Service::from_resource(r.clone()))
    }

    pub fn by_namespace_name(&self, namespace: &str, name: &str) -> Option<Service> {
        let key = format!("{namespace}/{name}");
        let uid = self.ns_name_index.get(&key)?;
        self.by_uid(&uid)
    }

    pub fn by_ip(&self, ip: &str) -> Option<Service> {
        let uid = self.ip_index.get(ip)?;
        self.by_uid(&uid)
    }
}

impl Default for ServiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore for ServiceStore {
    fn res_type(&self) -> ResType {
        self.core.res_type()
    }

    fn cluster_id(&self) -> String {
        self.core.cluster_id()
    }

    fn set_cluster_id(&self, cluster_id: &str) {
        self.core.set_cluster_id(cluster_id)
    }

    fn register_exporter(&self, exporter: Arc<dyn Exporter>) -> Result<(), CoreError> {
        self.core.register_exporter(exporter)
    }

    fn add(&self, res: Resource) {
        let namespace = res.namespace().to_string();
        self.core.with_write_lock(|list| {
            if let Some(idx) = base::find_index(list, &res.res_uid) {
                self.unindex(&list[idx].clone());
                list[idx] = res.clone();
                self.index(&res);
                ((), Some(self.core.single_event(ResOperation::Update, res.clone())))
            } else {
                self.index(&res);
                list.push(res.clone());
                ((), Some(self.core.single_event(ResOperation::Add, res.clone())))
            }
        });
        self.namespace_entry(namespace.clone())
            .services
            .insert(res.res_uid.clone(), res.clone());
        self.recompute_service_endpoints(&res.res_uid);
    }

    fn update(&self, res: Resource) {
        self.add(res);
    }

    fn delete(&self, res_uid: &ResUid) {
        self.core.with_write_lock(|list| match base::remove(list, res_uid) {
            Some(removed) => {
                self.unindex(&removed);
                ((), Some(self.core.single_event(ResOperation::Delete, removed)))
            }
            None => ((), None),
        });
    }

    fn reset(&self, list: Vec<Resource>) {
        self.core.log_reset();
        self.uid_index.clear();
        self.ns_name_index.clear();
        self.ip_index.clear();
        for map in self.namespaces.iter() {
            map.value().services.clear();
        }
        for res in &list {
            self.index(res);
            self.namespace_entry(res.namespace().to_string())
                .services
                .insert(res.res_uid.clone(), res.clone());
        }
        let event = self.core.reset_event(&list);
        self.core.with_write_lock(|res_list| {
            *res_list = list;
            ((), Some(event))
        });
        let namespaces: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        for ns in namespaces {
            self.recompute_namespace(&ns);
        }
    }

    fn snapshot(&self) -> Vec<Resource> {
        self.core.snapshot()
    }

    fn len(&self) -> usize {
        self.core.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Subscribed onto a `PodStore`'s fan-out bus so pod mutations drive
/// endpoint recomputation for the services that might select them.
impl Exporter for ServiceStore {
    fn export(&self, event: &ResourceEvent) {
        if event.resource_type != ResType::POD {
            return;
        }
        match event.operation {
            ResOperation::Reset => {
                for map in self.namespaces.iter() {
                    map.value().pods.clear();
                }
                for pod in &event.res {
                    self.namespace_entry(pod.namespace().to_string())
                        .pods
                        .insert(pod.res_uid.clone(), pod.clone());
                }
                let namespaces: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
                for ns in namespaces {
                    self.recompute_namespace(&ns);
                }
            }
            ResOperation::Add | ResOperation::Update => {
                for pod in &event.res {
                    let namespace = pod.namespace().to_string();
                    self.namespace_entry(namespace.clone())
                        .pods
                        .insert(pod.res_uid.clone(), pod.clone());
                    self.recompute_namespace(&namespace);
                }
            }
            ResOperation::Delete => {
                for pod in &event.res {
                    let namespace = pod.namespace().to_string();
                    if let Some(map) = self.namespaces.get(&namespace) {
                        map.pods.remove(&pod.res_uid);
                    }
                    self.recompute_namespace(&namespace);
                }
            }
        }
    }
}
