use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::bus::Exporter;
use crate::error::CoreError;
use crate::model::{AttrKey, ResOperation, ResType, ResUid, Resource};

use super::base::{self, ResourceListCore};
use super::ResourceStore;

/// `phase` attribute values the original cluster control plane sets; kept
/// here rather than in `model::attrs` because only the pod store interprets
/// them.
pub const POD_PHASE_RUNNING: &str = "Running";
pub const POD_PHASE_PENDING: &str = "Pending";

/// A read-only, point-in-time view of the derived indexes, used by the
/// query engine (component I) to answer pod lookups without holding any
/// lock across the call.
#[derive(Default, Clone)]
pub struct PodIndexSnapshot {
    pub by_uid: Vec<(ResUid, Resource)>,
}

/// Indexed store for `ResType::POD`: besides the ordered `ResList`, keeps
/// UID, `namespace/name`, per-container-id, and pod-IP lookups (spec.md
/// §4.B). Container ids are truncated to 12 characters before indexing,
/// matching the short-id convention the original container runtime events
/// use (spec.md Invariant 9 / Scenario S1).
pub struct PodStore {
    core: ResourceListCore,
    uid_index: DashMap<ResUid, Resource>,
    ns_name_index: DashMap<String, ResUid>,
    container_id_index: DashMap<String, ResUid>,
    ip_index: DashMap<String, ResUid>,
}

fn truncate_container_id(id: &str) -> &str {
    let end = id.char_indices().nth(12).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}

fn container_ids(res: &Resource) -> Vec<String> {
    res.string_attr
        .get(&AttrKey::CONTAINER_IDS)
        .map(|joined| {
            joined
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(truncate_container_id)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn is_host_network(res: &Resource) -> bool {
    res.string_attr
        .get(&AttrKey::HOST_NETWORK)
        .map(|v| v == "true")
        .unwrap_or(false)
}

fn pod_ip(res: &Resource) -> Option<&str> {
    res.string_attr.get(&AttrKey::POD_IP).map(String::as_str)
}

impl PodStore {
    pub fn new() -> Self {
        PodStore {
            core: ResourceListCore::new(ResType::POD),
            uid_index: DashMap::new(),
            ns_name_index: DashMap::new(),
            container_id_index: DashMap::new(),
            ip_index: DashMap::new(),
        }
    }

    fn unindex(&self, res: &Resource) {
        self.uid_index.remove(&res.res_uid);
        self.ns_name_index.remove(&res.ns_name_key());
        for cid in container_ids(res) {
            self.container_id_index.remove(&cid);
        }
        if !is_host_network(res) {
            if let Some(ip) = pod_ip(res) {
                if !ip.is_empty() {
                    self.ip_index.remove(ip);
                }
            }
        }
    }

    fn index(&self, res: &Resource) {
        self.uid_index.insert(res.res_uid.clone(), res.clone());
        self.ns_name_index
            .insert(res.ns_name_key(), res.res_uid.clone());
        for cid in container_ids(res) {
            self.container_id_index.insert(cid, res.res_uid.clone());
        }
        if !is_host_network(res) {
            if let Some(ip) = pod_ip(res) {
                if !ip.is_empty() {
                    self.ip_index.insert(ip.to_string(), res.res_uid.clone());
                }
            }
        }
    }

    pub fn by_uid(&self, uid: &ResUid) -> Option<Resource> {
        self.uid_index.get(uid).map(|r| r.clone())
    }

    pub fn by_namespace_name(&self, namespace: &str, name: &str) -> Option<Resource> {
        let key = format!("{namespace}/{name}");
        let uid = self.ns_name_index.get(&key)?;
        self.by_uid(&uid)
    }

    /// Looks a pod up by container id, truncating `container_id` to 12
    /// characters the same way the index does (spec.md Invariant 9).
    pub fn by_container_id(&self, container_id: &str) -> Option<Resource> {
        let short = truncate_container_id(container_id);
        let uid = self.container_id_index.get(short)?;
        self.by_uid(&uid)
    }

    pub fn by_ip(&self, ip: &str) -> Option<Resource> {
        let uid = self.ip_index.get(ip)?;
        self.by_uid(&uid)
    }

    pub fn snapshot_indexes(&self) -> PodIndexSnapshot {
        PodIndexSnapshot {
            by_uid: self
                .uid_index
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }
}

impl Default for PodStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore for PodStore {
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
        self.core.with_write_lock(|list| {
            if let Some(idx) = base::find_index(list, &res.res_uid) {
                self.unindex(&list[idx]);
                list[idx] = res.clone();
                self.index(&res);
                ((), Some(self.core.single_event(ResOperation::Update, res)))
            } else {
                self.index(&res);
                list.push(res.clone());
                ((), Some(self.core.single_event(ResOperation::Add, res)))
            }
        });
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
        self.container_id_index.clear();
        self.ip_index.clear();
        for res in &list {
            self.index(res);
        }
        let event = self.core.reset_event(&list);
        self.core.with_write_lock(|res_list| {
            *res_list = list;
            ((), Some(event))
        });
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

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingExporter {
        ops: Mutex<Vec<ResOperation>>,
    }

    impl RecordingExporter {
        fn new() -> Self {
            RecordingExporter { ops: Mutex::new(Vec::new()) }
        }

        fn ops(&self) -> Vec<ResOperation> {
            self.ops.lock().clone()
        }
    }

    impl Exporter for RecordingExporter {
        fn export(&self, event: &crate::model::ResourceEvent) {
            self.ops.lock().push(event.operation);
        }
    }

    fn pod_with_container(uid: &str, long_container_id: &str) -> Resource {
        let mut res = Resource::new(uid, ResType::POD, "pod-a");
        res.string_attr
            .insert(AttrKey::CONTAINER_IDS, long_container_id.to_string());
        res
    }

    #[test]
    fn container_id_lookup_truncates_to_twelve_chars() {
        let store = PodStore::new();
        let long_id = "docker://abcdef0123456789fullsha";
        store.add(pod_with_container("uid-1", long_id));

        let found = store.by_container_id(long_id).expect("pod should be found by full id");
        assert_eq!(found.res_uid, ResUid::new("uid-1"));

        let found_short = store
            .by_container_id(&long_id[..12])
            .expect("pod should be found by the truncated id directly");
        assert_eq!(found_short.res_uid, ResUid::new("uid-1"));
    }

    #[test]
    fn host_network_pod_is_excluded_from_ip_index() {
        let store = PodStore::new();
        let mut res = Resource::new("uid-1", ResType::POD, "pod-a");
        res.string_attr.insert(AttrKey::POD_IP, "10.0.0.5".to_string());
        res.string_attr.insert(AttrKey::HOST_NETWORK, "true".to_string());
        store.add(res);

        assert!(store.by_ip("10.0.0.5").is_none());
        assert!(store.by_uid(&ResUid::new("uid-1")).is_some());
    }

    #[test]
    fn non_host_network_pod_is_indexed_by_ip() {
        let store = PodStore::new();
        let mut res = Resource::new("uid-1", ResType::POD, "pod-a");
        res.string_attr.insert(AttrKey::POD_IP, "10.0.0.5".to_string());
        store.add(res);

        assert_eq!(store.by_ip("10.0.0.5").unwrap().res_uid, ResUid::new("uid-1"));
    }

    #[test]
    fn update_with_same_uid_moves_ip_index_and_emits_update_event() {
        let store = PodStore::new();
        let mut res = pod_with_container("p1", "286b025a9464cb00000000");
        res.string_attr.insert(AttrKey::POD_IP, "10.0.0.1".to_string());
        store.add(res.clone());
        assert_eq!(store.len(), 1);
        assert!(store.by_ip("10.0.0.1").is_some());

        let recorder = Arc::new(RecordingExporter::new());
        store.register_exporter(recorder.clone()).unwrap();

        res.string_attr.insert(AttrKey::POD_IP, "10.0.0.2".to_string());
        store.add(res);

        assert_eq!(store.len(), 1);
        assert!(store.by_ip("10.0.0.1").is_none());
        assert_eq!(store.by_ip("10.0.0.2").unwrap().res_uid, ResUid::new("p1"));

        assert_eq!(recorder.ops(), vec![ResOperation::Update]);
    }

    #[test]
    fn delete_removes_every_derived_index() {
        let store = PodStore::new();
        let long_id = "abcdef0123456789";
        let mut res = pod_with_container("uid-1", long_id);
        res.string_attr.insert(AttrKey::POD_IP, "10.0.0.5".to_string());
        store.add(res);

        store.delete(&ResUid::new("uid-1"));

        assert!(store.by_uid(&ResUid::new("uid-1")).is_none());
        assert!(store.by_container_id(long_id).is_none());
        assert!(store.by_ip("10.0.0.5").is_none());
        assert_eq!(store.len(), 0);
    }
}
