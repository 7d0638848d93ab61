use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;

use crate::bus::Exporter;
use crate::error::CoreError;
use crate::model::{AttrKey, ResOperation, ResType, ResUid, Resource};

use super::base::{self, ResourceListCore};
use super::ResourceStore;

fn node_ip(res: &Resource) -> Option<&str> {
    res.string_attr
        .get(&AttrKey::NODE_INTERNAL_IP)
        .or_else(|| res.string_attr.get(&AttrKey::NODE_EXTERNAL_IP))
        .map(String::as_str)
}

/// Indexed store for `ResType::NODE`: UID and IP lookups, preferring the
/// internal IP over the external one when both are set, since every
/// in-cluster caller addresses a node by its internal address (spec.md
/// §4.B).
pub struct NodeStore {
    core: ResourceListCore,
    uid_index: DashMap<ResUid, Resource>,
    ip_index: DashMap<String, ResUid>,
}

impl NodeStore {
    pub fn new() -> Self {
        NodeStore {
            core: ResourceListCore::new(ResType::NODE),
            uid_index: DashMap::new(),
            ip_index: DashMap::new(),
        }
    }

    fn index(&self, res: &Resource) {
        self.uid_index.insert(res.res_uid.clone(), res.clone());
        if let Some(ip) = node_ip(res) {
            if !ip.is_empty() {
                self.ip_index.insert(ip.to_string(), res.res_uid.clone());
            }
        }
    }

    fn unindex(&self, res: &Resource) {
        self.uid_index.remove(&res.res_uid);
        if let Some(ip) = node_ip(res) {
            self.ip_index.remove(ip);
        }
    }

    pub fn by_uid(&self, uid: &ResUid) -> Option<Resource> {
        self.uid_index.get(uid).map(|r| r.clone())
    }

    pub fn by_ip(&self, ip: &str) -> Option<Resource> {
        let uid = self.ip_index.get(ip)?;
        self.by_uid(&uid)
    }
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceStore for NodeStore {
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
