use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::bus::{Exporter, FanOutBus};
use crate::error::CoreError;
use crate::model::{ResOperation, ResType, Resource, ResourceEvent};

/// Shared plumbing every typed store is built on: the ordered `ResList`,
/// the cluster-id it emits events under, and the fan-out bus. Typed stores
/// embed this and layer derived indexes on top, keeping the index
/// maintenance under the same `res_list` write-lock critical section.
pub struct ResourceListCore {
    res_type: ResType,
    res_list: RwLock<Vec<Resource>>,
    cluster_id: RwLock<String>,
    bus: FanOutBus,
    len: AtomicI64,
}

impl ResourceListCore {
    pub fn new(res_type: ResType) -> Self {
        ResourceListCore {
            res_type,
            res_list: RwLock::new(Vec::new()),
            cluster_id: RwLock::new(String::new()),
            bus: FanOutBus::new(),
            len: AtomicI64::new(0),
        }
    }

    pub fn res_type(&self) -> ResType {
        self.res_type
    }

    pub fn cluster_id(&self) -> String {
        self.cluster_id.read().clone()
    }

    pub fn set_cluster_id(&self, cluster_id: &str) {
        *self.cluster_id.write() = cluster_id.to_string();
    }

    pub fn register_exporter(&self, exporter: Arc<dyn Exporter>) -> Result<(), CoreError> {
        self.bus.register(exporter)
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed).max(0) as usize
    }

    /// Runs `mutate` while holding the `ResList` write lock, then emits
    /// `event` from inside that same critical section (spec.md §5: "the
    /// event emitted for a mutation is enqueued within that same critical
    /// section").
    pub fn with_write_lock<F, R>(&self, mutate: F) -> R
    where
        F: FnOnce(&mut Vec<Resource>) -> (R, Option<ResourceEvent>),
    {
        let mut guard = self.res_list.write();
        let (result, event) = mutate(&mut guard);
        self.len.store(guard.len() as i64, Ordering::Relaxed);
        if let Some(event) = event {
            self.bus.deliver(&event);
        }
        drop(guard);
        result
    }

    pub fn snapshot(&self) -> Vec<Resource> {
        self.res_list.read().clone()
    }

    pub fn reset_event(&self, list: &[Resource]) -> ResourceEvent {
        ResourceEvent::reset(self.cluster_id(), self.res_type, list.to_vec())
    }

    pub fn single_event(&self, operation: ResOperation, res: Resource) -> ResourceEvent {
        ResourceEvent::single(self.cluster_id(), self.res_type, operation, res)
    }

    pub fn log_reset(&self) {
        info!(cluster_id = %self.cluster_id(), res_type = self.res_type.0, "reset resources and emit reset event");
    }

    pub fn log_mutation(&self, op: &str, uid: &str) {
        debug!(cluster_id = %self.cluster_id(), res_type = self.res_type.0, uid, op, "resource mutation");
    }
}

/// Finds `uid` in `list`, returning its index if present.
pub fn find_index(list: &[Resource], uid: &crate::model::ResUid) -> Option<usize> {
    list.iter().position(|r| &r.res_uid == uid)
}

/// Implements the Add-or-update collapse shared by every store: overwrite
/// in place if the UID exists (returns the prior value and `true`),
/// otherwise append (returns `None` and `false`).
pub fn upsert(list: &mut Vec<Resource>, res: Resource) -> (Option<Resource>, bool) {
    if let Some(idx) = find_index(list, &res.res_uid) {
        let old = std::mem::replace(&mut list[idx], res);
        (Some(old), true)
    } else {
        list.push(res);
        (None, false)
    }
}

pub fn remove(list: &mut Vec<Resource>, uid: &crate::model::ResUid) -> Option<Resource> {
    find_index(list, uid).map(|idx| list.remove(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResType;

    #[test]
    fn upsert_appends_new_uid() {
        let mut list = Vec::new();
        let (old, was_update) = upsert(&mut list, Resource::new("uid-1", ResType::POD, "pod-a"));
        assert!(old.is_none());
        assert!(!was_update);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn upsert_collapses_second_add_into_update() {
        let mut list = Vec::new();
        upsert(&mut list, Resource::new("uid-1", ResType::POD, "pod-a"));
        let (old, was_update) = upsert(&mut list, Resource::new("uid-1", ResType::POD, "pod-a-renamed"));
        assert!(old.is_some());
        assert!(was_update);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "pod-a-renamed");
    }

    #[test]
    fn remove_missing_uid_is_none() {
        let mut list = vec![Resource::new("uid-1", ResType::POD, "pod-a")];
        let removed = remove(&mut list, &crate::model::ResUid::new("uid-missing"));
        assert!(removed.is_none());
        assert_eq!(list.len(), 1);
    }
}
