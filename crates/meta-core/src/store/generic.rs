use std::any::Any;
use std::sync::Arc;

use crate::bus::Exporter;
use crate::error::CoreError;
use crate::model::{ResOperation, ResType, ResUid, Resource};

use super::base::{self, ResourceListCore};
use super::ResourceStore;

/// The fallback store for resource types nobody has a typed handler for:
/// `ResList` only, no derived indexes. Used by the push acceptor when it
/// sees a `ResourceType` it doesn't recognize (spec.md §4.F: "creating a
/// generic store on demand for unknown types").
pub struct GenericStore {
    core: ResourceListCore,
}

impl GenericStore {
    pub fn new(res_type: ResType) -> Self {
        GenericStore {
            core: ResourceListCore::new(res_type),
        }
    }
}

impl ResourceStore for GenericStore {
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
            let (_old, was_update) = base::upsert(list, res.clone());
            let op = if was_update { ResOperation::Update } else { ResOperation::Add };
            ((), Some(self.core.single_event(op, res)))
        });
    }

    fn update(&self, res: Resource) {
        self.add(res);
    }

    fn delete(&self, res_uid: &ResUid) {
        self.core.with_write_lock(|list| {
            match base::remove(list, res_uid) {
                Some(removed) => ((), Some(self.core.single_event(ResOperation::Delete, removed))),
                None => ((), None),
            }
        });
    }

    fn reset(&self, list: Vec<Resource>) {
        self.core.log_reset();
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
    use crate::bus::Exporter;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    struct RecordingExporter {
        ops: Mutex<Vec<ResOperation>>,
    }

    impl Exporter for RecordingExporter {
        fn export(&self, event: &crate::model::ResourceEvent) {
            self.ops.lock().push(event.operation);
        }
    }

    #[test]
    fn second_add_with_same_uid_emits_update_not_add() {
        let store = GenericStore::new(ResType(99));
        let recorder = Arc::new(RecordingExporter { ops: Mutex::new(Vec::new()) });
        store.register_exporter(recorder.clone()).unwrap();

        store.add(Resource::new("uid-1", ResType(99), "first"));
        store.add(Resource::new("uid-1", ResType(99), "second"));

        assert_eq!(*recorder.ops.lock(), vec![ResOperation::Add, ResOperation::Update]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].name, "second");
    }

    #[test]
    fn delete_of_absent_uid_is_a_no_op() {
        let store = GenericStore::new(ResType(99));
        store.delete(&ResUid::new("nothing-here"));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn reset_replaces_the_whole_list() {
        let store = GenericStore::new(ResType(99));
        store.add(Resource::new("uid-1", ResType(99), "first"));
        store.reset(vec![Resource::new("uid-2", ResType(99), "second")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.snapshot()[0].res_uid, ResUid::new("uid-2"));
    }

    proptest! {
        /// For any sequence of adds over a small fixed set of UIDs, the
        /// store's final size is the number of distinct UIDs touched, and
        /// the registered exporter sees every mutation in the exact order
        /// it was issued (spec.md §5's per-(cluster,type) FIFO guarantee,
        /// and Invariant 5's add-or-update collapse).
        #[test]
        fn add_sequence_collapses_to_distinct_uids_in_fifo_order(uids in prop::collection::vec(0..4i32, 1..30)) {
            let store = GenericStore::new(ResType(99));
            let recorder = Arc::new(RecordingExporter { ops: Mutex::new(Vec::new()) });
            store.register_exporter(recorder.clone()).unwrap();

            let mut seen = std::collections::HashSet::new();
            let mut expected_ops = Vec::new();
            for uid in &uids {
                let op = if seen.insert(*uid) { ResOperation::Add } else { ResOperation::Update };
                expected_ops.push(op);
                store.add(Resource::new(uid.to_string(), ResType(99), uid.to_string()));
            }

            prop_assert_eq!(store.len(), seen.len());
            prop_assert_eq!(recorder.ops.lock().clone(), expected_ops);
        }
    }
}
