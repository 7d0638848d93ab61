//! Typed resource stores (component B).
//!
//! Each store type keeps one ordered `ResList` plus a set of derived
//! indexes for a single `(cluster, resource-type)` pair, per spec.md §3-4.
//! Mutations are serialized by `ResList`'s write lock; the event emitted
//! for a mutation is enqueued to the fan-out bus (component D) from
//! inside that same critical section, which is what gives every consumer
//! per-(cluster,type) FIFO delivery (spec.md §5).
//!
//! `ResourceStore` is the capability set spec.md §9 calls out: concrete
//! stores add read-only, type-specific accessors beyond it. Since the
//! cluster registry (component C) and the query engine (component I) both
//! need to hold a heterogeneous collection of stores and later recover the
//! concrete type, `ResourceStore` extends `Any` the way the Go original's
//! `handler.(*PodList)` type assertions recover theirs.

mod base;
mod generic;
mod node;
mod pod;
mod service;

pub use generic::GenericStore;
pub use node::NodeStore;
pub use pod::{PodIndexSnapshot, PodStore, POD_PHASE_PENDING, POD_PHASE_RUNNING};
pub use service::{PodServiceMap, Service, ServiceStore};

use std::any::Any;
use std::sync::Arc;

use crate::bus::Exporter;
use crate::error::CoreError;
use crate::model::{ResType, Resource};

/// Capability set every typed store implements (spec.md §9).
pub trait ResourceStore: Any + Send + Sync {
    fn res_type(&self) -> ResType;

    fn cluster_id(&self) -> String;
    fn set_cluster_id(&self, cluster_id: &str);

    fn register_exporter(&self, exporter: Arc<dyn Exporter>) -> Result<(), CoreError>;

    /// Upsert: appends `res` if its UID is new (emits `Add`), otherwise
    /// overwrites the existing entry in place (emits `Update`). Add and
    /// Update are intentionally the same operation (spec.md §4.B
    /// "Add-or-update collapse") — both public entry points route here so
    /// that two `add()` calls with the same UID still converge correctly.
    fn add(&self, res: Resource);
    fn update(&self, res: Resource);

    /// No-op if the UID is not present (spec.md §4.B: "idempotent").
    fn delete(&self, res_uid: &crate::model::ResUid);

    /// Replaces `ResList` and rebuilds every derived index from scratch.
    fn reset(&self, list: Vec<Resource>);

    /// A read-locked snapshot of the current `ResList`, used for Init/Reset
    /// fan-out (push exporter init batch, fetch server initial snapshot).
    fn snapshot(&self) -> Vec<Resource>;

    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

impl dyn ResourceStore {
    pub fn downcast_ref<T: ResourceStore>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}
