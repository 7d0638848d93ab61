//! Resource & event model (component A).
//!
//! Pure data types shared by every other component: the universal
//! [`Resource`] entity, the attribute-key and relation enumerations that
//! must stay stable across the wire, [`ResourceEvent`], and the checkpoint
//! handshake types consumed by the push protocol (component E/F).
//!
//! Nothing in this module performs I/O or holds a lock; it only carries
//! data and the few predicates `spec.md` §4.A calls out on [`SyncRequest`].

mod attrs;
mod event;
mod resource;

pub use attrs::{AttrKey, RelationType};
pub use event::{CheckPoint, ResOperation, ResourceEvent, SyncRequest, SyncResponse};
pub use resource::{Relation, ResType, ResUid, ResVersion, Resource};
