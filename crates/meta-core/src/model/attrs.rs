//! The attribute-key and relation-type enumerations.
//!
//! These numeric values are part of the wire contract (`spec.md` §6) and
//! must stay identical across every agent and aggregator in a fabric. They
//! are intentionally plain `i32` newtypes rather than a closed Rust `enum`:
//! an aggregator built against an older revision of this crate must still
//! be able to round-trip attribute keys it doesn't recognize (a Generic
//! store, for instance, never interprets attributes at all), so the wire
//! representation stays an open integer space instead of a deny-unknown
//! enum.

use serde::{Deserialize, Serialize};

/// A key into one of [`crate::model::Resource`]'s three attribute maps.
///
/// Values below `0x0100` are attached to resources directly (Pod/Service/
/// Node attributes); values at `0x0111`/`0x0112` are attached to
/// [`crate::model::Relation`] attribute maps (currently only `Owner`
/// relations carry attributes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttrKey(pub i32);

impl AttrKey {
    // Pod
    pub const NAMESPACE: AttrKey = AttrKey(0x0000);
    pub const CONTAINER_IDS: AttrKey = AttrKey(0x0010);
    pub const POD_LABELS: AttrKey = AttrKey(0x0011);
    pub const POD_IP: AttrKey = AttrKey(0x0012);
    pub const PHASE: AttrKey = AttrKey(0x0013);
    pub const HOST_NAME: AttrKey = AttrKey(0x0014);
    pub const HOST_IP: AttrKey = AttrKey(0x0015);
    pub const HOST_NETWORK: AttrKey = AttrKey(0x0016);

    // Service
    pub const SERVICE_SELECTORS: AttrKey = AttrKey(0x0020);
    pub const SERVICE_IP: AttrKey = AttrKey(0x0021);
    pub const SERVICE_ENDPOINTS: AttrKey = AttrKey(0x0022);
    pub const SERVICE_PORTS_TO_TARGET_PORTS: AttrKey = AttrKey(0x0023);

    // Node
    pub const NODE_INTERNAL_IP: AttrKey = AttrKey(0x0030);
    pub const NODE_EXTERNAL_IP: AttrKey = AttrKey(0x0031);
    pub const NODE_HOST_NAME: AttrKey = AttrKey(0x0032);

    // Owner relation
    pub const OWNER_NAME: AttrKey = AttrKey(0x0111);
    pub const OWNER_TYPE: AttrKey = AttrKey(0x0112);
}

/// Relation kind attached to a [`crate::model::Relation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationType(pub i32);

impl RelationType {
    pub const OWNER: RelationType = RelationType(0x0001);
    pub const ENDPOINT: RelationType = RelationType(0x0003);
}
