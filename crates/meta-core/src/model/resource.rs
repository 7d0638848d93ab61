use std::sync::Arc;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::attrs::{AttrKey, RelationType};

/// Globally unique resource identifier. Cheap to clone (`Arc<str>`) since
/// every derived index keys on it and a single mutation touches several
/// indexes at once.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResUid(pub Arc<str>);

impl ResUid {
    pub fn new(uid: impl Into<Arc<str>>) -> Self {
        Self(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T: Into<Arc<str>>> From<T> for ResUid {
    fn from(value: T) -> Self {
        ResUid(value.into())
    }
}

/// Monotonic-per-UID revision token. Only used to distinguish revisions,
/// never for cross-resource ordering (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ResVersion(pub String);

/// The resource-type tag. Drawn from a closed set for the well-known
/// types (`PodType`/`ServiceType`/`NodeType`) but left as an open integer
/// space: a push acceptor must accept and replicate types it does not
/// itself understand by falling back to a [`crate::store::GenericStore`]
/// (spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResType(pub i32);

impl ResType {
    pub const POD: ResType = ResType(1);
    pub const SERVICE: ResType = ResType(2);
    pub const NODE: ResType = ResType(3);
}

/// A typed relation from a resource to another resource's UID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(rename = "ResUID")]
    pub res_uid: ResUid,
    #[serde(rename = "ReType")]
    pub re_type: RelationType,
    #[serde(rename = "strAttrMap", default)]
    pub string_attr: HashMap<AttrKey, String>,
}

impl Relation {
    pub fn owner(res_uid: ResUid, owner_name: String, owner_type: String) -> Self {
        let mut string_attr = HashMap::with_capacity(2);
        string_attr.insert(AttrKey::OWNER_NAME, owner_name);
        string_attr.insert(AttrKey::OWNER_TYPE, owner_type);
        Relation {
            res_uid,
            re_type: RelationType::OWNER,
            string_attr,
        }
    }

    pub fn endpoint(pod_uid: ResUid, pod_ip: String) -> Self {
        let mut string_attr = HashMap::with_capacity(1);
        string_attr.insert(AttrKey::POD_IP, pod_ip);
        Relation {
            res_uid: pod_uid,
            re_type: RelationType::ENDPOINT,
            string_attr,
        }
    }
}

/// The universal entity replicated across the fabric: a pod, service,
/// node, or any future resource type, carried with three typed attribute
/// maps and a set of relations to other resources.
///
/// Stores never validate attribute *contents* (spec.md §4.B) — only the
/// presence of a UID is enforced, at construction time via
/// [`Resource::new`]/[`Resource::try_new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "ResUID")]
    pub res_uid: ResUid,
    #[serde(rename = "ResType")]
    pub res_type: ResType,
    #[serde(rename = "ResVersion")]
    pub res_version: ResVersion,
    #[serde(rename = "name")]
    pub name: String,
    #[serde(rename = "relations", default)]
    pub relations: Vec<Relation>,
    #[serde(rename = "strAttrMap", default)]
    pub string_attr: HashMap<AttrKey, String>,
    #[serde(rename = "int64AttrMap", default)]
    pub int64_attr: HashMap<AttrKey, i64>,
    #[serde(rename = "extraInfo", default)]
    pub extra_attr: HashMap<AttrKey, HashMap<String, String>>,
}

impl Resource {
    pub fn new(res_uid: impl Into<ResUid>, res_type: ResType, name: impl Into<String>) -> Self {
        Resource {
            res_uid: res_uid.into(),
            res_type,
            res_version: ResVersion::default(),
            name: name.into(),
            relations: Vec::new(),
            string_attr: HashMap::new(),
            int64_attr: HashMap::new(),
            extra_attr: HashMap::new(),
        }
    }

    /// A resource with an empty UID is malformed (spec.md §4.B) and is
    /// rejected by the caller before it ever reaches a store.
    pub fn is_well_formed(&self) -> bool {
        !self.res_uid.as_str().is_empty()
    }

    pub fn namespace(&self) -> &str {
        self.string_attr
            .get(&AttrKey::NAMESPACE)
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn ns_name_key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_uid_is_malformed() {
        let res = Resource::new("", ResType::POD, "pod-a");
        assert!(!res.is_well_formed());
    }

    #[test]
    fn non_empty_uid_is_well_formed() {
        let res = Resource::new("uid-1", ResType::POD, "pod-a");
        assert!(res.is_well_formed());
    }

    #[test]
    fn ns_name_key_defaults_to_empty_namespace() {
        let res = Resource::new("uid-1", ResType::POD, "pod-a");
        assert_eq!(res.ns_name_key(), "/pod-a");
    }

    #[test]
    fn ns_name_key_uses_namespace_attribute() {
        let mut res = Resource::new("uid-1", ResType::POD, "pod-a");
        res.string_attr.insert(AttrKey::NAMESPACE, "default".to_string());
        assert_eq!(res.ns_name_key(), "default/pod-a");
    }
}
