use serde::{Deserialize, Serialize};

use super::resource::{ResType, Resource};

/// Operation carried by a [`ResourceEvent`]. Numeric values are part of the
/// wire contract (spec.md §6): Add=0, Update=1, Delete=2, Reset=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ResOperation {
    Add = 0,
    Update = 1,
    Delete = 2,
    Reset = 3,
}

/// A single replication event: an operation on one cluster/type, carrying
/// either a single affected resource (Add/Update/Delete) or the full
/// intended state for the (cluster, type) pair (Reset).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceEvent {
    #[serde(rename = "ClusterID")]
    pub cluster_id: String,
    #[serde(rename = "Res")]
    pub res: Vec<Resource>,
    #[serde(rename = "ResourceType")]
    pub resource_type: ResType,
    #[serde(rename = "Operation")]
    pub operation: ResOperation,
}

impl ResourceEvent {
    pub fn reset(cluster_id: impl Into<String>, resource_type: ResType, res: Vec<Resource>) -> Self {
        ResourceEvent {
            cluster_id: cluster_id.into(),
            res,
            resource_type,
            operation: ResOperation::Reset,
        }
    }

    pub fn single(
        cluster_id: impl Into<String>,
        resource_type: ResType,
        operation: ResOperation,
        res: Resource,
    ) -> Self {
        ResourceEvent {
            cluster_id: cluster_id.into(),
            res: vec![res],
            resource_type,
            operation,
        }
    }
}

/// Checkpoint triple exchanged during the push resync handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPoint {
    #[serde(rename = "AgentIndex")]
    pub agent_index: i64,
    #[serde(rename = "Timestamp")]
    pub timestamp: i64,
    #[serde(rename = "EventIndex")]
    pub event_index: i64,
}

impl CheckPoint {
    pub fn matches(&self, other: &CheckPoint) -> bool {
        self.timestamp == other.timestamp && self.event_index == other.event_index
    }
}

/// A batch sent by the push exporter to the push acceptor (spec.md §6).
///
/// The three predicates below classify the request per spec.md §4.A:
/// - [`SyncRequest::is_health_check`]: `last_checkpoint` and `checkpoint`
///   are both absent — a bare liveness probe carrying no data.
/// - [`SyncRequest::is_sync_check`]: `last_checkpoint` is present but
///   `checkpoint` and `events` are absent — "are we still in sync?".
/// - [`SyncRequest::is_init_request`]: `last_checkpoint` is absent but
///   `checkpoint` is present — a full-state Reset batch.
/// - Otherwise this is a normal incremental batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncRequest {
    #[serde(rename = "Events", default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<ResourceEvent>>,
    #[serde(rename = "LastCheckPoint", default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<CheckPoint>,
    #[serde(rename = "CheckPoint", default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<CheckPoint>,
}

impl SyncRequest {
    pub fn health_check() -> Self {
        SyncRequest::default()
    }

    pub fn sync_check(last_checkpoint: CheckPoint) -> Self {
        SyncRequest {
            events: None,
            last_checkpoint: Some(last_checkpoint),
            checkpoint: None,
        }
    }

    pub fn batch(
        events: Vec<ResourceEvent>,
        last_checkpoint: Option<CheckPoint>,
        checkpoint: CheckPoint,
    ) -> Self {
        SyncRequest {
            events: Some(events),
            last_checkpoint,
            checkpoint: Some(checkpoint),
        }
    }

    pub fn is_health_check(&self) -> bool {
        self.last_checkpoint.is_none() && self.checkpoint.is_none()
    }

    pub fn is_sync_check(&self) -> bool {
        self.last_checkpoint.is_some() && self.checkpoint.is_none() && self.events.is_none()
    }

    pub fn is_init_request(&self) -> bool {
        self.last_checkpoint.is_none() && self.checkpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(event_index: i64) -> CheckPoint {
        CheckPoint {
            agent_index: 1,
            timestamp: 1_000,
            event_index,
        }
    }

    #[test]
    fn health_check_has_no_checkpoints() {
        let req = SyncRequest::health_check();
        assert!(req.is_health_check());
        assert!(!req.is_sync_check());
        assert!(!req.is_init_request());
    }

    #[test]
    fn sync_check_carries_only_last_checkpoint() {
        let req = SyncRequest::sync_check(checkpoint(5));
        assert!(!req.is_health_check());
        assert!(req.is_sync_check());
        assert!(!req.is_init_request());
    }

    #[test]
    fn batch_with_no_last_checkpoint_is_init_request() {
        let req = SyncRequest::batch(Vec::new(), None, checkpoint(0));
        assert!(!req.is_health_check());
        assert!(!req.is_sync_check());
        assert!(req.is_init_request());
    }

    #[test]
    fn batch_with_last_checkpoint_is_neither() {
        let req = SyncRequest::batch(Vec::new(), Some(checkpoint(4)), checkpoint(5));
        assert!(!req.is_health_check());
        assert!(!req.is_sync_check());
        assert!(!req.is_init_request());
    }

    #[test]
    fn checkpoint_matches_ignores_agent_index() {
        let a = CheckPoint { agent_index: 1, timestamp: 10, event_index: 2 };
        let b = CheckPoint { agent_index: 2, timestamp: 10, event_index: 2 };
        assert!(a.matches(&b));
    }
}

/// Response to a [`SyncRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(rename = "LastCheckPoint", default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<CheckPoint>,
    #[serde(rename = "IsStopPush", default)]
    pub is_stop_push: bool,
    #[serde(rename = "IsInit", default)]
    pub is_init: bool,
    #[serde(rename = "IsAccepted", default)]
    pub is_accepted: bool,
}
