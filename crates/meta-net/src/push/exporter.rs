//! Push exporter (component E).
//!
//! Registered on every store an agent owns as a [`meta_core::bus::Exporter`];
//! every mutation is queued and shipped to the acceptor by a background
//! worker task on a fixed tick, independent of how fast mutations arrive.
//! The worker cycles through three states:
//!
//! - **NotReady**: no accepted session with the acceptor yet. Probes with a
//!   bare health check until one succeeds.
//! - **init push**: right after a health check succeeds, sends one `Reset`
//!   event per store so the acceptor starts from a known-complete state
//!   (spec.md §4.E "full resync on (re)connect").
//! - **Healthy**: steady-state batch push on every tick, with a periodic
//!   sync check to make sure the acceptor hasn't lost or diverged from the
//!   agent's checkpoint. Either an explicit `IsStopPush` response or a
//!   failed sync check drops back to `NotReady`.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};

use meta_core::bus::Exporter;
use meta_core::model::{CheckPoint, ResourceEvent, SyncRequest};
use meta_core::store::ResourceStore;

use crate::error::{NetError, NetResult};

#[derive(Debug, Clone)]
pub struct PushExporterConfig {
    pub acceptor_url: String,
    pub tick_interval: Duration,
    pub health_check_interval: Duration,
    /// Bound on the internal event queue.
    pub queue_capacity: usize,
    /// How long `export()` blocks trying to enqueue an event before giving
    /// up and marking the exporter not-ready (spec.md §5: "push delivery
    /// has a 10s enqueue deadline"; §7(d)).
    pub enqueue_timeout: Duration,
}

impl Default for PushExporterConfig {
    fn default() -> Self {
        PushExporterConfig {
            acceptor_url: String::new(),
            tick_interval: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(5),
            queue_capacity: 10_000,
            enqueue_timeout: Duration::from_secs(10),
        }
    }
}

/// The `Exporter` handle registered on stores. Cheap to clone; every clone
/// forwards into the same worker queue.
pub struct PushExporter {
    tx: mpsc::Sender<ResourceEvent>,
    enqueue_timeout: Duration,
    backpressure: Arc<AtomicBool>,
}

impl Exporter for PushExporter {
    /// Blocks the caller up to `enqueue_timeout` trying to hand the event
    /// to the worker queue (spec.md §5's 10s enqueue deadline). A store's
    /// write lock is held for the duration of this call, same as every
    /// other exporter's `export`, so a slow worker here slows every writer
    /// to this store — matching the original's unbuffered-channel send.
    fn export(&self, event: &ResourceEvent) {
        let tx = self.tx.clone();
        let event = event.clone();
        let timeout = self.enqueue_timeout;
        let outcome = tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(tokio::time::timeout(timeout, tx.send(event)))
        });
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("push exporter queue closed, dropping event"),
            Err(_elapsed) => {
                self.backpressure.store(true, Ordering::Relaxed);
                let error = NetError::Backpressure(timeout);
                warn!(%error, "dropping event, exporter will re-init");
            }
        }
    }
}

#[derive(Clone, Copy)]
enum ExporterState {
    NotReady,
    Healthy,
}

/// Owns the receiving half of the queue and drives the HTTP push loop.
/// Spawn [`PushExporterWorker::run`] as its own task once at startup.
pub struct PushExporterWorker {
    rx: mpsc::Receiver<ResourceEvent>,
    config: PushExporterConfig,
    http: reqwest::Client,
    stores: Vec<Arc<dyn ResourceStore>>,
    agent_index: AtomicI64,
    event_index: AtomicI64,
    state: ExporterState,
    backpressure: Arc<AtomicBool>,
}

/// Builds the paired handle/worker. The handle is registered on stores;
/// the worker is spawned once by the caller (typically `meta-agent`'s
/// wiring code).
pub fn new_push_exporter(
    config: PushExporterConfig,
    stores: Vec<Arc<dyn ResourceStore>>,
) -> (Arc<PushExporter>, PushExporterWorker) {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .build()
        .expect("reqwest client with a fixed connect timeout should always build");
    let backpressure = Arc::new(AtomicBool::new(false));
    let handle = Arc::new(PushExporter {
        tx,
        enqueue_timeout: config.enqueue_timeout,
        backpressure: backpressure.clone(),
    });
    let worker = PushExporterWorker {
        rx,
        config,
        http,
        stores,
        agent_index: AtomicI64::new(0),
        event_index: AtomicI64::new(0),
        state: ExporterState::NotReady,
        backpressure,
    };
    (handle, worker)
}

impl PushExporterWorker {
    async fn post(&self, req: &SyncRequest) -> NetResult<meta_core::model::SyncResponse> {
        let response = self
            .http
            .post(&self.config.acceptor_url)
            .header("X-Data-Flow", "meta-push")
            .json(req)
            .send()
            .await
            .map_err(|source| NetError::Transport {
                peer: self.config.acceptor_url.clone(),
                source,
            })?;
        let body = response.json().await.map_err(|source| NetError::Transport {
            peer: self.config.acceptor_url.clone(),
            source,
        })?;
        Ok(body)
    }

    fn checkpoint(&self, event_index: i64) -> CheckPoint {
        CheckPoint {
            agent_index: self.agent_index.load(Ordering::Relaxed),
            timestamp: event_index,
            event_index,
        }
    }

    async fn health_check(&mut self) -> bool {
        match self.post(&SyncRequest::health_check()).await {
            Ok(response) => {
                if let Some(checkpoint) = response.last_checkpoint {
                    self.agent_index.store(checkpoint.agent_index, Ordering::Relaxed);
                }
                info!("push exporter health check accepted, starting init push");
                true
            }
            Err(error) => {
                warn!(%error, "push exporter health check failed");
                false
            }
        }
    }

    async fn init_push(&mut self) -> bool {
        for store in &self.stores {
            let event = ResourceEvent::reset(store.cluster_id(), store.res_type(), store.snapshot());
            let checkpoint = self.checkpoint(self.event_index.fetch_add(1, Ordering::Relaxed) + 1);
            let request = SyncRequest::batch(vec![event], None, checkpoint);
            match self.post(&request).await {
                Ok(response) if response.is_accepted => {}
                Ok(_) => {
                    let error = NetError::Rejected("init push rejected by acceptor".to_string());
                    warn!(%error, "will retry next cycle");
                    return false;
                }
                Err(error) => {
                    warn!(%error, "init push failed");
                    return false;
                }
            }
        }
        true
    }

    async fn sync_check(&mut self) -> bool {
        let last = self.checkpoint(self.event_index.load(Ordering::Relaxed));
        match self.post(&SyncRequest::sync_check(last)).await {
            Ok(response) if response.is_stop_push => {
                warn!("acceptor reports checkpoint mismatch, forcing re-init");
                false
            }
            Ok(_) => true,
            Err(error) => {
                warn!(%error, "sync check failed");
                false
            }
        }
    }

    async fn flush_batch(&mut self, events: Vec<ResourceEvent>) -> bool {
        let last = self.checkpoint(self.event_index.load(Ordering::Relaxed));
        let next = self.checkpoint(self.event_index.fetch_add(1, Ordering::Relaxed) + 1);
        let request = SyncRequest::batch(events, Some(last), next);
        match self.post(&request).await {
            Ok(response) if response.is_stop_push => {
                warn!("acceptor requested stop-push, returning to NotReady");
                false
            }
            Ok(response) if !response.is_accepted => {
                let error = NetError::Rejected("steady-state batch rejected by acceptor".to_string());
                warn!(%error);
                false
            }
            Ok(_) => true,
            Err(error) => {
                warn!(%error, "steady-state push failed");
                false
            }
        }
    }

    fn drain_buffered(&mut self) -> Vec<ResourceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drives the exporter state machine until the process exits. Errors
    /// from individual pushes are logged and retried on the next tick
    /// rather than propagated, matching the always-retrying behavior of
    /// the fetch client (component H).
    pub async fn run(mut self) {
        let mut ticker = interval(self.config.tick_interval);

        loop {
            match self.state {
                ExporterState::NotReady => {
                    if self.health_check().await && self.init_push().await {
                        self.state = ExporterState::Healthy;
                    } else {
                        tokio::time::sleep(self.config.health_check_interval).await;
                    }
                }
                ExporterState::Healthy => {
                    if self.backpressure.swap(false, Ordering::Relaxed) {
                        warn!("push exporter hit its enqueue deadline, forcing re-init");
                        self.state = ExporterState::NotReady;
                        continue;
                    }
                    ticker.tick().await;
                    let buffered = self.drain_buffered();
                    if buffered.is_empty() {
                        if !self.sync_check().await {
                            self.state = ExporterState::NotReady;
                        }
                    } else if !self.flush_batch(buffered).await {
                        self.state = ExporterState::NotReady;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use axum::extract::State as AxumState;
    use axum::routing::post as axum_post;
    use axum::{Json, Router};

    use meta_core::model::{ResType, SyncResponse};
    use meta_core::store::GenericStore;

    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn export_enqueues_immediately_while_the_queue_has_room() {
        let config = PushExporterConfig { queue_capacity: 2, ..Default::default() };
        let (handle, mut worker) = new_push_exporter(config, Vec::new());

        let event = ResourceEvent::reset("cluster-a", ResType::POD, Vec::new());
        handle.export(&event);

        assert_eq!(worker.drain_buffered().len(), 1);
    }

    /// spec.md §5: exporting past a full queue blocks up to the enqueue
    /// deadline, then gives up and marks the exporter for re-init rather
    /// than silently dropping forever (§7(d)).
    #[tokio::test(flavor = "multi_thread")]
    async fn export_past_a_full_queue_gives_up_after_the_enqueue_deadline_and_marks_backpressure() {
        let config = PushExporterConfig {
            queue_capacity: 1,
            enqueue_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (handle, worker) = new_push_exporter(config, Vec::new());
        let backpressure = worker.backpressure.clone();

        let event = ResourceEvent::reset("cluster-a", ResType::POD, Vec::new());
        handle.export(&event);

        // The queue (capacity 1) is now full and nothing drains it, so this
        // second export must block for the full enqueue deadline and then
        // give up rather than succeed or panic.
        let started = tokio::time::Instant::now();
        handle.export(&event);
        assert!(started.elapsed() >= Duration::from_millis(50));

        assert!(backpressure.load(Ordering::Relaxed));
    }

    /// Mock acceptor: accepts a health check with a fixed agent index, then
    /// accepts every batch unconditionally. Mirrors spec.md S4 — "server
    /// recovers; exporter sends a health check, receives an agent-index,
    /// then an init batch containing one Reset per store".
    async fn mock_acceptor_handler(
        AxumState(accepted_count): AxumState<Arc<AtomicUsize>>,
        Json(req): Json<SyncRequest>,
    ) -> Json<SyncResponse> {
        accepted_count.fetch_add(1, Ordering::Relaxed);
        if req.is_health_check() {
            return Json(SyncResponse {
                last_checkpoint: Some(CheckPoint { agent_index: 7, timestamp: 0, event_index: 0 }),
                is_stop_push: false,
                is_init: false,
                is_accepted: true,
            });
        }
        Json(SyncResponse { last_checkpoint: None, is_stop_push: false, is_init: false, is_accepted: true })
    }

    async fn spawn_mock_acceptor() -> (String, Arc<AtomicUsize>) {
        let accepted_count = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .route("/push", axum_post(mock_acceptor_handler))
            .with_state(accepted_count.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{addr}/push"), accepted_count)
    }

    #[tokio::test]
    async fn health_check_then_init_push_sends_one_reset_per_store() {
        let (acceptor_url, accepted_count) = spawn_mock_acceptor().await;
        let stores: Vec<Arc<dyn ResourceStore>> = vec![
            Arc::new(GenericStore::new(ResType::POD)),
            Arc::new(GenericStore::new(ResType::SERVICE)),
        ];
        let config = PushExporterConfig { acceptor_url, ..Default::default() };
        let (_handle, mut worker) = new_push_exporter(config, stores);

        assert!(worker.health_check().await);
        assert_eq!(worker.agent_index.load(Ordering::Relaxed), 7);

        assert!(worker.init_push().await);
        // One health check + one batch per store.
        assert_eq!(accepted_count.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn failed_health_check_against_an_unreachable_acceptor_does_not_advance_state() {
        let config = PushExporterConfig {
            acceptor_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let (_handle, mut worker) = new_push_exporter(config, Vec::new());

        assert!(!worker.health_check().await);
    }
}
