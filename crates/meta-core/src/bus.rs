//! Fan-out bus (component D).
//!
//! A store holds zero or more registered [`Exporter`]s. Every mutation
//! emits exactly one [`ResourceEvent`] (spec.md §4.B), and the bus hands a
//! clone of that event to each exporter in registration order. Exporters
//! are `Send + Sync` trait objects so a store can fan out to a push
//! exporter (component E) and a fetch server (component G) at once,
//! exactly like the Go `export.Exporter` aggregate in the original
//! implementation.

use std::sync::Arc;

use tracing::warn;

use crate::error::CoreError;
use crate::model::ResourceEvent;

/// Something a store can deliver events to.
///
/// Implementors must not block the caller for long: the bus delivers
/// events from inside the store's mutation path, so a slow exporter should
/// buffer internally (as the push exporter and fetch server both do) and
/// return quickly, rather than perform I/O on this call.
pub trait Exporter: Send + Sync {
    fn export(&self, event: &ResourceEvent);
}

/// Registration point a store exposes; owns the list of exporters it fans
/// out to.
#[derive(Default)]
pub struct FanOutBus {
    exporters: parking_lot::RwLock<Vec<Arc<dyn Exporter>>>,
}

impl FanOutBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `exporter`, refusing a duplicate registration
    /// (spec.md §4.D: "Registration is idempotent").
    pub fn register(&self, exporter: Arc<dyn Exporter>) -> Result<(), CoreError> {
        let mut exporters = self.exporters.write();
        if exporters
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &exporter))
        {
            warn!("exporter already registered on this store, ignoring duplicate");
            return Err(CoreError::DuplicateExporter);
        }
        exporters.push(exporter);
        Ok(())
    }

    /// Delivers `event` to every registered exporter, in registration
    /// order. A shallow clone is handed to each exporter so one exporter
    /// buffering the event cannot block another's view of it.
    pub fn deliver(&self, event: &ResourceEvent) {
        for exporter in self.exporters.read().iter() {
            exporter.export(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.read().is_empty()
    }
}
