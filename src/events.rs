//! Store-change events for observers of the sync pipeline.
//!
//! Stores replace their state wholesale and then emit one of these, so a
//! rendering surface (or a test) can react without the stores knowing
//! anything about rendering.

use crate::errors::LocationError;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// The post store replaced its snap collection.
    SnapsReplaced,
    /// The address directory swapped in a freshly resolved map.
    AddressesReplaced,
    /// One snap's comment thread was replaced.
    ThreadUpdated { snap_id: String },
    /// The live user-location marker moved.
    UserLocationChanged,
    /// The continuous position watch reported a failure.
    LocationWatchFailed(LocationError),
    /// The orchestration layer's error banner changed.
    BannerChanged,
}

/// Central event distribution for store observers.
///
/// Backed by `tokio::sync::broadcast`: non-blocking emit, any number of
/// subscribers, automatic cleanup when receivers drop. Emission is lossy by
/// design; a store with no observers keeps working.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events. Events emitted before subscription
    /// are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening.
    pub fn emit_lossy(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(128)
    }
}
