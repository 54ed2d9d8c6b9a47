use crate::domain::{FixOptions, Position, PositionSource, PositionStream as _};
use crate::errors::LocationError;
use crate::events::{EventBus, StoreEvent};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing;

/// One-shot fix parameters gating the posting flow: high accuracy, a 10 s
/// deadline, and a cached position no older than 5 minutes.
pub const FIX_OPTIONS: FixOptions = FixOptions {
    high_accuracy: true,
    timeout: Duration::from_secs(10),
    max_age: Duration::from_secs(300),
};

struct WatchHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Device position state for the app.
///
/// Two independent acquisition modes run through here: a one-shot fix that
/// gates posting, and a continuous watch feeding the user's live map
/// marker. Both may be active at once. The watch task is cancelled
/// explicitly on stop and implicitly on drop; dropping the position stream
/// clears the device-side watch.
pub struct GeolocationTracker {
    source: Arc<dyn PositionSource>,
    bus: EventBus,
    fix: RwLock<Option<Position>>,
    live: RwLock<Option<Position>>,
    watch: Mutex<Option<WatchHandle>>,
    // Handed to the watch task so it never keeps the tracker alive.
    weak_self: Weak<GeolocationTracker>,
}

impl GeolocationTracker {
    pub fn new(source: Arc<dyn PositionSource>, bus: EventBus) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            source,
            bus,
            fix: RwLock::new(None),
            live: RwLock::new(None),
            watch: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// One-shot high-accuracy position. Failures are returned, not retried;
    /// the user re-triggers by granting permission at the browser level.
    pub async fn acquire_fix(&self) -> Result<Position, LocationError> {
        let position = self.source.current_position(FIX_OPTIONS).await?;
        *self.fix.write().expect("position lock poisoned") = Some(position);
        Ok(position)
    }

    /// The last one-shot fix; posting is gated on this being present.
    pub fn fix(&self) -> Option<Position> {
        *self.fix.read().expect("position lock poisoned")
    }

    /// The latest continuously-watched position, for the live marker.
    pub fn live_position(&self) -> Option<Position> {
        *self.live.read().expect("position lock poisoned")
    }

    /// Starts the continuous watch, replacing any previous one.
    pub async fn start_watch(&self) -> Result<(), LocationError> {
        self.stop_watch().await;

        let mut stream = self.source.watch().await?;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let tracker = self.weak_self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    update = stream.next() => match update {
                        Some(Ok(position)) => {
                            let Some(tracker) = tracker.upgrade() else { break };
                            *tracker.live.write().expect("position lock poisoned") = Some(position);
                            tracker.bus.emit_lossy(StoreEvent::UserLocationChanged);
                        }
                        Some(Err(e)) => {
                            let Some(tracker) = tracker.upgrade() else { break };
                            tracing::warn!(error = %e, "Position watch reported an error");
                            tracker.bus.emit_lossy(StoreEvent::LocationWatchFailed(e));
                        }
                        None => break,
                    }
                }
            }
            // The stream drops here, clearing the device-side watch.
        });

        *self.watch.lock().expect("watch lock poisoned") = Some(WatchHandle { token, task });
        Ok(())
    }

    /// Stops the continuous watch and waits for the task to release the
    /// device registration.
    pub async fn stop_watch(&self) {
        let handle = self.watch.lock().expect("watch lock poisoned").take();
        if let Some(WatchHandle { token, task }) = handle {
            token.cancel();
            let _ = task.await;
        }
    }
}

impl Drop for GeolocationTracker {
    fn drop(&mut self) {
        if let Ok(mut watch) = self.watch.lock() {
            if let Some(handle) = watch.take() {
                handle.token.cancel();
            }
        }
    }
}
