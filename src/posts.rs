use crate::domain::{ChangeFeed, FeedSubscription as _, ProfileRepository, SnapRepository};
use crate::errors::RepoError;
use crate::events::{EventBus, StoreEvent};
use crate::models::{ProfileRecord, Snap};
use crate::repositories::SNAPS_TABLE;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing;

struct FeedHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// The snap collection and its reconciliation with the backend.
///
/// `refresh` replaces the whole collection; there is no incremental
/// patching. The live change feed triggers a full re-fetch on any
/// notification, trading efficiency for correctness simplicity.
/// Overlapping refreshes are neither coalesced nor cancelled, so after a
/// burst of notifications the displayed state is whichever refresh resolved
/// last.
pub struct PostStore {
    snaps_repo: Arc<dyn SnapRepository>,
    profiles_repo: Arc<dyn ProfileRepository>,
    bus: EventBus,
    snaps: RwLock<Arc<Vec<Snap>>>,
    feed_task: Mutex<Option<FeedHandle>>,
    // Handed to the feed listener task so it never keeps the store alive.
    weak_self: Weak<PostStore>,
}

impl PostStore {
    pub fn new(
        snaps_repo: Arc<dyn SnapRepository>,
        profiles_repo: Arc<dyn ProfileRepository>,
        bus: EventBus,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            snaps_repo,
            profiles_repo,
            bus,
            snaps: RwLock::new(Arc::new(Vec::new())),
            feed_task: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// The current collection, newest first. Cheap to clone; the inner
    /// vector is shared and replaced wholesale.
    pub fn snaps(&self) -> Arc<Vec<Snap>> {
        Arc::clone(&self.snaps.read().expect("snap lock poisoned"))
    }

    /// Re-fetches everything: all snaps and all author profiles, joined
    /// client-side by id. A snap whose author lookup finds nothing is still
    /// shown with an absent profile.
    pub async fn refresh(&self) -> Result<(), RepoError> {
        let records = self.snaps_repo.list_all().await?;
        let profiles = self.profiles_repo.list_all().await?;

        let by_id: HashMap<String, ProfileRecord> =
            profiles.into_iter().map(|p| (p.id.clone(), p)).collect();
        let joined: Vec<Snap> = records
            .into_iter()
            .map(|record| Snap {
                author: by_id.get(&record.author_id).cloned(),
                record,
            })
            .collect();

        tracing::debug!(count = joined.len(), "Replacing snap collection");
        *self.snaps.write().expect("snap lock poisoned") = Arc::new(joined);
        self.bus.emit_lossy(StoreEvent::SnapsReplaced);
        Ok(())
    }

    /// Subscribes to the posts change feed; every notification triggers a
    /// full `refresh`. Replaces any previous attachment.
    pub async fn attach_feed(&self, feed: &Arc<dyn ChangeFeed>) {
        self.detach_feed().await;

        let mut subscription = feed.subscribe(SNAPS_TABLE).await;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let store = self.weak_self.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    notification = subscription.next() => match notification {
                        Some(_) => {
                            let Some(store) = store.upgrade() else { break };
                            if let Err(e) = store.refresh().await {
                                tracing::warn!(error = %e, "Feed-triggered snap refresh failed");
                            }
                        }
                        None => break,
                    }
                }
            }
            // The subscription drops here, closing it.
        });

        *self.feed_task.lock().expect("feed lock poisoned") = Some(FeedHandle { token, task });
    }

    /// Cancels the feed listener and waits for the subscription to close.
    pub async fn detach_feed(&self) {
        let handle = self.feed_task.lock().expect("feed lock poisoned").take();
        if let Some(FeedHandle { token, task }) = handle {
            token.cancel();
            let _ = task.await;
        }
    }
}

impl Drop for PostStore {
    fn drop(&mut self) {
        if let Ok(mut feed_task) = self.feed_task.lock() {
            if let Some(handle) = feed_task.take() {
                handle.token.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::BroadcastChangeFeed;
    use crate::models::SnapRecord;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FakeSnaps {
        rows: Mutex<Vec<SnapRecord>>,
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapRepository for FakeSnaps {
        async fn insert(&self, snap: &SnapRecord) -> Result<(), RepoError> {
            self.rows.lock().unwrap().push(snap.clone());
            Ok(())
        }

        async fn list_all(&self) -> Result<Vec<SnapRecord>, RepoError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap().clone();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(rows)
        }
    }

    struct FakeProfiles {
        rows: Vec<ProfileRecord>,
    }

    #[async_trait]
    impl ProfileRepository for FakeProfiles {
        async fn list_all(&self) -> Result<Vec<ProfileRecord>, RepoError> {
            Ok(self.rows.clone())
        }

        async fn get_many(&self, ids: &[String]) -> Result<Vec<ProfileRecord>, RepoError> {
            Ok(self.rows.iter().filter(|p| ids.contains(&p.id)).cloned().collect())
        }
    }

    fn record(id: &str, author_id: &str, minute: u32) -> SnapRecord {
        SnapRecord {
            id: id.to_string(),
            author_id: author_id.to_string(),
            image_path: format!("user-{author_id}/{id}.png"),
            description: "d".to_string(),
            lat: Some(37.7749),
            lng: Some(-122.4194),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap(),
        }
    }

    fn store(rows: Vec<SnapRecord>, profiles: Vec<ProfileRecord>) -> (Arc<PostStore>, Arc<FakeSnaps>, EventBus) {
        let snaps = Arc::new(FakeSnaps { rows: Mutex::new(rows), list_calls: AtomicUsize::new(0) });
        let bus = EventBus::default();
        let store = PostStore::new(
            Arc::clone(&snaps) as Arc<dyn SnapRepository>,
            Arc::new(FakeProfiles { rows: profiles }),
            bus.clone(),
        );
        (store, snaps, bus)
    }

    #[tokio::test]
    async fn refresh_joins_authors_and_keeps_orphans() {
        let profile = ProfileRecord {
            id: "u1".to_string(),
            name: Some("Ada".to_string()),
            avatar_path: None,
        };
        let (store, _, _) = store(
            vec![record("s1", "u1", 0), record("s2", "ghost", 1)],
            vec![profile.clone()],
        );

        store.refresh().await.unwrap();
        let snaps = store.snaps();
        // Newest first.
        assert_eq!(snaps[0].record.id, "s2");
        assert_eq!(snaps[0].author, None);
        assert_eq!(snaps[1].author, Some(profile));
    }

    #[tokio::test]
    async fn feed_notification_drives_a_refresh() {
        let (store, snaps, bus) = store(vec![record("s1", "u1", 0)], vec![]);
        let feed = Arc::new(BroadcastChangeFeed::default());
        let mut events = bus.subscribe();

        store.attach_feed(&(Arc::clone(&feed) as Arc<dyn ChangeFeed>)).await;
        assert_eq!(snaps.list_calls.load(Ordering::SeqCst), 0);

        feed.notify(SNAPS_TABLE);
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("no refresh within a second")
            .unwrap();
        assert_eq!(snaps.list_calls.load(Ordering::SeqCst), 1);

        // Unrelated tables do not wake the store.
        feed.notify("comments");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(snaps.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn detach_closes_the_subscription() {
        let (store, snaps, _) = store(vec![], vec![]);
        let feed = Arc::new(BroadcastChangeFeed::default());

        store.attach_feed(&(Arc::clone(&feed) as Arc<dyn ChangeFeed>)).await;
        store.detach_feed().await;

        feed.notify(SNAPS_TABLE);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(snaps.list_calls.load(Ordering::SeqCst), 0);
    }
}
