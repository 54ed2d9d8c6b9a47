use crate::domain::{CommentRepository, ProfileRepository};
use crate::errors::CommentError;
use crate::events::{EventBus, StoreEvent};
use crate::models::{clamp_input, CommentRecord, CommentView, Snap, MAX_COMMENT_LEN};
use crate::session::SessionAccessor;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing;
use uuid::Uuid;

#[derive(Default)]
struct CommentState {
    threads: HashMap<String, Vec<CommentView>>,
    drafts: HashMap<String, String>,
    in_flight: HashSet<String>,
}

/// Per-snap comment threads, draft inputs, and submission.
///
/// Thread arrays are replaced wholesale per snap, never mutated in place.
/// The in-flight flag is per snap: a second submit for the same snap is
/// rejected while one is outstanding, but other snaps submit concurrently.
pub struct CommentStore {
    comments_repo: Arc<dyn CommentRepository>,
    profiles_repo: Arc<dyn ProfileRepository>,
    session: SessionAccessor,
    bus: EventBus,
    state: RwLock<CommentState>,
}

impl CommentStore {
    pub fn new(
        comments_repo: Arc<dyn CommentRepository>,
        profiles_repo: Arc<dyn ProfileRepository>,
        session: SessionAccessor,
        bus: EventBus,
    ) -> Self {
        Self {
            comments_repo,
            profiles_repo,
            session,
            bus,
            state: RwLock::new(CommentState::default()),
        }
    }

    /// Replaces one snap's thread: comments ascending by creation time,
    /// joined with commenter display names. A failed name lookup degrades
    /// to id-only comments rather than failing the load.
    pub async fn load_thread(&self, snap_id: &str) -> Result<(), CommentError> {
        let records = self
            .comments_repo
            .list_for_snap(snap_id)
            .await
            .map_err(CommentError::Load)?;

        let mut author_ids: Vec<String> = records.iter().map(|c| c.author_id.clone()).collect();
        author_ids.sort();
        author_ids.dedup();

        let names: HashMap<String, Option<String>> = if author_ids.is_empty() {
            HashMap::new()
        } else {
            match self.profiles_repo.get_many(&author_ids).await {
                Ok(profiles) => profiles.into_iter().map(|p| (p.id, p.name)).collect(),
                Err(e) => {
                    tracing::warn!(%snap_id, error = %e, "Commenter profile lookup failed");
                    HashMap::new()
                }
            }
        };

        let thread: Vec<CommentView> = records
            .into_iter()
            .map(|record| CommentView {
                author_name: names.get(&record.author_id).cloned().flatten(),
                id: record.id,
                author_id: record.author_id,
                text: record.text,
                created_at: record.created_at,
            })
            .collect();

        self.state
            .write()
            .expect("comment lock poisoned")
            .threads
            .insert(snap_id.to_string(), thread);
        self.bus.emit_lossy(StoreEvent::ThreadUpdated { snap_id: snap_id.to_string() });
        Ok(())
    }

    /// Eagerly loads the thread for every visible snap. Individual load
    /// failures degrade that one thread and are logged, nothing more.
    pub async fn load_threads_for(&self, snaps: &[Snap]) {
        for snap in snaps {
            if let Err(e) = self.load_thread(&snap.record.id).await {
                tracing::warn!(snap_id = %snap.record.id, error = %e, "Comment thread load failed");
            }
        }
    }

    pub fn thread(&self, snap_id: &str) -> Vec<CommentView> {
        self.state
            .read()
            .expect("comment lock poisoned")
            .threads
            .get(snap_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_draft(&self, snap_id: &str, text: &str) {
        self.state
            .write()
            .expect("comment lock poisoned")
            .drafts
            .insert(snap_id.to_string(), clamp_input(text, MAX_COMMENT_LEN));
    }

    pub fn draft(&self, snap_id: &str) -> String {
        self.state
            .read()
            .expect("comment lock poisoned")
            .drafts
            .get(snap_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_submitting(&self, snap_id: &str) -> bool {
        self.state
            .read()
            .expect("comment lock poisoned")
            .in_flight
            .contains(snap_id)
    }

    /// Posts the snap's draft. Requires a non-empty trimmed draft and a
    /// signed-in identity; on success the draft is cleared and the thread
    /// reloaded; on any failure the draft stays for retry.
    pub async fn submit(&self, snap_id: &str) -> Result<(), CommentError> {
        let text = self.draft(snap_id).trim().to_string();
        if text.is_empty() {
            return Err(CommentError::EmptyDraft);
        }

        {
            let mut state = self.state.write().expect("comment lock poisoned");
            if !state.in_flight.insert(snap_id.to_string()) {
                return Err(CommentError::SubmitInFlight);
            }
        }

        let result = self.submit_inner(snap_id, text).await;

        self.state
            .write()
            .expect("comment lock poisoned")
            .in_flight
            .remove(snap_id);
        result
    }

    async fn submit_inner(&self, snap_id: &str, text: String) -> Result<(), CommentError> {
        let Some(user) = self.session.current_user().await else {
            return Err(CommentError::NotSignedIn);
        };

        let record = CommentRecord {
            id: Uuid::new_v4().to_string(),
            snap_id: snap_id.to_string(),
            author_id: user.id,
            text,
            created_at: Utc::now(),
        };
        self.comments_repo
            .insert(&record)
            .await
            .map_err(CommentError::Save)?;

        self.state
            .write()
            .expect("comment lock poisoned")
            .drafts
            .remove(snap_id);
        self.load_thread(snap_id).await
    }
}
