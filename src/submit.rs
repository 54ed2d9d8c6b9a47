use crate::capture::CapturedPhoto;
use crate::domain::{FileStorage, SnapRepository};
use crate::errors::SubmitError;
use crate::models::{clamp_input, SnapRecord, MAX_DESCRIPTION_LEN};
use crate::posts::PostStore;
use crate::session::SessionAccessor;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing;
use uuid::Uuid;

/// The storage path for a new still: namespaced by author and stamped with
/// upload time, so concurrent authors (and repeated uploads by one author)
/// never need a coordination step to avoid collisions.
pub fn object_path(author_id: &str, at: DateTime<Utc>) -> String {
    format!("user-{}/{}.png", author_id, at.timestamp_millis())
}

/// Publishes a snap: validate → upload still → insert record → refresh.
///
/// Preconditions are checked in order and each is a distinct failure,
/// reported before any network call. A record insert failing after a
/// successful upload leaves the object orphaned; that inconsistency is
/// accepted rather than rolled back.
pub struct SubmissionPipeline {
    storage: Arc<dyn FileStorage>,
    snaps_repo: Arc<dyn SnapRepository>,
    session: SessionAccessor,
    posts: Arc<PostStore>,
}

impl SubmissionPipeline {
    pub fn new(
        storage: Arc<dyn FileStorage>,
        snaps_repo: Arc<dyn SnapRepository>,
        session: SessionAccessor,
        posts: Arc<PostStore>,
    ) -> Self {
        Self { storage, snaps_repo, session, posts }
    }

    pub async fn submit(
        &self,
        photo: Option<&CapturedPhoto>,
        description: &str,
        lat: Option<f64>,
        lng: Option<f64>,
    ) -> Result<String, SubmitError> {
        let photo = photo.filter(|p| !p.bytes.is_empty()).ok_or(SubmitError::MissingPhoto)?;

        let description = description.trim();
        if description.is_empty() {
            return Err(SubmitError::MissingDescription);
        }
        let description = clamp_input(description, MAX_DESCRIPTION_LEN);

        let (lat, lng) = lat
            .zip(lng)
            .filter(|(lat, lng)| lat.is_finite() && lng.is_finite())
            .ok_or(SubmitError::MissingLocation)?;

        let user = self.session.current_user().await.ok_or(SubmitError::NotSignedIn)?;

        let now = Utc::now();
        let path = object_path(&user.id, now);
        let stored_path = self
            .storage
            .upload(&path, photo.bytes.clone(), Some(photo.content_type.to_string()))
            .await
            .map_err(SubmitError::Upload)?;

        let record = SnapRecord {
            id: Uuid::new_v4().to_string(),
            author_id: user.id,
            image_path: stored_path,
            description,
            lat: Some(lat),
            lng: Some(lng),
            created_at: now,
        };
        self.snaps_repo.insert(&record).await.map_err(SubmitError::Save)?;
        tracing::info!(snap_id = %record.id, "Snap published");

        // The snap is saved at this point; a failed re-fetch only delays it
        // showing up until the next feed notification.
        if let Err(e) = self.posts.refresh().await {
            tracing::warn!(error = %e, "Post-submit snap refresh failed");
        }

        Ok(record.id)
    }
}
