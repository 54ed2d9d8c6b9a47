use crate::errors::{CaptureError, GeocodeError, LocationError, RepoError, StorageError};
use crate::models::{CommentRecord, Identity, ProfileRecord, SnapRecord};
use async_trait::async_trait;
use std::time::Duration;

/// Trait defining read/write access to the `snaps` table.
#[async_trait]
pub trait SnapRepository: Send + Sync + 'static { // Send+Sync+'static required for Arc<dyn>
    /// Inserts a new snap record. Snaps are never updated in place.
    async fn insert(&self, snap: &SnapRecord) -> Result<(), RepoError>;

    /// Lists all snaps, newest first.
    /// WARNING: This can be inefficient on large datasets. Consider pagination.
    async fn list_all(&self) -> Result<Vec<SnapRecord>, RepoError>;
}

/// Trait defining read/write access to the `comments` table.
#[async_trait]
pub trait CommentRepository: Send + Sync + 'static {
    async fn insert(&self, comment: &CommentRecord) -> Result<(), RepoError>;

    /// Lists the comments attached to one snap, ascending by creation time.
    async fn list_for_snap(&self, snap_id: &str) -> Result<Vec<CommentRecord>, RepoError>;
}

/// Trait defining read access to the `profiles` table. Profiles are never
/// written from this client.
#[async_trait]
pub trait ProfileRepository: Send + Sync + 'static {
    async fn list_all(&self) -> Result<Vec<ProfileRecord>, RepoError>;

    /// Fetches the profiles for the given ids; unknown ids are skipped.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<ProfileRecord>, RepoError>;
}

/// Trait defining operations for storing file data (snap images).
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Uploads file data under a caller-chosen path, overwriting on
    /// conflict. Returns the stored path.
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<String, StorageError>;
}

/// A row-change notification. The feed guarantees nothing about payloads,
/// only that something in the table changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification;

/// A live subscription to one table's change feed. Dropping the
/// subscription unsubscribes.
#[async_trait]
pub trait FeedSubscription: Send + 'static {
    /// The next change notification, or `None` once the feed has closed.
    async fn next(&mut self) -> Option<ChangeNotification>;
}

/// Trait for the realtime change feed collaborator.
#[async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
    async fn subscribe(&self, table: &str) -> Box<dyn FeedSubscription>;
}

/// Trait for the OAuth-style identity collaborator.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// The currently authenticated user, or `None` when signed out.
    async fn current_user(&self) -> Result<Option<Identity>, anyhow::Error>;

    /// The provider's sign-in URL for a redirect-style flow.
    fn authorize_url(&self, redirect_to: &str) -> String;
}

/// Trait for the reverse-geocoding collaborator.
#[async_trait]
pub trait Geocoder: Send + Sync + 'static {
    /// The display name for a coordinate pair, or `None` when the service
    /// has no answer for it.
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError>;
}

/// Camera sensor selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// User-facing sensor; previews mirrored.
    Front,
    /// Environment-facing sensor.
    Back,
}

/// Requested stream parameters; the device may deliver a different native
/// resolution.
#[derive(Debug, Clone, Copy)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

/// One decoded video frame, tightly packed RGBA.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// An open camera stream. Dropping the handle MUST stop every underlying
/// device track; the capture controller relies on this for release on all
/// exit paths.
pub trait CameraStream: Send + 'static {
    /// The current frame at the stream's native resolution.
    fn grab_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Trait for the device camera collaborator.
#[async_trait]
pub trait CameraDevice: Send + Sync + 'static {
    async fn open(
        &self,
        constraints: StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError>;
}

/// A device position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
    /// Reported accuracy radius in meters, when the device provides one.
    pub accuracy: Option<f64>,
}

/// One-shot acquisition parameters.
#[derive(Debug, Clone, Copy)]
pub struct FixOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// A cached position no older than this is acceptable.
    pub max_age: Duration,
}

/// A continuous ("watch") position stream. Dropping the stream clears the
/// underlying watch registration.
#[async_trait]
pub trait PositionStream: Send + 'static {
    async fn next(&mut self) -> Option<Result<Position, LocationError>>;
}

/// Trait for the device geolocation collaborator. One-shot and watch
/// acquisitions are independent modes and may run concurrently.
#[async_trait]
pub trait PositionSource: Send + Sync + 'static {
    async fn current_position(&self, opts: FixOptions) -> Result<Position, LocationError>;

    async fn watch(&self) -> Result<Box<dyn PositionStream>, LocationError>;
}
