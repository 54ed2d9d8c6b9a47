use crate::capture::CaptureController;
use crate::comments::CommentStore;
use crate::config::Config;
use crate::domain::{
    CameraDevice, ChangeFeed, CommentRepository, FileStorage, Geocoder, IdentityProvider,
    PositionSource, ProfileRepository, SnapRepository,
};
use crate::errors::{AppError, SubmitError};
use crate::events::{EventBus, StoreEvent};
use crate::geocode::AddressDirectory;
use crate::geoloc::GeolocationTracker;
use crate::posts::PostStore;
use crate::presenter::{build_feed, build_markers, FeedEntry, MapMarker, ViewContext};
use crate::session::SessionAccessor;
use crate::submit::SubmissionPipeline;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing;

/// The external collaborators the app is wired over.
pub struct Collaborators {
    pub snaps: Arc<dyn SnapRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub storage: Arc<dyn FileStorage>,
    pub feed: Arc<dyn ChangeFeed>,
    pub identity: Arc<dyn IdentityProvider>,
    pub geocoder: Arc<dyn Geocoder>,
    pub camera: Arc<dyn CameraDevice>,
    pub positions: Arc<dyn PositionSource>,
}

impl Collaborators {
    /// Production wiring for the backend-side collaborators: DynamoDB
    /// repositories, S3 object storage, the in-process change-feed hub, and
    /// the Nominatim geocoder. Identity and the device collaborators
    /// (camera, positions) are host-environment specific, so the embedder
    /// supplies those.
    pub async fn production(
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
        camera: Arc<dyn CameraDevice>,
        positions: Arc<dyn PositionSource>,
    ) -> Result<Self, AppError> {
        let sdk_config = crate::aws_clients::create_sdk_config(config).await;
        let db_client = crate::aws_clients::create_dynamodb_client(&sdk_config);
        let s3_client = crate::aws_clients::create_s3_client(&sdk_config);

        let geocoder = crate::geocode::NominatimGeocoder::new(
            config.geocoder_endpoint.clone(),
            &config.geocoder_client_label,
        )
        .map_err(|e| AppError::Init(format!("Failed to build geocoder client: {e}")))?;

        Ok(Self {
            snaps: Arc::new(crate::repositories::DynamoDbSnapRepository::new(db_client.clone())),
            comments: Arc::new(crate::repositories::DynamoDbCommentRepository::new(
                db_client.clone(),
            )),
            profiles: Arc::new(crate::repositories::DynamoDbProfileRepository::new(db_client)),
            storage: Arc::new(crate::storage::S3FileStorage::new(
                s3_client,
                config.images_bucket.clone(),
            )),
            feed: Arc::new(crate::feed::BroadcastChangeFeed::default()),
            identity,
            geocoder: Arc::new(geocoder),
            camera,
            positions,
        })
    }
}

struct PlumbingHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Owner object for the whole pipeline: stores, device controllers, and the
/// reactive plumbing between them.
///
/// Failures anywhere degrade a single feature and land in the dismissible
/// error banner; nothing here is fatal.
pub struct SnapApp {
    config: Config,
    bus: EventBus,
    session: SessionAccessor,
    posts: Arc<PostStore>,
    comments: Arc<CommentStore>,
    addresses: Arc<AddressDirectory>,
    tracker: Arc<GeolocationTracker>,
    capture: tokio::sync::Mutex<CaptureController>,
    pipeline: SubmissionPipeline,
    feed: Arc<dyn ChangeFeed>,
    banner: RwLock<Option<String>>,
    plumbing: Mutex<Option<PlumbingHandle>>,
    // Handed to the plumbing task so it never keeps the app alive.
    weak_self: Weak<SnapApp>,
}

impl SnapApp {
    pub fn new(config: Config, collab: Collaborators) -> Arc<Self> {
        let bus = EventBus::default();
        let session = SessionAccessor::new(Arc::clone(&collab.identity));
        let posts = PostStore::new(
            Arc::clone(&collab.snaps),
            Arc::clone(&collab.profiles),
            bus.clone(),
        );
        let comments = Arc::new(CommentStore::new(
            Arc::clone(&collab.comments),
            Arc::clone(&collab.profiles),
            session.clone(),
            bus.clone(),
        ));
        let addresses = Arc::new(AddressDirectory::new(Arc::clone(&collab.geocoder), bus.clone()));
        let tracker = GeolocationTracker::new(Arc::clone(&collab.positions), bus.clone());
        let pipeline = SubmissionPipeline::new(
            Arc::clone(&collab.storage),
            Arc::clone(&collab.snaps),
            session.clone(),
            Arc::clone(&posts),
        );

        Arc::new_cyclic(|weak_self| Self {
            config,
            bus,
            session,
            posts,
            comments,
            addresses,
            tracker,
            capture: tokio::sync::Mutex::new(CaptureController::new(collab.camera)),
            pipeline,
            feed: collab.feed,
            banner: RwLock::new(None),
            plumbing: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Brings the app up: reactive plumbing first, then the initial fetch,
    /// the live feed, and both geolocation modes. Each failure degrades its
    /// own feature through the banner; startup always completes.
    pub async fn start(&self) {
        self.spawn_plumbing();

        if let Err(e) = self.posts.refresh().await {
            self.report(&AppError::PostsUnavailable(e));
        }
        self.posts.attach_feed(&self.feed).await;

        if let Err(e) = self.tracker.acquire_fix().await {
            self.report(&AppError::Location(e));
        }
        if let Err(e) = self.tracker.start_watch().await {
            self.report(&AppError::Location(e));
        }
    }

    /// Reactive plumbing: whenever the snap collection is replaced, resolve
    /// addresses and eagerly load every visible thread. Watch failures
    /// surface through the banner.
    fn spawn_plumbing(&self) {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let app = self.weak_self.clone();
        let mut events = self.bus.subscribe();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(StoreEvent::SnapsReplaced) => {
                            let Some(app) = app.upgrade() else { break };
                            let snaps = app.posts.snaps();
                            app.addresses.refresh(&snaps).await;
                            app.comments.load_threads_for(&snaps).await;
                        }
                        Ok(StoreEvent::LocationWatchFailed(e)) => {
                            let Some(app) = app.upgrade() else { break };
                            app.report(&AppError::Location(e));
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        *self.plumbing.lock().expect("plumbing lock poisoned") =
            Some(PlumbingHandle { token, task });
    }

    /// Releases everything with an explicit teardown: the feed
    /// subscription, the position watch, any camera stream, the plumbing.
    pub async fn shutdown(&self) {
        self.posts.detach_feed().await;
        self.tracker.stop_watch().await;
        self.capture.lock().await.cancel();

        let handle = self.plumbing.lock().expect("plumbing lock poisoned").take();
        if let Some(PlumbingHandle { token, task }) = handle {
            token.cancel();
            let _ = task.await;
        }
    }

    /// Observer hook for rendering surfaces and tests.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.bus.subscribe()
    }

    pub fn sign_in_url(&self, redirect_to: &str) -> String {
        self.session.sign_in_url(redirect_to)
    }

    // --- Error banner ---

    fn report(&self, error: &AppError) {
        tracing::error!(error = %error, "Reporting failure to the banner");
        *self.banner.write().expect("banner lock poisoned") = Some(error.user_message());
        self.bus.emit_lossy(StoreEvent::BannerChanged);
    }

    pub fn banner(&self) -> Option<String> {
        self.banner.read().expect("banner lock poisoned").clone()
    }

    pub fn dismiss_banner(&self) {
        *self.banner.write().expect("banner lock poisoned") = None;
        self.bus.emit_lossy(StoreEvent::BannerChanged);
    }

    // --- Capture flow ---

    /// Opens the camera, gated on a known device position.
    pub async fn open_camera(&self) -> Result<(), AppError> {
        if self.tracker.fix().is_none() {
            let error = AppError::Submit(SubmitError::MissingLocation);
            self.report(&error);
            return Err(error);
        }
        self.capture.lock().await.open().await.map_err(|e| {
            let error = AppError::Capture(e);
            self.report(&error);
            error
        })
    }

    pub async fn flip_camera(&self) -> Result<(), AppError> {
        self.capture.lock().await.flip().await.map_err(|e| {
            let error = AppError::Capture(e);
            self.report(&error);
            error
        })
    }

    pub async fn capture_photo(&self) -> Result<(), AppError> {
        self.capture.lock().await.capture().map_err(|e| {
            let error = AppError::Capture(e);
            self.report(&error);
            error
        })
    }

    pub async fn retake(&self) {
        self.capture.lock().await.retake();
    }

    pub async fn cancel_camera(&self) {
        self.capture.lock().await.cancel();
    }

    /// Publishes the held still with the given description at the gating
    /// fix. The still is only consumed on success; a failed submit keeps it
    /// for retry.
    pub async fn post_snap(&self, description: &str) -> Result<String, AppError> {
        let fix = self.tracker.fix();
        let mut capture = self.capture.lock().await;
        let photo = capture.photo().cloned();

        let result = self
            .pipeline
            .submit(
                photo.as_ref(),
                description,
                fix.map(|p| p.lat),
                fix.map(|p| p.lng),
            )
            .await;

        match result {
            Ok(snap_id) => {
                let _ = capture.take_photo();
                self.dismiss_banner();
                Ok(snap_id)
            }
            Err(e) => {
                let error = AppError::Submit(e);
                self.report(&error);
                Err(error)
            }
        }
    }

    // --- Comments ---

    pub fn set_comment_draft(&self, snap_id: &str, text: &str) {
        self.comments.set_draft(snap_id, text);
    }

    pub async fn submit_comment(&self, snap_id: &str) -> Result<(), AppError> {
        self.comments.submit(snap_id).await.map_err(|e| {
            let error = AppError::Comment(e);
            self.report(&error);
            error
        })
    }

    // --- Views ---

    fn view_context(&self) -> ViewContext<'_> {
        ViewContext {
            storage_base: &self.config.storage_base,
            images_bucket: &self.config.images_bucket,
        }
    }

    pub fn map_markers(&self) -> Vec<MapMarker> {
        let snaps = self.posts.snaps();
        build_markers(
            &snaps,
            &self.addresses,
            &self.comments,
            self.tracker.live_position(),
            self.view_context(),
        )
    }

    pub fn feed_entries(&self) -> Vec<FeedEntry> {
        build_feed(&self.posts.snaps(), self.view_context())
    }

    // --- Store access for rendering surfaces ---

    pub fn posts(&self) -> &Arc<PostStore> {
        &self.posts
    }

    pub fn comments(&self) -> &Arc<CommentStore> {
        &self.comments
    }

    pub fn addresses(&self) -> &Arc<AddressDirectory> {
        &self.addresses
    }

    pub fn tracker(&self) -> &Arc<GeolocationTracker> {
        &self.tracker
    }
}
