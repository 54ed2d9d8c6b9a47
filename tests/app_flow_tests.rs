//! End-to-end flows over in-memory collaborators: capture → post → map,
//! feed-driven refresh, and the signed-out comment path.

use async_trait::async_trait;
use chrono::Utc;
use snaphood::app::{Collaborators, SnapApp};
use snaphood::config::Config;
use snaphood::domain::{
    CameraDevice, CameraStream, ChangeFeed, CommentRepository, FileStorage, FixOptions, Frame,
    Geocoder, IdentityProvider, Position, PositionSource, PositionStream, ProfileRepository,
    SnapRepository, StreamConstraints,
};
use snaphood::errors::{
    AppError, CaptureError, GeocodeError, LocationError, RepoError, StorageError, SubmitError,
};
use snaphood::events::StoreEvent;
use snaphood::feed::BroadcastChangeFeed;
use snaphood::geocode::AddressState;
use snaphood::models::{CommentRecord, Identity, ProfileRecord, SnapRecord};
use snaphood::presenter::MapMarker;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// --- In-memory collaborators ---

#[derive(Default)]
struct InMemorySnaps {
    rows: Mutex<Vec<SnapRecord>>,
    list_calls: AtomicUsize,
}

#[async_trait]
impl SnapRepository for InMemorySnaps {
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

#[derive(Default)]
struct InMemoryComments {
    rows: Mutex<Vec<CommentRecord>>,
}

#[async_trait]
impl CommentRepository for InMemoryComments {
    async fn insert(&self, comment: &CommentRecord) -> Result<(), RepoError> {
        self.rows.lock().unwrap().push(comment.clone());
        Ok(())
    }

    async fn list_for_snap(&self, snap_id: &str) -> Result<Vec<CommentRecord>, RepoError> {
        let mut rows: Vec<CommentRecord> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.snap_id == snap_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rows)
    }
}

#[derive(Default)]
struct InMemoryProfiles {
    rows: Mutex<Vec<ProfileRecord>>,
}

#[async_trait]
impl ProfileRepository for InMemoryProfiles {
    async fn list_all(&self) -> Result<Vec<ProfileRecord>, RepoError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<ProfileRecord>, RepoError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct InMemoryStorage {
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl FileStorage for InMemoryStorage {
    async fn upload(
        &self,
        path: &str,
        _data: Vec<u8>,
        _content_type: Option<String>,
    ) -> Result<String, StorageError> {
        self.uploads.lock().unwrap().push(path.to_string());
        Ok(path.to_string())
    }
}

struct FixedIdentity(Option<Identity>);

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn current_user(&self) -> Result<Option<Identity>, anyhow::Error> {
        Ok(self.0.clone())
    }

    fn authorize_url(&self, redirect_to: &str) -> String {
        format!("https://id.example/authorize?redirect_to={redirect_to}")
    }
}

struct StubGeocoder;

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn reverse(&self, _lat: f64, _lng: f64) -> Result<Option<String>, GeocodeError> {
        Ok(Some("Market St, San Francisco".to_string()))
    }
}

struct FakeStream;

impl CameraStream for FakeStream {
    fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame {
            width: 2,
            height: 1,
            rgba: vec![255, 0, 0, 255, 0, 0, 255, 255],
        })
    }
}

struct FakeCamera;

#[async_trait]
impl CameraDevice for FakeCamera {
    async fn open(
        &self,
        _constraints: StreamConstraints,
    ) -> Result<Box<dyn CameraStream>, CaptureError> {
        Ok(Box::new(FakeStream))
    }
}

const HERE: Position = Position {
    lat: 37.7749,
    lng: -122.4194,
    accuracy: Some(5.0),
};

struct FakePositions {
    fix: Result<Position, LocationError>,
    // Kept alive so the watch stream stays open for the app's lifetime.
    _watch_tx: mpsc::UnboundedSender<Result<Position, LocationError>>,
    watch_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<Position, LocationError>>>>,
}

impl FakePositions {
    fn new(fix: Result<Position, LocationError>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            fix,
            _watch_tx: tx,
            watch_rx: Mutex::new(Some(rx)),
        }
    }
}

struct ChannelStream(mpsc::UnboundedReceiver<Result<Position, LocationError>>);

#[async_trait]
impl PositionStream for ChannelStream {
    async fn next(&mut self) -> Option<Result<Position, LocationError>> {
        self.0.recv().await
    }
}

#[async_trait]
impl PositionSource for FakePositions {
    async fn current_position(&self, _opts: FixOptions) -> Result<Position, LocationError> {
        self.fix.clone()
    }

    async fn watch(&self) -> Result<Box<dyn PositionStream>, LocationError> {
        let rx = self.watch_rx.lock().unwrap().take().expect("watch opened twice");
        Ok(Box::new(ChannelStream(rx)))
    }
}

// --- Wiring ---

struct World {
    app: Arc<SnapApp>,
    snaps: Arc<InMemorySnaps>,
    storage: Arc<InMemoryStorage>,
    feed: Arc<BroadcastChangeFeed>,
}

fn config() -> Config {
    Config {
        images_bucket: "images".to_string(),
        storage_base: "https://backend.example".to_string(),
        geocoder_endpoint: "https://nominatim.openstreetmap.org/reverse".to_string(),
        geocoder_client_label: "snaphood/1.0".to_string(),
        aws_region: "ca-central-1".to_string(),
        localstack_endpoint: None,
    }
}

fn world(identity: Option<Identity>, fix: Result<Position, LocationError>) -> World {
    let snaps = Arc::new(InMemorySnaps::default());
    let storage = Arc::new(InMemoryStorage::default());
    let feed = Arc::new(BroadcastChangeFeed::default());

    let app = SnapApp::new(
        config(),
        Collaborators {
            snaps: Arc::clone(&snaps) as Arc<dyn SnapRepository>,
            comments: Arc::new(InMemoryComments::default()),
            profiles: Arc::new(InMemoryProfiles::default()),
            storage: Arc::clone(&storage) as Arc<dyn FileStorage>,
            feed: Arc::clone(&feed) as Arc<dyn ChangeFeed>,
            identity: Arc::new(FixedIdentity(identity)),
            geocoder: Arc::new(StubGeocoder),
            camera: Arc::new(FakeCamera),
            positions: Arc::new(FakePositions::new(fix)),
        },
    );

    World { app, snaps, storage, feed }
}

fn me() -> Identity {
    Identity {
        id: "u1".to_string(),
        name: Some("Ada".to_string()),
    }
}

async fn wait_for_event(
    rx: &mut broadcast::Receiver<StoreEvent>,
    wanted: impl Fn(&StoreEvent) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if wanted(&event) => break,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("event did not arrive in time");
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition did not hold in time");
}

// --- Flows ---

#[tokio::test]
async fn capture_post_and_render_end_to_end() {
    let w = world(Some(me()), Ok(HERE));
    w.app.start().await;
    assert_eq!(w.app.banner(), None);

    w.app.open_camera().await.unwrap();
    w.app.capture_photo().await.unwrap();
    let snap_id = w.app.post_snap("  golden hour  ").await.unwrap();

    // Upload landed under the author/timestamp namespace.
    let uploads = w.storage.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert!(uploads[0].starts_with("user-u1/"));
    assert!(uploads[0].ends_with(".png"));

    // The pipeline's own refresh replaced the collection, and the plumbing
    // resolved an address for the new snap.
    let app = Arc::clone(&w.app);
    let id = snap_id.clone();
    wait_until(move || {
        matches!(app.addresses().state(&id), AddressState::Resolved(_))
    })
    .await;

    let markers = w.app.map_markers();
    let snap_marker = markers
        .iter()
        .find_map(|m| match m {
            MapMarker::Snap { detail, .. } if detail.snap_id == snap_id => Some(detail),
            _ => None,
        })
        .expect("posted snap has a marker");
    assert_eq!(snap_marker.description, "golden hour");
    assert_eq!(
        snap_marker.image_url,
        format!("https://backend.example/object/public/images/{}", uploads[0])
    );
    assert_eq!(
        snap_marker.address,
        AddressState::Resolved("Market St, San Francisco".to_string())
    );

    // The live user-location marker renders alongside once the watch ticks;
    // here only the snap marker and no stale banner.
    assert_eq!(w.app.banner(), None);

    w.app.shutdown().await;
}

#[tokio::test]
async fn signed_out_comment_submit_keeps_draft_and_reports() {
    let w = world(None, Ok(HERE));
    w.app.start().await;

    w.app.set_comment_draft("s1", "love this corner");
    let err = w.app.submit_comment("s1").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Comment(snaphood::errors::CommentError::NotSignedIn)
    ));
    assert_eq!(w.app.comments().draft("s1"), "love this corner");
    assert_eq!(
        w.app.banner().as_deref(),
        Some("Not signed in. Please sign in to comment.")
    );

    w.app.shutdown().await;
}

#[tokio::test]
async fn refresh_is_feed_driven_not_polled() {
    let w = world(Some(me()), Ok(HERE));
    let mut events = w.app.subscribe();
    w.app.start().await;
    wait_for_event(&mut events, |e| *e == StoreEvent::SnapsReplaced).await;

    let after_start = w.snaps.list_calls.load(Ordering::SeqCst);

    // Quiet feed: no re-fetch happens on its own.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(w.snaps.list_calls.load(Ordering::SeqCst), after_start);

    // A remote writer inserts a row and the feed announces it.
    w.snaps
        .insert(&SnapRecord {
            id: "remote".to_string(),
            author_id: "u2".to_string(),
            image_path: "user-u2/1.png".to_string(),
            description: "from elsewhere".to_string(),
            lat: Some(37.7749),
            lng: Some(-122.4194),
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    w.feed.notify("snaps");

    wait_for_event(&mut events, |e| *e == StoreEvent::SnapsReplaced).await;
    assert!(w.snaps.list_calls.load(Ordering::SeqCst) > after_start);
    assert!(w.app.posts().snaps().iter().any(|s| s.record.id == "remote"));

    // After teardown the subscription is gone.
    w.app.shutdown().await;
    let settled = w.snaps.list_calls.load(Ordering::SeqCst);
    w.feed.notify("snaps");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(w.snaps.list_calls.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn capture_is_gated_on_a_location_fix() {
    let w = world(Some(me()), Err(LocationError::PermissionDenied));
    w.app.start().await;

    // The one-shot fix failed at startup with the permission-specific hint.
    assert_eq!(
        w.app.banner().as_deref(),
        Some("Location access denied. Please enable location services.")
    );

    let err = w.app.open_camera().await.unwrap_err();
    assert!(matches!(err, AppError::Submit(SubmitError::MissingLocation)));
    assert_eq!(
        w.app.banner().as_deref(),
        Some("Location is required to post a snap.")
    );

    w.app.shutdown().await;
}
