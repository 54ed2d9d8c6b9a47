use thiserror::Error;

// --- Domain/Infrastructure Errors ---

#[derive(Error, Debug)]
pub enum RepoError {
    #[error("malformed row in '{table}': {detail}")]
    DataCorruption { table: &'static str, detail: String },

    #[error("database backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object upload failed: {0}")]
    UploadFailed(String),

    #[error("storage backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("reverse geocode lookup failed: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Device position acquisition failures. Permission denial and
/// unavailability carry different remediation hints, so they stay distinct.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("position unavailable")]
    Unavailable,

    #[error("timed out waiting for a position fix")]
    Timeout,
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,

    #[error("camera device error: {0}")]
    Device(String),

    #[error("no camera preview is active")]
    NotPreviewing,

    #[error("no captured photo is held")]
    NoPhoto,

    #[error("still image encode failed: {0}")]
    Encode(String),
}

/// Submission pipeline failures. The first four are precondition checks,
/// reported before any network call is made.
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("no photo captured")]
    MissingPhoto,

    #[error("description is empty")]
    MissingDescription,

    #[error("location is missing or invalid")]
    MissingLocation,

    #[error("not signed in")]
    NotSignedIn,

    #[error("image upload failed")]
    Upload(#[source] StorageError),

    #[error("saving the snap failed")]
    Save(#[source] RepoError),
}

#[derive(Error, Debug)]
pub enum CommentError {
    #[error("comment text is empty")]
    EmptyDraft,

    #[error("not signed in")]
    NotSignedIn,

    #[error("a comment for this snap is already being posted")]
    SubmitInFlight,

    #[error("could not load comments")]
    Load(#[source] RepoError),

    #[error("could not save comment")]
    Save(#[source] RepoError),
}

// --- Application-Level Error ---

/// Top-level error for the orchestration layer. Every variant renders as a
/// dismissible banner message; nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Comment(#[from] CommentError),

    #[error("could not load snaps")]
    PostsUnavailable(#[source] RepoError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("initialization error: {0}")]
    Init(String),
}

impl AppError {
    /// The user-visible message for this failure, with a remediation hint
    /// where one exists. Asynchronous boundaries convert every failure into
    /// one of these strings; no error escapes to a global handler.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Capture(CaptureError::PermissionDenied | CaptureError::Device(_)) => {
                "Failed to access camera. Please check camera permissions.".into()
            }
            AppError::Capture(CaptureError::NotPreviewing | CaptureError::NoPhoto) => {
                "Camera not ready. Please try again.".into()
            }
            AppError::Capture(CaptureError::Encode(_)) => {
                "Failed to capture photo. Please try again.".into()
            }
            AppError::Location(LocationError::PermissionDenied) => {
                "Location access denied. Please enable location services.".into()
            }
            AppError::Location(LocationError::Unavailable | LocationError::Timeout) => {
                "Unable to retrieve your location. Please check your location settings.".into()
            }
            AppError::Submit(SubmitError::MissingPhoto) => "Please take a photo first.".into(),
            AppError::Submit(SubmitError::MissingDescription) => "Please add a description.".into(),
            AppError::Submit(SubmitError::MissingLocation) => {
                "Location is required to post a snap.".into()
            }
            AppError::Submit(SubmitError::NotSignedIn) => {
                "Not signed in. Please sign in to post.".into()
            }
            AppError::Submit(SubmitError::Upload(_)) => "Failed to upload image.".into(),
            AppError::Submit(SubmitError::Save(_)) => "Failed to save snap.".into(),
            AppError::Comment(CommentError::EmptyDraft) => "Please write a comment first.".into(),
            AppError::Comment(CommentError::NotSignedIn) => {
                "Not signed in. Please sign in to comment.".into()
            }
            AppError::Comment(CommentError::SubmitInFlight) => {
                "Your comment is still being posted.".into()
            }
            AppError::Comment(CommentError::Load(_)) => "Failed to load comments.".into(),
            AppError::Comment(CommentError::Save(_)) => "Failed to post comment.".into(),
            AppError::PostsUnavailable(_) => "Failed to load snaps.".into(),
            AppError::Config(e) => format!("Configuration error: {e}"),
            AppError::Init(msg) => format!("Initialization error: {msg}"),
        }
    }
}
