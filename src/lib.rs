//! Client core for a location-based photo sharing app.
//!
//! Authenticated users capture a photo, attach a description, and publish
//! it as a geotagged snap; everyone else sees snaps clustered on a map with
//! reverse-geocoded addresses and per-snap comment threads. This crate is
//! the synchronization and presentation core behind that: typed stores over
//! the backend collaborators, a live change feed driving full re-fetches,
//! the fixed-precision marker clustering pass, and the camera/geolocation
//! capture flow feeding the submission pipeline.
//!
//! External collaborators (identity, relational store, object storage,
//! realtime feed, reverse geocoder, camera, geolocation) are traits in
//! [`domain`]; production adapters live in [`repositories`], [`storage`],
//! [`geocode`], and [`feed`]. [`app::SnapApp`] wires the whole thing up.

pub mod app;
pub mod aws_clients;
pub mod capture;
pub mod comments;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod feed;
pub mod geocode;
pub mod geoloc;
pub mod models;
pub mod posts;
pub mod presenter;
pub mod repositories;
pub mod session;
pub mod startup;
pub mod storage;
pub mod submit;

pub use app::{Collaborators, SnapApp};
pub use config::Config;
pub use errors::AppError;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the tracing subscriber for binaries and tests that want crate
/// logging; honors `RUST_LOG` with a sensible default.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "snaphood=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
