//! Render-free view models for the map and feed surfaces.
//!
//! Clustering is a single fixed-precision pass over the snap collection,
//! recomputed from scratch whenever the collection changes. No zoom-level
//! recursion, no merge/split animation.

use crate::comments::CommentStore;
use crate::domain::Position;
use crate::geocode::{AddressDirectory, AddressState};
use crate::models::{truncate_display, CommentView, Snap};
use crate::storage::public_object_url;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

pub const DEFAULT_MAP_CENTER: (f64, f64) = (37.7749, -122.4194);
pub const DEFAULT_MAP_ZOOM: u8 = 12;

/// A marker icon definition for the rendering surface.
#[derive(Debug, PartialEq, Eq)]
pub struct MapIcon {
    pub html: &'static str,
    pub size: (u32, u32),
    pub anchor: (i32, i32),
    pub popup_anchor: (i32, i32),
}

// Shared icon definitions, constructed once at first use and passed by
// reference ever after.
static SNAP_ICON: Lazy<MapIcon> = Lazy::new(|| MapIcon {
    html: r#"<div style="width:18px;height:18px;background:#e11d48;border-radius:50%;border:2px solid #fff;box-shadow:0 0 4px #0003;"></div>"#,
    size: (18, 18),
    anchor: (9, 9),
    popup_anchor: (0, -9),
});

static USER_LOCATION_ICON: Lazy<MapIcon> = Lazy::new(|| MapIcon {
    html: r#"<div style="width:18px;height:18px;background:#fff;border-radius:50%;border:2px solid #2563eb;box-shadow:0 0 6px #2563eb99;"></div>"#,
    size: (18, 18),
    anchor: (9, 9),
    popup_anchor: (0, -9),
});

pub fn snap_icon() -> &'static MapIcon {
    Lazy::force(&SNAP_ICON)
}

pub fn user_location_icon() -> &'static MapIcon {
    Lazy::force(&USER_LOCATION_ICON)
}

/// The bucket key: both coordinates truncated to 3 decimals, roughly 110 m
/// grid cells at the equator.
pub fn cluster_key(lat: f64, lng: f64) -> String {
    format!("{lat:.3},{lng:.3}")
}

/// One bucket of snaps sharing a rounded coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterGroup {
    pub key: String,
    /// The rounded coordinate the key encodes; aggregate markers sit here.
    pub position: (f64, f64),
    pub members: Vec<Snap>,
}

/// Groups the collection by rounded coordinate. Every snap with a usable
/// coordinate pair lands in exactly one group; snaps without one are not
/// placeable and are skipped. Membership is independent of input order.
pub fn cluster_snaps(snaps: &[Snap]) -> Vec<ClusterGroup> {
    let mut buckets: BTreeMap<String, Vec<Snap>> = BTreeMap::new();
    for snap in snaps {
        let Some((lat, lng)) = snap.coordinates() else { continue };
        buckets.entry(cluster_key(lat, lng)).or_default().push(snap.clone());
    }

    buckets
        .into_iter()
        .map(|(key, members)| {
            let mut parts = key.split(',');
            let lat = parts.next().and_then(|p| p.parse().ok()).unwrap_or_default();
            let lng = parts.next().and_then(|p| p.parse().ok()).unwrap_or_default();
            ClusterGroup { key, position: (lat, lng), members }
        })
        .collect()
}

/// Everything a full single-snap detail surface shows.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapDetail {
    pub snap_id: String,
    pub author_name: Option<String>,
    pub image_url: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub address: AddressState,
    pub comments: Vec<CommentView>,
    pub comment_draft: String,
    pub comment_submitting: bool,
}

impl SnapDetail {
    /// The shortened description shown inside a marker popup.
    pub fn popup_description(&self) -> String {
        truncate_display(&self.description, 60)
    }
}

/// One line of an aggregate marker's member list. Opening the full detail
/// happens out-of-band, not nested in the cluster popup.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapSummary {
    pub snap_id: String,
    pub author_name: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapMarker {
    /// A singleton group: an individually interactive marker at the snap's
    /// own (unrounded) coordinate.
    Snap {
        position: (f64, f64),
        icon: &'static MapIcon,
        detail: SnapDetail,
    },
    /// A multi-member group at the rounded bucket coordinate.
    Cluster {
        position: (f64, f64),
        icon: &'static MapIcon,
        members: Vec<SnapSummary>,
    },
    /// The user's own live position.
    UserLocation {
        position: (f64, f64),
        icon: &'static MapIcon,
    },
}

/// Values the presenter needs to shape public image URLs.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext<'a> {
    pub storage_base: &'a str,
    pub images_bucket: &'a str,
}

/// Builds the full detail view for one snap, pulling its address state and
/// comment affordances from the stores.
pub fn snap_detail(
    snap: &Snap,
    addresses: &AddressDirectory,
    comments: &CommentStore,
    ctx: ViewContext<'_>,
) -> SnapDetail {
    let snap_id = snap.record.id.clone();
    SnapDetail {
        author_name: snap.author_name().map(|s| s.to_string()),
        image_url: public_object_url(ctx.storage_base, ctx.images_bucket, &snap.record.image_path),
        description: snap.record.description.clone(),
        created_at: snap.record.created_at,
        address: addresses.state(&snap_id),
        comments: comments.thread(&snap_id),
        comment_draft: comments.draft(&snap_id),
        comment_submitting: comments.is_submitting(&snap_id),
        snap_id,
    }
}

/// The whole marker set for the map: the live user-location marker (when
/// known) plus one marker per cluster group.
pub fn build_markers(
    snaps: &[Snap],
    addresses: &AddressDirectory,
    comments: &CommentStore,
    user_location: Option<Position>,
    ctx: ViewContext<'_>,
) -> Vec<MapMarker> {
    let mut markers = Vec::new();

    if let Some(position) = user_location {
        markers.push(MapMarker::UserLocation {
            position: (position.lat, position.lng),
            icon: user_location_icon(),
        });
    }

    for group in cluster_snaps(snaps) {
        match group.members.as_slice() {
            [snap] => {
                let Some(position) = snap.coordinates() else { continue };
                markers.push(MapMarker::Snap {
                    position,
                    icon: snap_icon(),
                    detail: snap_detail(snap, addresses, comments, ctx),
                });
            }
            members => {
                let members = members
                    .iter()
                    .map(|snap| SnapSummary {
                        snap_id: snap.record.id.clone(),
                        author_name: snap.author_name().map(|s| s.to_string()),
                        description: snap.record.description.clone(),
                    })
                    .collect();
                markers.push(MapMarker::Cluster {
                    position: group.position,
                    icon: snap_icon(),
                    members,
                });
            }
        }
    }

    markers
}

/// A non-map list entry for the same collection, newest first as the post
/// store orders it.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub snap_id: String,
    pub image_url: String,
    pub author_name: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

pub fn build_feed(snaps: &[Snap], ctx: ViewContext<'_>) -> Vec<FeedEntry> {
    snaps
        .iter()
        .map(|snap| FeedEntry {
            snap_id: snap.record.id.clone(),
            image_url: public_object_url(ctx.storage_base, ctx.images_bucket, &snap.record.image_path),
            author_name: snap.author_name().map(|s| s.to_string()),
            description: truncate_display(&snap.record.description, 120),
            created_at: snap.record.created_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Geocoder;
    use crate::errors::GeocodeError;
    use crate::events::EventBus;
    use crate::models::{Identity, SnapRecord};
    use crate::session::SessionAccessor;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn snap(id: &str, lat: f64, lng: f64) -> Snap {
        Snap {
            record: SnapRecord {
                id: id.to_string(),
                author_id: "u1".to_string(),
                image_path: format!("user-u1/{id}.png"),
                description: format!("snap {id}"),
                lat: Some(lat),
                lng: Some(lng),
                created_at: Utc::now(),
            },
            author: None,
        }
    }

    fn membership(groups: &[ClusterGroup]) -> BTreeSet<BTreeSet<String>> {
        groups
            .iter()
            .map(|g| g.members.iter().map(|s| s.record.id.clone()).collect())
            .collect()
    }

    #[test]
    fn nearby_snaps_share_a_bucket_and_distant_ones_do_not() {
        let snaps = vec![
            snap("a", 37.77491, -122.41941),
            snap("b", 37.77494, -122.41943),
            snap("c", 37.780, -122.420),
        ];
        let groups = cluster_snaps(&snaps);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            membership(&groups),
            BTreeSet::from([
                BTreeSet::from(["a".to_string(), "b".to_string()]),
                BTreeSet::from(["c".to_string()]),
            ])
        );

        let shared = groups.iter().find(|g| g.members.len() == 2).unwrap();
        assert_eq!(shared.key, "37.775,-122.419");
    }

    #[test]
    fn clustering_is_order_independent_and_idempotent() {
        let snaps = vec![
            snap("a", 37.77491, -122.41941),
            snap("b", 37.77494, -122.41943),
            snap("c", 37.780, -122.420),
            snap("d", 0.0, 0.0),
        ];
        let mut permuted = snaps.clone();
        permuted.reverse();

        let original = membership(&cluster_snaps(&snaps));
        assert_eq!(original, membership(&cluster_snaps(&permuted)));
        assert_eq!(original, membership(&cluster_snaps(&snaps)));
    }

    #[test]
    fn unplaceable_snaps_are_skipped() {
        let mut lost = snap("lost", 0.0, 0.0);
        lost.record.lat = None;
        let groups = cluster_snaps(&[lost, snap("ok", 1.0, 2.0)]);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members[0].record.id, "ok");
    }

    struct NoGeocoder;

    #[async_trait]
    impl Geocoder for NoGeocoder {
        async fn reverse(&self, _lat: f64, _lng: f64) -> Result<Option<String>, GeocodeError> {
            Ok(None)
        }
    }

    struct NoIdentity;

    #[async_trait]
    impl crate::domain::IdentityProvider for NoIdentity {
        async fn current_user(&self) -> Result<Option<Identity>, anyhow::Error> {
            Ok(None)
        }

        fn authorize_url(&self, _redirect_to: &str) -> String {
            String::new()
        }
    }

    struct NoComments;

    #[async_trait]
    impl crate::domain::CommentRepository for NoComments {
        async fn insert(&self, _c: &crate::models::CommentRecord) -> Result<(), crate::errors::RepoError> {
            Ok(())
        }

        async fn list_for_snap(
            &self,
            _snap_id: &str,
        ) -> Result<Vec<crate::models::CommentRecord>, crate::errors::RepoError> {
            Ok(Vec::new())
        }
    }

    struct NoProfiles;

    #[async_trait]
    impl crate::domain::ProfileRepository for NoProfiles {
        async fn list_all(&self) -> Result<Vec<crate::models::ProfileRecord>, crate::errors::RepoError> {
            Ok(Vec::new())
        }

        async fn get_many(
            &self,
            _ids: &[String],
        ) -> Result<Vec<crate::models::ProfileRecord>, crate::errors::RepoError> {
            Ok(Vec::new())
        }
    }

    fn stores() -> (AddressDirectory, CommentStore) {
        let bus = EventBus::default();
        (
            AddressDirectory::new(Arc::new(NoGeocoder), bus.clone()),
            CommentStore::new(
                Arc::new(NoComments),
                Arc::new(NoProfiles),
                SessionAccessor::new(Arc::new(NoIdentity)),
                bus,
            ),
        )
    }

    const CTX: ViewContext<'static> = ViewContext {
        storage_base: "https://backend.example",
        images_bucket: "images",
    };

    #[test]
    fn singleton_groups_become_interactive_markers() {
        let (addresses, comments) = stores();
        let markers = build_markers(&[snap("a", 37.7749, -122.4194)], &addresses, &comments, None, CTX);

        assert_eq!(markers.len(), 1);
        let MapMarker::Snap { position, detail, .. } = &markers[0] else {
            panic!("expected a snap marker");
        };
        // Singleton markers sit at the snap's own coordinate, not the bucket's.
        assert_eq!(*position, (37.7749, -122.4194));
        assert_eq!(
            detail.image_url,
            "https://backend.example/object/public/images/user-u1/a.png"
        );
        assert_eq!(detail.address, AddressState::Searching);
        assert!(!detail.comment_submitting);
    }

    #[test]
    fn multi_member_groups_become_aggregate_markers() {
        let (addresses, comments) = stores();
        let snaps = [snap("a", 37.77491, -122.41941), snap("b", 37.77494, -122.41943)];
        let markers = build_markers(&snaps, &addresses, &comments, None, CTX);

        assert_eq!(markers.len(), 1);
        let MapMarker::Cluster { position, members, .. } = &markers[0] else {
            panic!("expected a cluster marker");
        };
        assert_eq!(*position, (37.775, -122.419));
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn user_location_marker_leads_when_known() {
        let (addresses, comments) = stores();
        let here = Position { lat: 1.0, lng: 2.0, accuracy: None };
        let markers = build_markers(&[], &addresses, &comments, Some(here), CTX);
        assert!(matches!(markers[0], MapMarker::UserLocation { position: (1.0, 2.0), .. }));
    }

    #[test]
    fn icons_are_shared_definitions() {
        assert!(std::ptr::eq(snap_icon(), snap_icon()));
        assert!(std::ptr::eq(user_location_icon(), user_location_icon()));
        assert!(!std::ptr::eq(snap_icon(), user_location_icon()));
    }

    #[test]
    fn feed_entries_truncate_long_descriptions() {
        let mut long = snap("a", 1.0, 2.0);
        long.record.description = "x".repeat(200);
        let feed = build_feed(&[long], CTX);
        assert_eq!(feed[0].description.chars().count(), 123);
        assert!(feed[0].description.ends_with("..."));
    }
}
