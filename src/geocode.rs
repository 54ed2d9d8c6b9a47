use crate::domain::Geocoder;
use crate::errors::GeocodeError;
use crate::events::{EventBus, StoreEvent};
use crate::models::Snap;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing;

/// Nominatim-style reverse geocoder. Identifies itself through the
/// configured client label (`User-Agent`); no API key.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(endpoint: String, client_label: &str) -> Result<Self, GeocodeError> {
        let http = reqwest::Client::builder()
            .user_agent(client_label)
            .build()
            .map_err(|e| {
                GeocodeError::Backend(anyhow::Error::new(e).context("building geocoder HTTP client"))
            })?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse(&self, lat: f64, lng: f64) -> Result<Option<String>, GeocodeError> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[
                ("format", "jsonv2"),
                ("lat", &lat.to_string()),
                ("lon", &lng.to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                GeocodeError::Backend(anyhow::Error::new(e).context("reverse geocode request"))
            })?;

        if !resp.status().is_success() {
            return Ok(None);
        }

        let body: serde_json::Value = resp.json().await.map_err(|e| {
            GeocodeError::Backend(anyhow::Error::new(e).context("decoding reverse geocode response"))
        })?;

        Ok(body
            .get("display_name")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }
}

/// What a consumer should render for one snap's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressState {
    /// No lookup has completed for this snap.
    Searching,
    Resolved(String),
    /// The lookup finished without an address (failed, empty, or the
    /// coordinates were unusable).
    Unavailable,
}

/// Per-snap reverse-geocoded addresses.
///
/// State is derived solely from key presence: an absent key means a lookup
/// has not completed ("searching"), a present `None` means it completed
/// without an address. The map is replaced wholesale on each refresh and
/// never merged; entries live until the next refresh. No retries, no
/// eviction.
pub struct AddressDirectory {
    geocoder: Arc<dyn Geocoder>,
    bus: EventBus,
    entries: RwLock<HashMap<String, Option<String>>>,
}

impl AddressDirectory {
    pub fn new(geocoder: Arc<dyn Geocoder>, bus: EventBus) -> Self {
        Self {
            geocoder,
            bus,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn state(&self, snap_id: &str) -> AddressState {
        let entries = self.entries.read().expect("address lock poisoned");
        match entries.get(snap_id) {
            None => AddressState::Searching,
            Some(Some(address)) => AddressState::Resolved(address.clone()),
            Some(None) => AddressState::Unavailable,
        }
    }

    pub fn snapshot(&self) -> HashMap<String, Option<String>> {
        self.entries.read().expect("address lock poisoned").clone()
    }

    /// Resolves an address for every snap in the collection, one lookup per
    /// snap (no coordinate dedup), then swaps the whole map in. The previous
    /// map stays visible until the batch settles.
    pub async fn refresh(&self, snaps: &[Snap]) {
        if snaps.is_empty() {
            *self.entries.write().expect("address lock poisoned") = HashMap::new();
            self.bus.emit_lossy(StoreEvent::AddressesReplaced);
            return;
        }

        let lookups = snaps.iter().map(|snap| {
            let snap_id = snap.record.id.clone();
            let coordinates = snap.coordinates();
            let geocoder = Arc::clone(&self.geocoder);
            async move {
                let address = match coordinates {
                    // Unusable coordinates resolve locally, no external call.
                    None => None,
                    Some((lat, lng)) => match geocoder.reverse(lat, lng).await {
                        Ok(address) => address,
                        Err(e) => {
                            tracing::warn!(%snap_id, error = %e, "Reverse geocode lookup failed");
                            None
                        }
                    },
                };
                (snap_id, address)
            }
        });

        let resolved: HashMap<String, Option<String>> =
            futures::future::join_all(lookups).await.into_iter().collect();
        *self.entries.write().expect("address lock poisoned") = resolved;
        self.bus.emit_lossy(StoreEvent::AddressesReplaced);
    }
}
