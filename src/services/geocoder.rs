use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Address-to-coordinates lookup.
pub trait Geocoder: Send + Sync {
    /// Resolve an address. `Ok(None)` means the provider had no match.
    fn geocode(&self, address: &str) -> Result<Option<GeoPoint>>;
}

#[derive(Debug, Deserialize)]
struct GeocodeHit {
    lat: String,
    lon: String,
}

/// Client for a Nominatim-style HTTP geocoder.
///
/// `GET {base}/search?format=json&limit=1&q=<address>` returning a JSON array
/// of hits with string latitude/longitude. The drain engine's backpressure
/// pause is what keeps us polite to this API; the client itself does one
/// request per call.
pub struct HttpGeocoder {
    base_url: String,
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: OnceLock::new(),
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        if self.client.get().is_none() {
            let client = reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .context("Failed to build geocoder HTTP client")?;
            let _ = self.client.set(client);
        }
        Ok(self.client.get().expect("client initialized above"))
    }
}

impl Geocoder for HttpGeocoder {
    fn geocode(&self, address: &str) -> Result<Option<GeoPoint>> {
        let hits: Vec<GeocodeHit> = self
            .client()?
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("limit", "1"), ("q", address)])
            .send()
            .with_context(|| format!("Geocoder request failed for {:?}", address))?
            .error_for_status()
            .context("Geocoder returned an error status")?
            .json()
            .context("Geocoder returned malformed JSON")?;

        let Some(hit) = hits.first() else {
            debug!("Geocoder found no match for {:?}", address);
            return Ok(None);
        };

        let lat = hit.lat.parse().context("Geocoder returned bad latitude")?;
        let lon = hit.lon.parse().context("Geocoder returned bad longitude")?;
        Ok(Some(GeoPoint { lat, lon }))
    }
}

/// Resolves nothing. Used when no geocoder is configured.
pub struct NullGeocoder;

impl Geocoder for NullGeocoder {
    fn geocode(&self, _address: &str) -> Result<Option<GeoPoint>> {
        Ok(None)
    }
}
