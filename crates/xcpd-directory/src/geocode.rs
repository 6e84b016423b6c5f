//! Coordinate augmentation for directory rows, grounded on
//! `directory/main.py#get_coordinates`/`insert_long_lat`.

use crate::{DirectoryError, DirectoryStore};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Third-party zip→coordinate lookup, kept as a trait so the Nominatim
/// HTTP dependency is swappable in tests.
pub trait GeocodeClient: Send + Sync {
    fn lookup(&self, zip: &str) -> impl Future<Output = Result<Option<(f64, f64)>, DirectoryError>> + Send;
}

#[derive(Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
}

pub struct NominatimClient {
    client: reqwest::Client,
}

impl Default for NominatimClient {
    fn default() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl GeocodeClient for NominatimClient {
    async fn lookup(&self, zip: &str) -> Result<Option<(f64, f64)>, DirectoryError> {
        let results: Vec<NominatimResult> = self
            .client
            .get("https://nominatim.openstreetmap.org/search")
            .query(&[("q", zip), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(DirectoryError::Geocode)?
            .json()
            .await
            .map_err(DirectoryError::Geocode)?;

        Ok(results.first().and_then(|result| {
            let lat: f64 = result.lat.parse().ok()?;
            let lon: f64 = result.lon.parse().ok()?;
            Some((lat, lon))
        }))
    }
}

/// Geocodes directory rows missing coordinates, newest-zipcode-first,
/// throttled to 5 requests/sec. A single failed lookup backs off one
/// second and moves on rather than aborting the whole run.
pub async fn augment_long_lat(store: &impl DirectoryStore, client: &impl GeocodeClient) -> Result<usize, DirectoryError> {
    let rows = store.organizations_missing_coordinates(i64::MAX).await?;
    let mut updated = 0;

    for org in rows {
        let Some(zipcode) = org.zipcode.as_deref() else { continue };
        let padded = format!("{zipcode:0>5}");

        match client.lookup(&padded).await {
            Ok(Some((latitude, longitude))) => {
                store.update_coordinates(&padded, latitude, longitude).await?;
                updated += 1;
            }
            Ok(None) => {
                tracing::debug!(zipcode = %padded, "geocode lookup returned no results");
            }
            Err(error) => {
                tracing::warn!(zipcode = %padded, %error, "geocode lookup failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    Ok(updated)
}
