//! Zip-radius proximity lookup, geocode augmentation, and organization
//! endpoint inheritance — grounded on `directory/main.py`,
//! `directory/new_insert.py` and `directory/utils.py`.

pub mod endpoints;
pub mod geocode;
pub mod inherit;
pub mod store;

pub use endpoints::get_endpoints;
pub use geocode::{augment_long_lat, GeocodeClient, NominatimClient};
pub use inherit::run_inheritance_passes;
pub use store::{DirectoryStore, PgDirectoryStore};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("unsupported search radius {0} mi (expected 10, 30, or 100)")]
    UnsupportedRadius(u32),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("geocode request failed")]
    Geocode(#[source] reqwest::Error),
}
