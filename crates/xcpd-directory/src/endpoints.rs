//! `get_endpoints` — zip-radius proximity lookup, grounded on
//! `directory/main.py#get_endpoints` and `directory/utils.py`.

use crate::{DirectoryError, DirectoryStore};
use std::collections::HashSet;
use xcpd_core::model::ResponderEndpoint;

fn radius_column(radius: u32) -> Result<&'static str, DirectoryError> {
    match radius {
        10 => Ok("neighboring_zipcodes_10mi"),
        30 => Ok("neighboring_zipcodes_30mi"),
        100 => Ok("neighboring_zipcodes_100mi"),
        other => Err(DirectoryError::UnsupportedRadius(other)),
    }
}

/// Strips a `+4` suffix and leading zeros from each input zip, the way
/// `main.py#get_endpoints` does before the neighbor lookup.
fn normalize_zip(zip: &str) -> String {
    let base = zip.split('-').next().unwrap_or(zip);
    let stripped = base.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

fn repad(zip: &str) -> String {
    format!("{zip:0>5}")
}

/// Resolves active, validated endpoints within `radius` miles of any of
/// `zip_codes`. Non-US/USA country codes return an empty result
/// immediately, matching the original lambda's early return.
pub async fn get_endpoints(
    store: &impl DirectoryStore,
    zip_codes: &[String],
    radius: u32,
    country: &str,
    exclude: &[String],
) -> Result<Vec<ResponderEndpoint>, DirectoryError> {
    if !matches!(country, "US" | "USA") {
        return Ok(Vec::new());
    }

    let normalized: Vec<String> = zip_codes.iter().map(|z| normalize_zip(z)).collect();
    let column = radius_column(radius)?;

    let neighbors = store.neighbor_zipcodes(column, &normalized).await?;
    let repadded: Vec<String> = neighbors.iter().map(|z| repad(z)).collect();

    let rows = store.endpoints_for_zipcodes(&repadded).await?;

    let exclude_set: HashSet<String> = exclude.iter().cloned().collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for endpoint in rows {
        let Some(validated) = endpoint.validate(&exclude_set) else {
            continue;
        };
        if seen.insert(validated.clone()) {
            out.push(validated);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plus_four_and_leading_zeros() {
        assert_eq!(normalize_zip("00501-1234"), "501");
        assert_eq!(normalize_zip("00000"), "0");
    }

    #[test]
    fn repads_to_five_digits() {
        assert_eq!(repad("501"), "00501");
        assert_eq!(repad("90210"), "90210");
    }

    #[test]
    fn rejects_unsupported_radius() {
        assert!(matches!(radius_column(42), Err(DirectoryError::UnsupportedRadius(42))));
    }
}
