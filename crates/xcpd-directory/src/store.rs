//! Persistence boundary. `DirectoryStore` is implemented against
//! Postgres (`PgDirectoryStore`) but kept as a trait so the resolver
//! and inheritance logic stay testable without a live database.

use crate::DirectoryError;
use sqlx::{FromRow, PgPool};
use std::future::Future;
use xcpd_core::model::{DirectoryOrganization, ResponderEndpoint};

pub trait DirectoryStore: Send + Sync {
    /// Rows of `neighboring_zipcodes_{radius}mi` for each of `zips`,
    /// already unioned and flattened.
    fn neighbor_zipcodes(
        &self,
        radius_column: &'static str,
        zips: &[String],
    ) -> impl Future<Output = Result<Vec<String>, DirectoryError>> + Send;

    /// Active endpoint rows whose zipcode is in `zips`.
    fn endpoints_for_zipcodes(&self, zips: &[String]) -> impl Future<Output = Result<Vec<ResponderEndpoint>, DirectoryError>> + Send;

    /// Organizations still missing coordinates, newest first, capped at `limit`.
    fn organizations_missing_coordinates(&self, limit: i64) -> impl Future<Output = Result<Vec<DirectoryOrganization>, DirectoryError>> + Send;

    fn update_coordinates(&self, zipcode: &str, latitude: f64, longitude: f64) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    fn all_organizations(&self) -> impl Future<Output = Result<Vec<DirectoryOrganization>, DirectoryError>> + Send;

    fn organization_by_oid(&self, oid: &str) -> impl Future<Output = Result<Option<DirectoryOrganization>, DirectoryError>> + Send;

    fn upsert_organization(&self, org: &DirectoryOrganization) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    fn delete_organization(&self, oid: &str) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// §4.7's cleanup pass: delete rows still missing a URL, a
    /// coordinate, or a zip. Returns the number of rows removed.
    fn delete_incomplete(&self) -> impl Future<Output = Result<u64, DirectoryError>> + Send;
}

pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct EndpointRow {
    oid: String,
    name: String,
    iti55_responder: Option<String>,
    iti38_responder: Option<String>,
    iti39_responder: Option<String>,
}

impl From<EndpointRow> for ResponderEndpoint {
    fn from(row: EndpointRow) -> Self {
        ResponderEndpoint {
            name: row.name,
            oid: row.oid.trim_start_matches("urn:oid:").to_string(),
            iti55_responder: row.iti55_responder,
            iti38_responder: row.iti38_responder,
            iti39_responder: row.iti39_responder,
        }
    }
}

#[derive(FromRow)]
struct OrganizationRow {
    oid: String,
    name: String,
    iti55_responder: Option<String>,
    iti38_responder: Option<String>,
    iti39_responder: Option<String>,
    address: Option<String>,
    longitude: Option<f64>,
    latitude: Option<f64>,
    zipcode: Option<String>,
    country_code: Option<String>,
    part_of: Option<String>,
    managing_org: Option<String>,
    status: bool,
}

impl From<OrganizationRow> for DirectoryOrganization {
    fn from(row: OrganizationRow) -> Self {
        DirectoryOrganization {
            oid: row.oid,
            name: row.name,
            iti55_responder: row.iti55_responder,
            iti38_responder: row.iti38_responder,
            iti39_responder: row.iti39_responder,
            address: row.address,
            longitude: row.longitude,
            latitude: row.latitude,
            zipcode: row.zipcode,
            country_code: row.country_code,
            part_of: row.part_of,
            managing_org: row.managing_org,
            active: row.status,
        }
    }
}

impl DirectoryStore for PgDirectoryStore {
    async fn neighbor_zipcodes(&self, radius_column: &'static str, zips: &[String]) -> Result<Vec<String>, DirectoryError> {
        let query = format!("SELECT {radius_column} FROM zipcode_neighbors WHERE zipcode = ANY($1)");
        let rows: Vec<(Vec<String>,)> = sqlx::query_as(&query).bind(zips).fetch_all(&self.pool).await?;

        let mut neighbors = std::collections::BTreeSet::new();
        for (zips_for_row,) in rows {
            neighbors.extend(zips_for_row);
        }
        Ok(neighbors.into_iter().collect())
    }

    async fn endpoints_for_zipcodes(&self, zips: &[String]) -> Result<Vec<ResponderEndpoint>, DirectoryError> {
        let rows: Vec<EndpointRow> = sqlx::query_as(
            "SELECT oid, name, iti55_responder, iti38_responder, iti39_responder \
             FROM directory WHERE zipcode = ANY($1) AND status",
        )
        .bind(zips)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn organizations_missing_coordinates(&self, limit: i64) -> Result<Vec<DirectoryOrganization>, DirectoryError> {
        let rows: Vec<OrganizationRow> = sqlx::query_as(
            "SELECT oid, name, iti55_responder, iti38_responder, iti39_responder, address, \
             longitude, latitude, zipcode, country_code, part_of, managing_org, status \
             FROM directory WHERE longitude IS NULL AND latitude IS NULL \
             ORDER BY zipcode DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_coordinates(&self, zipcode: &str, latitude: f64, longitude: f64) -> Result<(), DirectoryError> {
        sqlx::query("UPDATE directory SET latitude = $1, longitude = $2 WHERE zipcode = $3")
            .bind(latitude)
            .bind(longitude)
            .bind(zipcode)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn all_organizations(&self) -> Result<Vec<DirectoryOrganization>, DirectoryError> {
        let rows: Vec<OrganizationRow> = sqlx::query_as(
            "SELECT oid, name, iti55_responder, iti38_responder, iti39_responder, address, \
             longitude, latitude, zipcode, country_code, part_of, managing_org, status FROM directory",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn organization_by_oid(&self, oid: &str) -> Result<Option<DirectoryOrganization>, DirectoryError> {
        let row: Option<OrganizationRow> = sqlx::query_as(
            "SELECT oid, name, iti55_responder, iti38_responder, iti39_responder, address, \
             longitude, latitude, zipcode, country_code, part_of, managing_org, status \
             FROM directory WHERE oid = $1 OR oid = $2",
        )
        .bind(oid)
        .bind(format!("urn:oid:{oid}"))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_organization(&self, org: &DirectoryOrganization) -> Result<(), DirectoryError> {
        sqlx::query(
            "INSERT INTO directory (oid, name, iti55_responder, iti38_responder, iti39_responder, \
             address, longitude, latitude, zipcode, country_code, part_of, managing_org, status) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) \
             ON CONFLICT (oid) DO UPDATE SET \
             name = EXCLUDED.name, iti55_responder = EXCLUDED.iti55_responder, \
             iti38_responder = EXCLUDED.iti38_responder, iti39_responder = EXCLUDED.iti39_responder, \
             address = EXCLUDED.address, longitude = EXCLUDED.longitude, latitude = EXCLUDED.latitude, \
             zipcode = EXCLUDED.zipcode, country_code = EXCLUDED.country_code, part_of = EXCLUDED.part_of, \
             managing_org = EXCLUDED.managing_org, status = EXCLUDED.status",
        )
        .bind(&org.oid)
        .bind(&org.name)
        .bind(&org.iti55_responder)
        .bind(&org.iti38_responder)
        .bind(&org.iti39_responder)
        .bind(&org.address)
        .bind(org.longitude)
        .bind(org.latitude)
        .bind(&org.zipcode)
        .bind(&org.country_code)
        .bind(&org.part_of)
        .bind(&org.managing_org)
        .bind(org.active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_organization(&self, oid: &str) -> Result<(), DirectoryError> {
        sqlx::query("DELETE FROM directory WHERE oid = $1").bind(oid).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_incomplete(&self) -> Result<u64, DirectoryError> {
        let result = sqlx::query(
            "DELETE FROM directory WHERE iti55_responder IS NULL OR iti38_responder IS NULL \
             OR iti39_responder IS NULL OR longitude IS NULL OR latitude IS NULL OR zipcode IS NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
