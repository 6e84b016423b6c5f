//! Binary entry point: wires CLI configuration into a running HTTP
//! service, following `ironposh-client-tokio`'s
//! `#[tokio::main]`/`clap::Parser`/`init_tracing` startup shape.

mod error;
mod pgstore;
mod routes;
mod state;

use anyhow::Context;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};
use xcpd_core::config::Args;
use xcpd_core::model::ResponderEndpoint;
use xcpd_directory::PgDirectoryStore;
use xcpd_saml::SigningIdentity;
use xcpd_transport::SoapClient;

use crate::pgstore::{PgDocumentStore, PgPatientStore};
use crate::state::AppState;

#[tokio::main]
#[instrument(name = "main", level = "info")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = xcpd_core::logging::init_tracing(args.verbose, args.log_file.as_deref());

    info!(bind_addr = %args.bind_addr, own_org_hcid = %args.own_org_hcid, "starting xcpd gateway");

    let identity = SigningIdentity::load(&args.client_cert_path, &args.client_key_path).context("loading signing identity")?;
    let transport =
        SoapClient::new(&args.client_cert_path, &args.client_key_path, &args.trust_bundle_path).context("building SOAP transport")?;
    let qualifications = args.qualifications().context("building gateway qualifications")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&args.database_url)
        .await
        .context("connecting to database")?;

    let national_endpoints = load_national_endpoints(&args.national_endpoints_path)?;
    info!(count = national_endpoints.len(), "loaded national endpoint directory");

    let directory = PgDirectoryStore::new(pool.clone());
    let patients = PgPatientStore::new(pool.clone());
    let documents = PgDocumentStore::new(pool.clone(), args.own_org_hcid.clone());

    let mut known_urls = args.known_responder_urls.clone();
    known_urls.push(args.own_url.clone());

    let state = Arc::new(AppState {
        transport,
        identity,
        qualifications,
        directory,
        patients,
        documents,
        national_endpoints,
        radius_ladder: args.radius_ladder.clone(),
        max_responders: args.max_responders,
        own_org_hcid: args.own_org_hcid.clone(),
        own_url: args.own_url.clone(),
        known_urls,
    });

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await.context("binding listener")?;
    info!(bind_addr = %args.bind_addr, "listening");
    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}

/// Reads the national-responder directory (`directory/main.py`'s
/// `national.json`) from disk.
fn load_national_endpoints(path: &std::path::Path) -> anyhow::Result<Vec<ResponderEndpoint>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let endpoints = serde_json::from_str(&raw).with_context(|| format!("parsing {} as JSON", path.display()))?;
    Ok(endpoints)
}
