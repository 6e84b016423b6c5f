//! HTTP surface (§6): SOAP responder endpoints routed by path, plus a
//! single JSON action-envelope endpoint for the orchestrator and
//! directory maintenance actions — grounded on `search/main.py` and
//! `directory/main.py`'s `lambda_handler` dispatch, reshaped from a
//! cloud-function `event`/`https_response` pair into an `axum` router.

use crate::error::XcpdError;
use crate::state::SharedState;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use xcpd_core::model::PatientMetadata;
use xcpd_directory::{get_endpoints, NominatimClient};
use xcpd_pipeline::run_federated_search;
use xcpd_responder::{iti38, iti39, iti55};

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/iti55responder", post(iti55_responder))
        .route("/iti38responder", post(iti38_responder))
        .route("/iti39responder", post(iti39_responder))
        .route("/", post(dispatch_action))
        .with_state(state)
}

async fn iti55_responder(State(state): State<SharedState>, body: String) -> Result<String, XcpdError> {
    let document = xcpd_xml::parser::parse(&body).map_err(xcpd_responder::ResponderError::from)?;
    Ok(iti55::handle_request(&document, &state.patients, &state.known_urls, &state.own_org_hcid, &state.own_url).await?)
}

async fn iti38_responder(State(state): State<SharedState>, body: String) -> Result<String, XcpdError> {
    let document = xcpd_xml::parser::parse(&body).map_err(xcpd_responder::ResponderError::from)?;
    Ok(iti38::handle_request(&document, &state.documents, &state.known_urls).await?)
}

async fn iti39_responder(State(state): State<SharedState>, body: String) -> Result<String, XcpdError> {
    let document = xcpd_xml::parser::parse(&body).map_err(xcpd_responder::ResponderError::from)?;
    Ok(iti39::handle_request(&document, &state.documents, &state.known_urls, &state.own_org_hcid).await?)
}

/// `{"action": ..., "params": {...}}`, matching `main.py#lambda_handler`'s
/// `event['body']` shape verbatim (minus the Lambda envelope fields).
#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn dispatch_action(State(state): State<SharedState>, Json(envelope): Json<ActionEnvelope>) -> Result<Json<serde_json::Value>, XcpdError> {
    let result = match envelope.action.as_str() {
        "getCarequalityPatient" => get_carequality_patient(&state, envelope.params).await?,
        "getEndpoints" => get_endpoints_action(&state, envelope.params).await?,
        "getNationalEndpoints" => serde_json::to_value(&state.national_endpoints).unwrap_or_default(),
        "augmentLongLat" => augment_long_lat_action(&state).await?,
        "insert_prod_directory" => insert_prod_directory_action(&state).await?,
        other => serde_json::json!({"error": format!("unknown action: {other}")}),
    };
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct CarequalityParams {
    connection_id: String,
    #[serde(flatten)]
    patient_metadata: PatientMetadata,
    #[serde(default)]
    location_search_zip: Vec<String>,
    #[serde(default = "default_country")]
    country: String,
}

fn default_country() -> String {
    "US".to_string()
}

#[derive(Debug, Serialize)]
struct CarequalityResult {
    connection_id: String,
    message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pid: Option<String>,
}

/// `main.py#lambda_handler`'s `getCarequalityPatient` branch, run
/// against the gateway's own identity/qualifications rather than the
/// never-populated `user_qualifications = {}` placeholder the original
/// left unfinished.
async fn get_carequality_patient(state: &SharedState, params: serde_json::Value) -> Result<serde_json::Value, XcpdError> {
    let params: CarequalityParams = serde_json::from_value(params).map_err(|_| xcpd_responder::ResponderError::MalformedRequest)?;

    let result = run_federated_search(
        &state.transport,
        &state.identity,
        &state.qualifications,
        &state.directory,
        &state.own_org_hcid,
        &params.patient_metadata,
        &params.location_search_zip,
        &params.country,
        state.national_endpoints.clone(),
        &state.radius_ladder,
        state.max_responders,
        Utc::now(),
    )
    .await?;

    let result = match result {
        Some(found) => CarequalityResult {
            connection_id: params.connection_id,
            message_type: "patient_found",
            pid: Some(found.shared_pid),
        },
        None => CarequalityResult {
            connection_id: params.connection_id,
            message_type: "patient_not_found",
            pid: None,
        },
    };
    Ok(serde_json::to_value(result).unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct EndpointsParams {
    #[serde(default = "default_radius")]
    radius: u32,
    #[serde(default = "default_country")]
    country: String,
    #[serde(default)]
    exclude: Vec<String>,
    zip_codes: Vec<String>,
}

fn default_radius() -> u32 {
    100
}

/// `directory/main.py#lambda_handler`'s `getEndpoints` branch.
async fn get_endpoints_action(state: &SharedState, params: serde_json::Value) -> Result<serde_json::Value, XcpdError> {
    let params: EndpointsParams = serde_json::from_value(params).map_err(|_| xcpd_responder::ResponderError::MalformedRequest)?;
    let endpoints = get_endpoints(&state.directory, &params.zip_codes, params.radius, &params.country, &params.exclude).await?;
    Ok(serde_json::to_value(endpoints).unwrap_or_default())
}

/// `directory/main.py#lambda_handler`'s `augmentLongLat` branch.
async fn augment_long_lat_action(state: &SharedState) -> Result<serde_json::Value, XcpdError> {
    let geocoder = NominatimClient::default();
    let updated = xcpd_directory::augment_long_lat(&state.directory, &geocoder).await?;
    Ok(serde_json::json!({"updated": updated}))
}

/// `directory/main.py#lambda_handler`'s `insert_prod_directory` branch.
async fn insert_prod_directory_action(state: &SharedState) -> Result<serde_json::Value, XcpdError> {
    let history = xcpd_directory::run_inheritance_passes(&state.directory).await?;
    Ok(serde_json::json!({"passes": history}))
}
