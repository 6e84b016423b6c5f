//! Two-pass federated search orchestrator (§4.6), grounded on
//! `main.py#lambda_handler`'s `getCarequalityPatient` branch.

use crate::{PipelineError, Search};
use chrono::{DateTime, Utc};
use xcpd_core::model::{DocsByType, PatientMetadata, ResponderEndpoint, UserQualifications};
use xcpd_directory::DirectoryStore;
use xcpd_saml::SigningIdentity;
use xcpd_transport::SoapClient;

pub struct FederatedSearchResult {
    pub matched_pipeline_names: Vec<String>,
    pub shared_pid: String,
    pub regional_docs: Vec<(String, DocsByType)>,
    pub national_docs: Vec<(String, DocsByType)>,
}

/// `radius_ladder` is consumed widest-first (e.g. `[100, 30, 10]`,
/// `xcpd-core::config::Args`' default): the first entry is tried, and
/// re-queries step through the remaining entries only while the result
/// set still exceeds 80 responders.
#[allow(clippy::too_many_arguments)]
pub async fn run_federated_search(
    transport: &SoapClient,
    identity: &SigningIdentity,
    qualifications: &UserQualifications,
    directory: &impl DirectoryStore,
    own_org_hcid: &str,
    metadata: &PatientMetadata,
    caller_zip_codes: &[String],
    country: &str,
    national_endpoints: Vec<ResponderEndpoint>,
    radius_ladder: &[u32],
    max_responders: usize,
    issued_at: DateTime<Utc>,
) -> Result<Option<FederatedSearchResult>, PipelineError> {
    // 1. National pass.
    let mut national_search = Search::new(national_endpoints, true);
    national_search
        .collect_all_possible_patients(transport, identity, qualifications, own_org_hcid, metadata, issued_at)
        .await?;

    // 2. Conflict check.
    let mut past_zips = national_search.conflict_check();
    let national_matched = national_search.matched_pipeline_names();

    // 3. Zip-code union.
    let mut zip_codes: Vec<String> = caller_zip_codes.to_vec();
    zip_codes.append(&mut past_zips);
    zip_codes.sort();
    zip_codes.dedup();

    // 4. Directory lookup with radius escalation.
    let mut ladder = radius_ladder.iter();
    let Some(&first_radius) = ladder.next() else {
        tracing::warn!("federated search: empty radius ladder, cannot run regional pass");
        return Ok(None);
    };
    let mut responders = xcpd_directory::get_endpoints(directory, &zip_codes, first_radius, country, &[]).await?;
    while responders.len() > 80 {
        let Some(&next_radius) = ladder.next() else { break };
        responders = xcpd_directory::get_endpoints(directory, &zip_codes, next_radius, country, &national_matched).await?;
    }
    responders.truncate(max_responders);

    // 5. Regional pass.
    let mut regional_search = Search::new(responders, false);
    regional_search
        .collect_all_possible_patients(transport, identity, qualifications, own_org_hcid, metadata, issued_at)
        .await?;
    regional_search.conflict_check();
    let regional_matched = regional_search.matched_pipeline_names();

    // 6. Combine; early termination if nothing was found anywhere.
    let mut matched = national_matched;
    matched.extend(regional_matched);
    if matched.is_empty() {
        tracing::info!("federated search: patient_not_found");
        return Ok(None);
    }

    // 7. Shared pid across both searches.
    let shared_pid = uuid::Uuid::new_v4().to_string();
    regional_search.internal_pid = Some(shared_pid.clone());
    national_search.internal_pid = Some(shared_pid.clone());

    // 8. Regional first, then national, sequentially — avoids the
    // race the original source documents between the two passes
    // writing into the same downstream store.
    let regional_docs = regional_search.find_docs_for_conflict_free_patients(transport, identity, qualifications).await?;
    let national_docs = national_search.find_docs_for_conflict_free_patients(transport, identity, qualifications).await?;

    Ok(Some(FederatedSearchResult {
        matched_pipeline_names: matched,
        shared_pid,
        regional_docs,
        national_docs,
    }))
}
