//! `Search`/`CQSearch` — one pass (national or regional) across many
//! responders, grounded on `chained.py`'s `CQSearch` class.

use crate::{Pipeline, PipelineError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use xcpd_core::model::{DocsByType, PatientMetadata, PipelineOutcome, ResponderEndpoint, UserQualifications};
use xcpd_saml::SigningIdentity;
use xcpd_transport::SoapClient;

pub struct Search {
    pub pipelines: Vec<Pipeline>,
    pub national: bool,
    /// Indices into `pipelines` that matched a patient, set by `conflict_check`.
    remaining: Vec<usize>,
    pub internal_pid: Option<String>,
}

impl Search {
    pub fn new(endpoints: Vec<ResponderEndpoint>, national: bool) -> Self {
        let pipelines = endpoints.into_iter().filter_map(|endpoint| Pipeline::new(endpoint, national)).collect();
        Self {
            pipelines,
            national,
            remaining: Vec::new(),
            internal_pid: None,
        }
    }

    /// Runs ITI-55 across every pipeline concurrently — `gather_55_pipelines`.
    #[allow(clippy::too_many_arguments)]
    pub async fn collect_all_possible_patients(
        &mut self,
        transport: &SoapClient,
        identity: &SigningIdentity,
        qualifications: &UserQualifications,
        own_org_hcid: &str,
        metadata: &PatientMetadata,
        issued_at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let outcomes = futures::future::join_all(
            self.pipelines
                .iter_mut()
                .map(|pipeline| pipeline.initiate_xcpd(transport, identity, qualifications, own_org_hcid, metadata, issued_at)),
        )
        .await;
        for outcome in outcomes {
            outcome?;
        }
        Ok(())
    }

    /// Drops pipelines without a `Matched` outcome; returns the union
    /// of surviving pipelines' postal codes — `conflict_checker`.
    /// Intentionally demographic-blind (§4.6/§9): no cross-validation
    /// of the matched patient's identity across responders.
    pub fn conflict_check(&mut self) -> Vec<String> {
        let mut past_zips = HashSet::new();
        self.remaining = self
            .pipelines
            .iter()
            .enumerate()
            .filter_map(|(i, pipeline)| match &pipeline.outcome {
                Some(PipelineOutcome::Matched { patient, .. }) => {
                    if let Some(zip) = &patient.postal_code {
                        past_zips.insert(zip.clone());
                    }
                    Some(i)
                }
                _ => None,
            })
            .collect();
        past_zips.into_iter().collect()
    }

    pub fn matched_pipeline_names(&self) -> Vec<String> {
        self.remaining.iter().map(|&i| self.pipelines[i].name.clone()).collect()
    }

    /// ITI-38/39 for every conflict-free pipeline, concurrently —
    /// `find_docs_for_conflict_free_patients`.
    pub async fn find_docs_for_conflict_free_patients(
        &self,
        transport: &SoapClient,
        identity: &SigningIdentity,
        qualifications: &UserQualifications,
    ) -> Result<Vec<(String, DocsByType)>, PipelineError> {
        let results = futures::future::join_all(self.remaining.iter().map(|&i| {
            let pipeline = &self.pipelines[i];
            async move { (pipeline.name.clone(), pipeline.find_docs(transport, identity, qualifications).await) }
        }))
        .await;

        let mut out = Vec::with_capacity(results.len());
        for (name, docs) in results {
            out.push((name, docs?));
        }
        Ok(out)
    }
}
