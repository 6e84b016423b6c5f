//! Per-responder XCPD→XCA state carrier, grounded on `chained.py`'s
//! `Pipeline` class.

use crate::PipelineError;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use xcpd_core::model::{DocsByType, DocumentReference, PatientMetadata, PipelineOutcome, ResponderEndpoint, UserQualifications};
use xcpd_messages::{envelope, iti38, iti39, iti55, Action};
use xcpd_saml::SigningIdentity;
use xcpd_transport::SoapClient;

/// One responder's XCPD discovery attempt and, if matched, its
/// document retrieval. `national` governs both the ITI-55 timeout
/// (§4.3) and whether the request carries a `patientAddress` parameter.
pub struct Pipeline {
    pub name: String,
    pub oid: String,
    pub iti55_url: String,
    pub iti38_url: String,
    pub iti39_url: String,
    pub national: bool,
    pub outcome: Option<PipelineOutcome>,
}

impl Pipeline {
    /// `None` if `endpoint` is missing any of its three responder URLs
    /// — callers are expected to have already run `ResponderEndpoint::validate`.
    pub fn new(endpoint: ResponderEndpoint, national: bool) -> Option<Self> {
        Some(Self {
            name: endpoint.name,
            oid: endpoint.oid,
            iti55_url: endpoint.iti55_responder?,
            iti38_url: endpoint.iti38_responder?,
            iti39_url: endpoint.iti39_responder?,
            national,
            outcome: None,
        })
    }

    /// Runs the ITI-55 discovery transaction and records the outcome.
    #[allow(clippy::too_many_arguments)]
    pub async fn initiate_xcpd(
        &mut self,
        transport: &SoapClient,
        identity: &SigningIdentity,
        qualifications: &UserQualifications,
        own_org_hcid: &str,
        metadata: &PatientMetadata,
        issued_at: DateTime<Utc>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let creation_time = issued_at.format("%Y%m%d%H%M%S").to_string();
        let body = iti55::build_request_body(metadata, own_org_hcid, &self.oid, self.national, &creation_time);
        let envelope = envelope::build_request(identity, qualifications, Action::Iti55Request, &self.iti55_url, None, issued_at, body)?;

        let timeout = Duration::from_secs(iti55::timeout_secs(self.national));
        let response = transport.post(&self.iti55_url, envelope, timeout).await;
        let outcome = iti55::parse_response(response.as_deref());

        self.outcome = Some(outcome.clone());
        Ok(outcome)
    }

    pub fn patient_id(&self) -> Option<(String, String)> {
        match &self.outcome {
            Some(PipelineOutcome::Matched { patient_id, .. }) => Some(patient_id.clone()),
            _ => None,
        }
    }

    /// ITI-38 then chunked ITI-39, with a small jitter between the two
    /// — grounded on `Pipeline.get_docs`. Returns an empty map if this
    /// pipeline never matched a patient.
    pub async fn find_docs(&self, transport: &SoapClient, identity: &SigningIdentity, qualifications: &UserQualifications) -> Result<DocsByType, PipelineError> {
        let Some(pid) = self.patient_id() else {
            return Ok(DocsByType::new());
        };

        let body = iti38::build_request_body(&[pid], &self.oid, "LeafClass");
        let envelope = envelope::build_request(identity, qualifications, Action::Iti38Request, &self.iti38_url, None, Utc::now(), body)?;
        let timeout = Duration::from_secs(iti38::TIMEOUT_SECS);
        let response = transport.post(&self.iti38_url, envelope, timeout).await;
        let refs = iti38::parse_response(response.as_deref(), &self.oid);

        if refs.is_empty() {
            return Ok(DocsByType::new());
        }

        jitter().await;

        let mut docs = DocsByType::new();
        let chunk_results = futures::future::join_all(iti39::chunk(&refs).map(|chunk| self.retrieve_chunk(transport, identity, qualifications, chunk))).await;

        for result in chunk_results {
            for (doc_type, doc_xml) in result? {
                docs.entry(doc_type).or_default().push(doc_xml);
            }
        }
        Ok(docs)
    }

    async fn retrieve_chunk(
        &self,
        transport: &SoapClient,
        identity: &SigningIdentity,
        qualifications: &UserQualifications,
        chunk: &[DocumentReference],
    ) -> Result<Vec<(String, String)>, PipelineError> {
        let body = iti39::build_request_body(chunk);
        let envelope = envelope::build_request(identity, qualifications, Action::Iti39Request, &self.iti39_url, None, Utc::now(), body)?;
        let timeout = Duration::from_secs(iti39::TIMEOUT_SECS);
        let response = transport.post(&self.iti39_url, envelope, timeout).await;
        Ok(iti39::parse_chunk_response(response.as_deref(), chunk))
    }
}

/// A small random delay between the ITI-38 query and the ITI-39
/// retrieve, grounded on `chained.py`'s documented race-avoidance jitter.
async fn jitter() {
    let millis = rand::thread_rng().gen_range(50..250);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}
