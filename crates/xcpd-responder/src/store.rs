//! Local patient/document storage traits — these abstract over the
//! FHIR-table JSONB lookups `search_db`/`search_db_for_documents_metadata`/
//! `search_db_for_documents` perform in the original source.

use crate::ResponderError;
use std::future::Future;

/// Demographic parameters extracted from an inbound ITI-55 request,
/// via the static field-to-XPath table in `process_xcpd_request`.
#[derive(Debug, Clone, Default)]
pub struct Iti55Query {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub gender_code: Option<String>,
    pub birth_time: Option<String>,
    pub street_address_line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub mothers_maiden_name: Option<String>,
    pub telecom_value: Option<String>,
    pub telecom_use: Option<String>,
    pub pcp_id_root: Option<String>,
    pub pcp_id_extension: Option<String>,
}

/// A hydrated local patient record, as assembled by `search_db`'s
/// per-id `get_*_from_resource` accessors.
#[derive(Debug, Clone, Default)]
pub struct PatientRecord {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub gender_code: Option<String>,
    pub birth_time: Option<String>,
    pub street_address_line: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub pcp_extension: Option<String>,
    pub pcp_root: Option<String>,
    pub mothers_maiden_name: Option<String>,
    pub telephone: Option<String>,
    pub telecom_use: Option<String>,
}

pub trait PatientStore {
    /// Returns ids matching `query`, intersected over whichever of
    /// given/family/birth-time are present — `search_db`'s id-set
    /// intersection over its first three (required) query fields.
    fn find_candidate_ids(&self, query: &Iti55Query) -> impl Future<Output = Result<Vec<String>, ResponderError>> + Send;

    fn hydrate(&self, id: &str) -> impl Future<Output = Result<Option<PatientRecord>, ResponderError>> + Send;
}

/// One document's registry metadata, as accumulated by
/// `search_db_for_documents_metadata`'s `results` set. `doc_name` is
/// the FHIR table/category the document was found under, used
/// directly as its display name in the ITI-38 response — a quirk of
/// the original source carried through deliberately (§9).
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub hcid: String,
    pub repository_id: String,
    pub document_id: String,
    pub patient_id: String,
    pub doc_name: String,
    pub loinc_code: String,
    pub format_code: String,
    pub format_system: String,
    pub hcf_code: Option<String>,
    pub hcf_system: Option<String>,
}

pub trait DocumentStore {
    fn find_document_metadata(&self, patient_ids: &[String]) -> impl Future<Output = Result<Vec<DocumentMetadata>, ResponderError>> + Send;

    /// Looks up the raw FHIR resource for one document, by repository
    /// and document id — `search_db_for_documents`.
    fn retrieve_document(&self, repository_id: &str, document_id: &str) -> impl Future<Output = Result<Option<serde_json::Value>, ResponderError>> + Send;
}
