//! Postgres-backed `PatientStore`/`DocumentStore`, grounded on
//! `search/iti55responder.py#search_db`,
//! `search/iti38responder.py#search_db_for_documents_metadata` and
//! `search/iti39responder.py#search_db_for_documents`'s JSONB
//! containment queries against the FHIR resource tables.

use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::HashSet;
use xcpd_responder::{DocumentMetadata, DocumentStore, Iti55Query, PatientRecord, PatientStore, ResponderError};

/// FHIR resource tables searched for clinical documents. The original
/// source's equivalent list (`document_locations`) was empty in the
/// retrieved copy; kept here as a short, representative stand-in
/// (see DESIGN.md).
const DOCUMENT_TABLES: &[&str] = &["DocumentReference", "DiagnosticReport"];

pub struct PgPatientStore {
    pool: PgPool,
}

impl PgPatientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ids_matching(&self, path_expr: &str, filter: Value) -> Result<HashSet<String>, ResponderError> {
        let sql = format!("SELECT id FROM Patient WHERE {path_expr} @> $1::jsonb");
        sqlx::query_scalar::<_, String>(&sql)
            .bind(filter)
            .fetch_all(&self.pool)
            .await
            .map(|ids| ids.into_iter().collect())
            .map_err(|e| ResponderError::Store(e.to_string()))
    }
}

impl PatientStore for PgPatientStore {
    /// Intersects id-sets over whichever of given/family/birth-time are
    /// present — `search_db`'s restriction to its first three
    /// (required) query fields.
    async fn find_candidate_ids(&self, query: &Iti55Query) -> Result<Vec<String>, ResponderError> {
        let mut sets = Vec::new();

        if let Some(given) = &query.given_name {
            sets.push(self.ids_matching("resource->'name'", json!([{"given": [given]}])).await?);
        }
        if let Some(family) = &query.family_name {
            sets.push(self.ids_matching("resource->'name'", json!([{"family": family}])).await?);
        }
        if let Some(birth_time) = &query.birth_time {
            sets.push(self.ids_matching("resource->'birthDate'", json!(birth_time)).await?);
        }

        let Some((first, rest)) = sets.split_first() else {
            return Ok(Vec::new());
        };
        let intersection = rest.iter().fold(first.clone(), |acc, set| acc.intersection(set).cloned().collect());
        Ok(intersection.into_iter().collect())
    }

    async fn hydrate(&self, id: &str) -> Result<Option<PatientRecord>, ResponderError> {
        let resource: Option<Value> = sqlx::query_scalar("SELECT resource FROM Patient WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ResponderError::Store(e.to_string()))?;

        Ok(resource.map(|resource| PatientRecord {
            given_name: resource.pointer("/name/0/given/0").and_then(Value::as_str).map(str::to_owned),
            family_name: resource.pointer("/name/0/family").and_then(Value::as_str).map(str::to_owned),
            gender_code: resource.get("gender").and_then(Value::as_str).map(normalize_gender_letter),
            birth_time: resource.get("birthDate").and_then(Value::as_str).map(str::to_owned),
            street_address_line: resource.pointer("/address/0/line/0").and_then(Value::as_str).map(str::to_owned),
            city: resource.pointer("/address/0/city").and_then(Value::as_str).map(str::to_owned),
            country: resource.pointer("/address/0/country").and_then(Value::as_str).map(str::to_owned),
            postal_code: resource.pointer("/address/0/postalCode").and_then(Value::as_str).map(str::to_owned),
            pcp_extension: resource.pointer("/pcpid/0/extension").and_then(Value::as_str).map(str::to_owned),
            pcp_root: resource.pointer("/pcpid/0/root").and_then(Value::as_str).map(str::to_owned),
            mothers_maiden_name: resource.pointer("/extension/0/valueString").and_then(Value::as_str).map(str::to_owned),
            telephone: resource.pointer("/telecom/0/value").and_then(Value::as_str).map(str::to_owned),
            telecom_use: resource.pointer("/telecom/0/use").and_then(Value::as_str).map(str::to_owned),
        }))
    }
}

/// `get_gender_from_resource`'s M/F/U collapse, applied at hydration
/// time rather than display time.
fn normalize_gender_letter(raw: &str) -> String {
    match raw.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('m') => "M".to_string(),
        Some('f') => "F".to_string(),
        _ => "U".to_string(),
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
    our_hcid: String,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, our_hcid: String) -> Self {
        Self { pool, our_hcid }
    }
}

impl DocumentStore for PgDocumentStore {
    async fn find_document_metadata(&self, patient_ids: &[String]) -> Result<Vec<DocumentMetadata>, ResponderError> {
        let mut found: HashSet<(String, String, String)> = HashSet::new();
        let mut documents = Vec::new();

        for pid in patient_ids {
            for table in DOCUMENT_TABLES {
                for (path_expr, filter) in [
                    ("resource->'patient'", json!({"id": pid})),
                    ("resource->'subject'", json!({"id": pid})),
                    ("resource", json!({"patientFhirId": pid})),
                ] {
                    let sql = format!("SELECT id, resource FROM \"{table}\" WHERE {path_expr} @> $1::jsonb");
                    let rows: Vec<(String, Value)> = sqlx::query_as(&sql)
                        .bind(&filter)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(|e| ResponderError::Store(e.to_string()))?;

                    for (doc_id, resource) in rows {
                        let key = (table.to_string(), doc_id.clone(), pid.clone());
                        if !found.insert(key) {
                            continue;
                        }
                        let (format_code, format_system) = format_code_and_system(&resource);
                        documents.push(DocumentMetadata {
                            hcid: self.our_hcid.clone(),
                            repository_id: (*table).to_string(),
                            document_id: doc_id,
                            patient_id: pid.clone(),
                            doc_name: (*table).to_string(),
                            loinc_code: loinc_code(&resource),
                            format_code,
                            format_system,
                            hcf_code: None,
                            hcf_system: None,
                        });
                    }
                }
            }
        }

        Ok(documents)
    }

    async fn retrieve_document(&self, repository_id: &str, document_id: &str) -> Result<Option<Value>, ResponderError> {
        if !DOCUMENT_TABLES.contains(&repository_id) {
            return Ok(None);
        }
        let sql = format!("SELECT resource FROM \"{repository_id}\" WHERE id = $1");
        sqlx::query_scalar(&sql)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ResponderError::Store(e.to_string()))
    }
}

/// `get_loinc_from_resource`: first tries `category[*].coding[0]`, then
/// falls back to `type.coding[*]`, filtered to the LOINC system.
fn loinc_code(resource: &Value) -> String {
    let from_category = resource.get("category").and_then(Value::as_array).and_then(|categories| {
        categories.iter().find_map(|category| {
            let coding = category.pointer("/coding/0")?;
            (coding.get("system").and_then(Value::as_str) == Some("http://loinc.org")).then(|| coding.get("code").and_then(Value::as_str)).flatten()
        })
    });
    if let Some(code) = from_category {
        return code.to_string();
    }

    resource
        .pointer("/type/coding")
        .and_then(Value::as_array)
        .and_then(|codings| {
            codings
                .iter()
                .find(|coding| coding.get("system").and_then(Value::as_str) == Some("http://loinc.org"))
                .and_then(|coding| coding.get("code"))
                .and_then(Value::as_str)
        })
        .unwrap_or_default()
        .to_string()
}

/// `get_format_code_and_system_from_resource`.
fn format_code_and_system(resource: &Value) -> (String, String) {
    let code = resource.pointer("/content/0/format/code").and_then(Value::as_str).unwrap_or_default();
    let system = resource.pointer("/content/0/format/system").and_then(Value::as_str).unwrap_or_default();
    (code.to_string(), system.to_string())
}
