//! Data model shared by the message factories, pipeline state machine,
//! directory resolver and responders.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Demographic and contact fields carried through an XCPD query/response.
///
/// Every field is optional except the three used to intersect the
/// responder-side search (given name, family name, birth time) — those
/// are required on the *responder* side but may legitimately be absent
/// on a response that resolved to `NF`, so the struct itself leaves
/// them optional and the responder enforces presence when it matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientMetadata {
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub administrative_gender_code: Option<String>,
    pub birth_time: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub street_address_line: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PatientMetadata {
    /// True when at least one address field is present — governs
    /// whether a `patientAddress` parameter is emitted at all.
    pub fn has_any_address_field(&self) -> bool {
        self.street_address_line.is_some()
            || self.city.is_some()
            || self.state.is_some()
            || self.postal_code.is_some()
            || self.country.is_some()
    }

    pub fn has_any_telecom(&self) -> bool {
        self.phone_number.is_some() || self.email.is_some()
    }
}

/// The attestation values burned into the SAML assertion (§4.2).
/// Every field is required: a pipeline cannot be constructed with any
/// of them missing (fatal, not a runtime sentinel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQualifications {
    pub subject_name: String,
    pub organization: String,
    pub npi: String,
    pub org_hcid: String,
    pub purpose_of_use: PurposeOfUse,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurposeOfUse {
    pub code: String,
    pub code_system: String,
    pub code_system_name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub code: String,
    pub code_system: String,
    pub code_system_name: String,
}

impl UserQualifications {
    pub fn validate(
        subject_name: Option<String>,
        organization: Option<String>,
        npi: Option<String>,
        org_hcid: Option<String>,
        purpose_of_use: Option<PurposeOfUse>,
        role: Option<Role>,
    ) -> Result<Self, CoreError> {
        Ok(UserQualifications {
            subject_name: subject_name.ok_or(CoreError::MissingUserQualification("subject_name"))?,
            organization: organization.ok_or(CoreError::MissingUserQualification("organization"))?,
            npi: npi.ok_or(CoreError::MissingUserQualification("npi"))?,
            org_hcid: org_hcid.ok_or(CoreError::MissingUserQualification("org_hcid"))?,
            purpose_of_use: purpose_of_use.ok_or(CoreError::MissingUserQualification("purpose_of_use"))?,
            role: role.ok_or(CoreError::MissingUserQualification("role"))?,
        })
    }
}

/// A gateway's three transaction endpoints, as resolved by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResponderEndpoint {
    pub name: String,
    pub oid: String,
    pub iti55_responder: Option<String>,
    pub iti38_responder: Option<String>,
    pub iti39_responder: Option<String>,
}

impl ResponderEndpoint {
    /// §4.7/§8: valid iff all three URLs are present and http(s), and
    /// the name is not excluded.
    pub fn validate(self, exclude: &std::collections::HashSet<String>) -> Option<Self> {
        if exclude.contains(&self.name) {
            return None;
        }
        for url in [&self.iti55_responder, &self.iti38_responder, &self.iti39_responder] {
            match url {
                Some(u) if u.starts_with("http://") || u.starts_with("https://") => {}
                _ => return None,
            }
        }
        Some(self)
    }

    pub fn has_all_urls(&self) -> bool {
        self.iti55_responder.is_some() && self.iti38_responder.is_some() && self.iti39_responder.is_some()
    }
}

/// A directory record, as read from / written to the organization
/// table. Carries the extra FHIR-derived fields (`part_of`,
/// `managing_org`, `active`) needed by the inheritance passes (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryOrganization {
    pub oid: String,
    pub name: String,
    pub iti55_responder: Option<String>,
    pub iti38_responder: Option<String>,
    pub iti39_responder: Option<String>,
    pub address: Option<String>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub zipcode: Option<String>,
    pub country_code: Option<String>,
    pub part_of: Option<String>,
    pub managing_org: Option<String>,
    pub active: bool,
}

impl DirectoryOrganization {
    pub fn has_all_urls(&self) -> bool {
        self.iti55_responder.is_some() && self.iti38_responder.is_some() && self.iti39_responder.is_some()
    }

    pub fn has_geocoordinates_and_zip(&self) -> bool {
        self.longitude.is_some() && self.latitude.is_some() && self.zipcode.is_some()
    }

    /// §4.7's cleanup pass: any row still missing a URL, a coordinate
    /// or its zip after all inheritance passes is deleted.
    pub fn is_complete(&self) -> bool {
        self.has_all_urls() && self.has_geocoordinates_and_zip()
    }
}

/// A resolved document, keyed by its LOINC-derived document type, as
/// accumulated by the ITI-39 response parser (§4.5).
pub type DocsByType = HashMap<String, Vec<String>>;

/// One `(pid, doc_id)` pair resolved from an ITI-38 response, carrying
/// everything the ITI-39 request for that document needs (§4.4/§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
    pub pid: String,
    pub doc_id: String,
    pub rid: String,
    pub doc_type: String,
    /// The hcid the document actually lives under, which can differ
    /// from the queried responder's own hcid (e.g. a dispensary behind
    /// a shared gateway).
    pub replacement_hcid: String,
}

/// Terminal classification of an XCPD attempt against one responder.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Exactly one `registrationEvent` was returned.
    Matched {
        patient: PatientMetadata,
        patient_id: (String, String),
    },
    /// Zero `registrationEvent`s, a missing/unparseable envelope, or a
    /// non-`OK` `queryResponseCode`.
    NotFound,
    /// The transport call did not complete (connection error or
    /// deadline exceeded).
    Timeout,
    /// More than one `registrationEvent` was returned — ambiguous,
    /// dropped by the conflict check (§4.6).
    Multiple,
}

impl PipelineOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, PipelineOutcome::Matched { .. })
    }
}
