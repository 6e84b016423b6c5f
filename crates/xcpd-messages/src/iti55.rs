//! ITI-55 (`PRPA_IN201305UV02`/`PRPA_IN201306UV02`) request construction
//! and response parsing — grounded on `search/iti55initiator.py` and
//! `chained.py#extract_patient_metadata_and_pid`.

use xcpd_core::model::{PatientMetadata, PipelineOutcome};
use xcpd_xml::builder::{Attribute, Element, Namespace};
use xcpd_xml::parser::NodeExt;

pub const HL7_NS: &str = "urn:hl7-org:v3";
const INTERACTION_ID_ROOT: &str = "2.16.840.1.113883.1.6";
const QUERY_ID_ROOT: &str = "61023518-3f6e-4ad5-a465-87082e96b66f";
const CONTROL_ACT_CODE: &str = "PRPA_TE201305UV02";

/// 45s for national queries, 60s for regional — grounded on
/// `ITI55Initiator.__init__`'s `self.timeout`.
pub fn timeout_secs(national: bool) -> u64 {
    if national {
        45
    } else {
        60
    }
}

/// Builds the `PRPA_IN201305UV02` body. `own_org_hcid` is the caller's
/// own organization hcid — used for both `sender/device/id` and
/// `sender/.../representedOrganization/id` (the original source leaves
/// `sender/device/id` permanently blank; that's treated as an
/// unintentional placeholder here rather than replicated, see
/// DESIGN.md).
pub fn build_request_body<'a>(
    metadata: &'a PatientMetadata,
    own_org_hcid: &'a str,
    receiver_hcid: &'a str,
    national: bool,
    creation_time: &'a str,
) -> Element<'a> {
    let hl7 = Namespace::new(HL7_NS);

    let receiver = participant("receiver", "RCV", receiver_hcid, receiver_hcid, &hl7);
    let sender = participant("sender", "SND", own_org_hcid, own_org_hcid, &hl7);

    let query_by_parameter = query_by_parameter(metadata, national, &hl7);

    let control_act_process = Element::namespaced("controlActProcess", hl7.clone())
        .add_attribute(Attribute::new("classCode", "CACT"))
        .add_attribute(Attribute::new("moodCode", "EVN"))
        .add_child(
            Element::namespaced("code", hl7.clone())
                .add_attribute(Attribute::new("code", CONTROL_ACT_CODE))
                .add_attribute(Attribute::new("codeSystemName", INTERACTION_ID_ROOT)),
        )
        .add_child(
            Element::namespaced("authorOrPerformer", hl7.clone())
                .add_attribute(Attribute::new("typeCode", "AUT"))
                .add_child(
                    Element::namespaced("assignedPerson", hl7.clone())
                        .add_attribute(Attribute::new("classCode", "ASSIGNED")),
                ),
        )
        .add_child(query_by_parameter);

    Element::namespaced("PRPA_IN201305UV02", hl7.clone())
        .add_namespace_declaration(HL7_NS, None)
        .add_attribute(Attribute::new("ITSVersion", "XML_1.0"))
        .add_child(
            Element::namespaced("id", hl7.clone())
                .add_attribute(Attribute::new("extension", "2211"))
                .add_attribute(Attribute::new("root", uuid::Uuid::new_v4().to_string())),
        )
        .add_child(Element::namespaced("creationTime", hl7.clone()).add_attribute(Attribute::new("value", creation_time)))
        .add_child(
            Element::namespaced("interactionId", hl7.clone())
                .add_attribute(Attribute::new("extension", "PRPA_IN201305UV02"))
                .add_attribute(Attribute::new("root", INTERACTION_ID_ROOT)),
        )
        .add_child(Element::namespaced("processingCode", hl7.clone()).add_attribute(Attribute::new("code", "P")))
        .add_child(Element::namespaced("processingModeCode", hl7.clone()).add_attribute(Attribute::new("code", "T")))
        .add_child(Element::namespaced("acceptAckCode", hl7.clone()).add_attribute(Attribute::new("code", "AL")))
        .add_child(receiver)
        .add_child(sender)
        .add_child(control_act_process)
}

fn participant<'a>(tag: &'a str, type_code: &'a str, device_root: &'a str, org_root: &'a str, hl7: &Namespace<'a>) -> Element<'a> {
    let represented_organization = Element::namespaced("representedOrganization", hl7.clone())
        .add_attribute(Attribute::new("classCode", "ORG"))
        .add_attribute(Attribute::new("determinerCode", "INSTANCE"))
        .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", org_root)));

    let as_agent = Element::namespaced("asAgent", hl7.clone())
        .add_attribute(Attribute::new("classCode", "AGNT"))
        .add_child(represented_organization);

    let device = Element::namespaced("device", hl7.clone())
        .add_attribute(Attribute::new("classCode", "DEV"))
        .add_attribute(Attribute::new("determinerCode", "INSTANCE"))
        .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", device_root)))
        .add_child(as_agent);

    Element::namespaced(tag, hl7.clone())
        .add_attribute(Attribute::new("typeCode", type_code))
        .add_child(device)
}

fn query_by_parameter<'a>(metadata: &'a PatientMetadata, national: bool, hl7: &Namespace<'a>) -> Element<'a> {
    let gender = metadata.administrative_gender_code.as_deref().unwrap_or_default();
    let birth_time = metadata.birth_time.as_deref().unwrap_or_default();
    let family = metadata.family_name.as_deref().unwrap_or_default();
    let given = metadata.given_name.as_deref().unwrap_or_default();

    let mut parameter_list = Element::namespaced("parameterList", hl7.clone())
        .add_child(
            Element::namespaced("livingSubjectAdministrativeGender", hl7.clone())
                .add_child(Element::namespaced("value", hl7.clone()).add_attribute(Attribute::new("code", gender)))
                .add_child(
                    Element::namespaced("semanticsText", hl7.clone()).set_text("LivingSubject.AdministrativeGender"),
                ),
        )
        .add_child(
            Element::namespaced("livingSubjectBirthTime", hl7.clone())
                .add_child(Element::namespaced("value", hl7.clone()).add_attribute(Attribute::new("value", birth_time)))
                .add_child(Element::namespaced("semanticsText", hl7.clone()).set_text("LivingSubject.birthTime")),
        )
        .add_child(
            Element::namespaced("livingSubjectName", hl7.clone())
                .add_child(
                    Element::namespaced("value", hl7.clone())
                        .add_child(Element::namespaced("family", hl7.clone()).set_text(family))
                        .add_child(Element::namespaced("given", hl7.clone()).set_text(given)),
                )
                .add_child(Element::namespaced("semanticsText", hl7.clone()).set_text("LivingSubject.name")),
        );

    if !national && metadata.has_any_address_field() {
        let mut value = Element::namespaced("value", hl7.clone());
        if let Some(street) = &metadata.street_address_line {
            value = value.add_child(Element::namespaced("streetAddressLine", hl7.clone()).set_text(street.clone()));
        }
        if let Some(city) = &metadata.city {
            value = value.add_child(Element::namespaced("city", hl7.clone()).set_text(city.clone()));
        }
        if let Some(state) = &metadata.state {
            value = value.add_child(Element::namespaced("state", hl7.clone()).set_text(state.clone()));
        }
        if let Some(postal_code) = &metadata.postal_code {
            value = value.add_child(Element::namespaced("postalCode", hl7.clone()).set_text(postal_code.clone()));
        }
        if let Some(country) = &metadata.country {
            value = value.add_child(Element::namespaced("country", hl7.clone()).set_text(country.clone()));
        }
        parameter_list = parameter_list.add_child(
            Element::namespaced("patientAddress", hl7.clone())
                .add_child(value)
                .add_child(Element::namespaced("semanticsText", hl7.clone()).set_text("Patient.addr")),
        );
    }

    if metadata.has_any_telecom() {
        let mut telecom = Element::namespaced("patientTelecom", hl7.clone());
        if let Some(phone) = &metadata.phone_number {
            telecom = telecom.add_child(
                Element::namespaced("value", hl7.clone())
                    .add_attribute(Attribute::new("value", format!("tel:+1-{}", format_phone(phone))))
                    .add_attribute(Attribute::new("use", "HP")),
            );
        }
        if let Some(email) = &metadata.email {
            telecom = telecom.add_child(
                Element::namespaced("value", hl7.clone())
                    .add_attribute(Attribute::new("value", format!("mailto:{email}")))
                    .add_attribute(Attribute::new("use", "H")),
            );
        }
        parameter_list =
            parameter_list.add_child(telecom.add_child(Element::namespaced("semanticsText", hl7.clone()).set_text("Patient.telecom")));
    }

    Element::namespaced("queryByParameter", hl7.clone())
        .add_child(Element::namespaced("queryId", hl7.clone()).add_attribute(Attribute::new("root", QUERY_ID_ROOT)))
        .add_child(Element::namespaced("statusCode", hl7.clone()).add_attribute(Attribute::new("code", "new")))
        .add_child(Element::namespaced("responseModalityCode", hl7.clone()).add_attribute(Attribute::new("code", "R")))
        .add_child(Element::namespaced("responsePriorityCode", hl7.clone()).add_attribute(Attribute::new("code", "I")))
        .add_child(Element::namespaced("matchCriterionList", hl7.clone()))
        .add_child(parameter_list)
}

fn format_phone(raw: &str) -> String {
    if raw.len() == 10 {
        format!("{}-{}-{}", &raw[0..3], &raw[3..6], &raw[6..10])
    } else {
        raw.to_string()
    }
}

/// Parses an ITI-55 response body into a [`PipelineOutcome`] — see the
/// condition table grounded on `chained.py#extract_patient_metadata_and_pid`.
pub fn parse_response(body: Option<&str>) -> PipelineOutcome {
    let Some(body) = body else {
        tracing::debug!("iti55 response: no transport response, treating as timeout");
        return PipelineOutcome::Timeout;
    };
    let Some(envelope) = xcpd_xml::parser::extract_envelope_content(body) else {
        tracing::debug!("iti55 response: no envelope found in body");
        return PipelineOutcome::NotFound;
    };
    let Ok(document) = xcpd_xml::parser::parse(envelope) else {
        tracing::debug!("iti55 response: envelope failed to parse");
        return PipelineOutcome::NotFound;
    };
    let root = document.root_element();

    let Some(qrc) = root.descendants_named("queryResponseCode").into_iter().next() else {
        return PipelineOutcome::NotFound;
    };
    if qrc.attr("code") != Some("OK") {
        return PipelineOutcome::NotFound;
    }

    let events = root.descendants_named("registrationEvent");
    match events.len() {
        0 => PipelineOutcome::NotFound,
        1 => {
            let Some(patient) = events[0].descendants_named("patient").into_iter().next() else {
                return PipelineOutcome::NotFound;
            };
            let Some(id_node) = patient.descendants_named("id").into_iter().next() else {
                return PipelineOutcome::NotFound;
            };
            let (Some(root_oid), Some(extension)) = (id_node.attr("root"), id_node.attr("extension")) else {
                return PipelineOutcome::NotFound;
            };

            PipelineOutcome::Matched {
                patient: extract_patient_metadata(patient),
                patient_id: (root_oid.to_string(), extension.to_string()),
            }
        }
        count => {
            tracing::debug!(count, "iti55 response: multiple registrationEvents, ambiguous match");
            PipelineOutcome::Multiple
        }
    }
}

fn extract_patient_metadata(patient: xcpd_xml::parser::Node<'_, '_>) -> PatientMetadata {
    let text_of = |name: &str| patient.descendants_named(name).into_iter().next().and_then(|n| n.own_text()).map(str::to_owned);

    let administrative_gender_code = patient
        .descendants_named("administrativeGenderCode")
        .into_iter()
        .next()
        .and_then(|n| n.attr("code"))
        .map(str::to_owned);
    let birth_time = patient
        .descendants_named("birthTime")
        .into_iter()
        .next()
        .and_then(|n| n.attr("value"))
        .map(str::to_owned);
    let phone_number = patient
        .descendants_named("telecom")
        .into_iter()
        .next()
        .and_then(|n| n.attr("value"))
        .map(str::to_owned);

    let addr = patient.descendants_named("addr").into_iter().next();
    let addr_field = |name: &str| addr.and_then(|a| a.descendants_named(name).into_iter().next()).and_then(|n| n.own_text()).map(str::to_owned);

    PatientMetadata {
        given_name: text_of("given"),
        family_name: text_of("family"),
        administrative_gender_code,
        birth_time,
        phone_number,
        email: None,
        street_address_line: addr_field("streetAddressLine"),
        city: addr_field("city"),
        state: addr_field("state"),
        postal_code: addr_field("postalCode"),
        country: addr_field("country"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> PatientMetadata {
        PatientMetadata {
            given_name: Some("Jane".into()),
            family_name: Some("Doe".into()),
            administrative_gender_code: Some("F".into()),
            birth_time: Some("19800101".into()),
            phone_number: Some("5551234567".into()),
            email: None,
            street_address_line: Some("1 Main St".into()),
            city: Some("Springfield".into()),
            state: None,
            postal_code: None,
            country: None,
        }
    }

    #[test]
    fn regional_request_includes_address() {
        let metadata = sample_metadata();
        let body = build_request_body(&metadata, "1.2.3", "4.5.6", false, "20260101120000");
        let xml = xcpd_xml::builder::Builder::new(None, body).to_xml_string().unwrap();
        assert!(xml.contains("patientAddress"));
        assert!(xml.contains("tel:+1-555-123-4567"));
    }

    #[test]
    fn national_request_omits_address() {
        let metadata = sample_metadata();
        let body = build_request_body(&metadata, "1.2.3", "4.5.6", true, "20260101120000");
        let xml = xcpd_xml::builder::Builder::new(None, body).to_xml_string().unwrap();
        assert!(!xml.contains("patientAddress"));
    }

    #[test]
    fn timeout_returns_timeout_outcome() {
        assert!(matches!(parse_response(None), PipelineOutcome::Timeout));
    }

    #[test]
    fn missing_envelope_returns_not_found() {
        assert!(matches!(parse_response(Some("nothing here")), PipelineOutcome::NotFound));
    }

    #[test]
    fn single_registration_event_matches() {
        let body = r#"<s:Envelope xmlns:s="x"><s:Body><response><queryResponseCode code="OK"/>
            <registrationEvent><subject1><patient>
                <id root="1.2.3" extension="999"/>
                <patientPerson><name><given>Jane</given><family>Doe</family></name>
                <administrativeGenderCode code="F"/><birthTime value="19800101"/></patientPerson>
            </patient></subject1></registrationEvent>
        </response></s:Body></s:Envelope>"#;
        match parse_response(Some(body)) {
            PipelineOutcome::Matched { patient, patient_id } => {
                assert_eq!(patient.given_name.as_deref(), Some("Jane"));
                assert_eq!(patient_id, ("1.2.3".to_string(), "999".to_string()));
            }
            other => panic!("expected Matched, got {other:?}"),
        }
    }
}
