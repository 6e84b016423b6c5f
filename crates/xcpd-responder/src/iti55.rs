//! ITI-55 responder: request extraction and `PRPA_IN201306UV02`
//! response construction — grounded on `search/iti55responder.py`.

use crate::store::{Iti55Query, PatientRecord};
use crate::{check_addressee, PatientStore, ResponderError};
use chrono::Utc;
use xcpd_messages::{envelope, Action};
use xcpd_xml::builder::{Attribute, Element, Namespace};
use xcpd_xml::parser::{Document, Node, NodeExt};

pub const HL7_NS: &str = "urn:hl7-org:v3";
const QUERY_MATCH_OBSERVATION: &str = "IHE_PDQ";

/// Extracts demographic query parameters from the request body via a
/// static field→XPath table, mirroring `process_xcpd_request`'s
/// `params` dict rather than a dynamic lookup.
pub fn extract_query(request: Node<'_, '_>) -> Iti55Query {
    let text_of = |name: &str| request.descendants_named(name).into_iter().next().and_then(|n| n.own_text()).map(str::to_owned);

    let living_subject_name = request.descendants_named("livingSubjectName").into_iter().next();
    let given_name = living_subject_name
        .and_then(|n| n.descendants_named("given").into_iter().next())
        .and_then(|n| n.own_text())
        .map(str::to_owned);
    let family_name = living_subject_name
        .and_then(|n| n.descendants_named("family").into_iter().next())
        .and_then(|n| n.own_text())
        .map(str::to_owned);

    let gender_code = request
        .descendants_named("livingSubjectAdministrativeGender")
        .into_iter()
        .next()
        .and_then(|n| n.descendants_named("value").into_iter().next())
        .and_then(|n| n.attr("code"))
        .map(normalize_gender);

    let birth_time = request
        .descendants_named("livingSubjectBirthTime")
        .into_iter()
        .next()
        .and_then(|n| n.descendants_named("value").into_iter().next())
        .and_then(|n| n.attr("value"))
        .map(normalize_birth_time);

    let address = request.descendants_named("patientAddress").into_iter().next();
    let addr_field = |name: &str| address.and_then(|a| a.descendants_named(name).into_iter().next()).and_then(|n| n.own_text()).map(str::to_owned);

    let telecom = request.descendants_named("patientTelecom").into_iter().next();
    let telecom_value = telecom.and_then(|n| n.descendants_named("value").into_iter().next()).and_then(|n| n.attr("value")).map(str::to_owned);
    let telecom_use = telecom.and_then(|n| n.descendants_named("value").into_iter().next()).and_then(|n| n.attr("use")).map(str::to_owned);

    let pcp = request.descendants_named("principalCareProviderId").into_iter().next();
    let pcp_root = pcp.and_then(|n| n.descendants_named("value").into_iter().next()).and_then(|n| n.attr("root")).map(str::to_owned);
    let pcp_extension = pcp.and_then(|n| n.descendants_named("value").into_iter().next()).and_then(|n| n.attr("extension")).map(str::to_owned);

    Iti55Query {
        given_name,
        family_name,
        gender_code,
        birth_time,
        street_address_line: addr_field("streetAddressLine"),
        city: addr_field("city"),
        state: addr_field("state"),
        country: addr_field("country"),
        postal_code: addr_field("postalCode"),
        mothers_maiden_name: text_of("mothersMaidenName").or_else(|| {
            request
                .descendants_named("mothersMaidenName")
                .into_iter()
                .next()
                .and_then(|n| n.descendants_named("family").into_iter().next())
                .and_then(|n| n.own_text())
                .map(str::to_owned)
        }),
        telecom_value,
        telecom_use,
        pcp_id_root: pcp_root,
        pcp_id_extension: pcp_extension,
    }
}

fn normalize_gender(code: &str) -> String {
    match code {
        "M" | "Male" => "male".to_string(),
        "F" | "Female" => "female".to_string(),
        other => other.to_string(),
    }
}

fn normalize_birth_time(raw: &str) -> String {
    if raw.len() < 8 {
        return "0000-00-00".to_string();
    }
    if raw.contains('/') {
        return raw.replace('/', "-");
    }
    if raw.len() == 8 && raw.chars().all(|c| c.is_ascii_digit()) {
        return format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8]);
    }
    raw.to_string()
}

/// Handles one inbound ITI-55 request end to end: addressee check,
/// extraction, store lookup, response construction.
pub async fn handle_request(
    document: &Document<'_>,
    store: &impl PatientStore,
    known_urls: &[String],
    our_hcid: &str,
    our_url: &str,
) -> Result<String, ResponderError> {
    check_addressee(document, known_urls)?;

    let root = document.root_element();
    let receiver_hcid = root
        .descendants_named("sender")
        .into_iter()
        .next()
        .and_then(|n| n.descendants_named("id").into_iter().next())
        .and_then(|n| n.attr("root"))
        .unwrap_or_default();
    let relates_to = envelope::relates_to_from_request(document).unwrap_or_default();

    let query = extract_query(root);
    let ids = store.find_candidate_ids(&query).await?;

    if ids.len() != 1 {
        return build_not_found_response(our_hcid, receiver_hcid, &relates_to);
    }
    let Some(record) = store.hydrate(&ids[0]).await? else {
        return build_not_found_response(our_hcid, receiver_hcid, &relates_to);
    };
    build_matched_response(our_hcid, receiver_hcid, our_url, &ids[0], &record, &relates_to)
}

fn build_matched_response(
    our_hcid: &str,
    their_hcid: &str,
    our_url: &str,
    pid: &str,
    record: &PatientRecord,
    relates_to: &str,
) -> Result<String, ResponderError> {
    let hl7 = Namespace::new(HL7_NS);
    let creation_time = Utc::now().format("%Y%m%d%H%M%S").to_string();

    let given = record.given_name.as_deref().unwrap_or("None");
    let family = record.family_name.as_deref().unwrap_or("None");
    let gender_code = record.gender_code.as_deref().unwrap_or("None");
    let birth_time = record.birth_time.as_deref().unwrap_or("None");
    let telephone = record.telephone.as_deref().unwrap_or("None");
    let telecom_use = record.telecom_use.as_deref().unwrap_or("None");
    let street = record.street_address_line.as_deref().unwrap_or("None");
    let city = record.city.as_deref().unwrap_or("None");
    let country = record.country.as_deref().unwrap_or("None");
    let postal_code = record.postal_code.as_deref().unwrap_or("None");
    let pcp_ext = record.pcp_extension.as_deref().unwrap_or("None");
    let pcp_root = record.pcp_root.as_deref().unwrap_or("None");
    let mm_name = record.mothers_maiden_name.as_deref().unwrap_or("None");

    let patient_person = Element::namespaced("patientPerson", hl7.clone())
        .add_attribute(Attribute::new("classCode", "PSN"))
        .add_attribute(Attribute::new("determinerCode", "INSTANCE"))
        .add_child(
            Element::namespaced("name", hl7.clone())
                .add_child(Element::namespaced("given", hl7.clone()).set_text(given.to_string()))
                .add_child(Element::namespaced("family", hl7.clone()).set_text(family.to_string())),
        )
        .add_child(
            Element::namespaced("administrativeGenderCode", hl7.clone())
                .add_attribute(Attribute::new("code", gender_code))
                .add_attribute(Attribute::new("codeSystem", "2.16.840.1.113883.12.1")),
        )
        .add_child(Element::namespaced("birthTime", hl7.clone()).add_attribute(Attribute::new("value", birth_time)))
        .add_child(
            Element::namespaced("telecom", hl7.clone())
                .add_attribute(Attribute::new("value", format!("tel:{telephone}")))
                .add_attribute(Attribute::new("use", telecom_use)),
        )
        .add_child(
            Element::namespaced("addr", hl7.clone())
                .add_child(Element::namespaced("streetAddressLine", hl7.clone()).set_text(street.to_string()))
                .add_child(Element::namespaced("city", hl7.clone()).set_text(city.to_string()))
                .add_child(Element::namespaced("country", hl7.clone()).set_text(country.to_string()))
                .add_child(Element::namespaced("postalCode", hl7.clone()).set_text(postal_code.to_string())),
        )
        .add_child(
            Element::namespaced("principalCareProviderId", hl7.clone())
                .add_child(
                    Element::namespaced("value", hl7.clone())
                        .add_attribute(Attribute::new("extension", pcp_ext))
                        .add_attribute(Attribute::new("root", pcp_root)),
                )
                .add_child(Element::namespaced("semanticsText", hl7.clone()).set_text("AssignedProvider.id")),
        )
        .add_child(
            Element::namespaced("mothersMaidenName", hl7.clone())
                .add_child(Element::namespaced("value", hl7.clone()).add_child(Element::namespaced("family", hl7.clone()).set_text(mm_name.to_string())))
                .add_child(Element::namespaced("semanticsText", hl7.clone()).set_text("Person.MothersMaidenName")),
        );

    let patient = Element::namespaced("patient", hl7.clone())
        .add_attribute(Attribute::new("classCode", "PAT"))
        .add_child(
            Element::namespaced("id", hl7.clone())
                .add_attribute(Attribute::new("extension", pid))
                .add_attribute(Attribute::new("root", our_hcid)),
        )
        .add_child(Element::namespaced("statusCode", hl7.clone()).add_attribute(Attribute::new("code", "active")))
        .add_child(patient_person)
        .add_child(
            Element::namespaced("providerOrganization", hl7.clone())
                .add_attribute(Attribute::new("classCode", "ORG"))
                .add_attribute(Attribute::new("determinerCode", "INSTANCE"))
                .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", our_hcid)))
                .add_child(
                    Element::namespaced("contactParty", hl7.clone())
                        .add_attribute(Attribute::new("classCode", "CON"))
                        .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", our_hcid)))
                        .add_child(Element::namespaced("telecom", hl7.clone()).add_attribute(Attribute::new("value", our_url))),
                ),
        )
        .add_child(
            Element::namespaced("subjectOf1", hl7.clone()).add_child(
                Element::namespaced("queryMatchObservation", hl7.clone())
                    .add_attribute(Attribute::new("classCode", "COND"))
                    .add_attribute(Attribute::new("moodCode", "EVN"))
                    .add_child(Element::namespaced("code", hl7.clone()).add_attribute(Attribute::new("code", QUERY_MATCH_OBSERVATION)))
                    .add_child(Element::namespaced("value", hl7.clone()).add_attribute(Attribute::new("value", "100"))),
            ),
        );

    let registration_event = Element::namespaced("registrationEvent", hl7.clone())
        .add_attribute(Attribute::new("classCode", "REG"))
        .add_attribute(Attribute::new("moodCode", "EVN"))
        .add_child(Element::namespaced("statusCode", hl7.clone()).add_attribute(Attribute::new("code", "active")))
        .add_child(Element::namespaced("subject1", hl7.clone()).add_attribute(Attribute::new("typeCode", "SBJ")).add_child(patient))
        .add_child(
            Element::namespaced("custodian", hl7.clone()).add_attribute(Attribute::new("typeCode", "CST")).add_child(
                Element::namespaced("assignedEntity", hl7.clone())
                    .add_attribute(Attribute::new("classCode", "ASSIGNED"))
                    .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", our_hcid)))
                    .add_child(
                        Element::namespaced("code", hl7.clone())
                            .add_attribute(Attribute::new("code", "NotHealthDataLocator"))
                            .add_attribute(Attribute::new("codeSystem", "1.3.6.1.4.1.19376.1.2.27.2")),
                    ),
            ),
        );

    let control_act_process = Element::namespaced("controlActProcess", hl7.clone())
        .add_attribute(Attribute::new("classCode", "CACT"))
        .add_attribute(Attribute::new("moodCode", "EVN"))
        .add_child(
            Element::namespaced("code", hl7.clone())
                .add_attribute(Attribute::new("code", "PRPA_TE201306UV02"))
                .add_attribute(Attribute::new("displayName", "2.16.840.1.113883.1.18")),
        )
        .add_child(
            Element::namespaced("subject", hl7.clone())
                .add_attribute(Attribute::new("contextConductionInd", "false"))
                .add_attribute(Attribute::new("typeCode", "SUBJ"))
                .add_child(registration_event),
        )
        .add_child(
            Element::namespaced("queryAck", hl7.clone())
                .add_child(Element::namespaced("statusCode", hl7.clone()).add_attribute(Attribute::new("code", "deliveredResponse")))
                .add_child(Element::namespaced("queryResponseCode", hl7.clone()).add_attribute(Attribute::new("code", "OK"))),
        );

    let body = response_envelope(&hl7, our_hcid, their_hcid, &creation_time, control_act_process);
    envelope::build_response(Action::Iti55Response, relates_to, body).map_err(ResponderError::from)
}

fn build_not_found_response(our_hcid: &str, their_hcid: &str, relates_to: &str) -> Result<String, ResponderError> {
    let hl7 = Namespace::new(HL7_NS);
    let creation_time = Utc::now().format("%Y%m%d%H%M%S").to_string();

    let control_act_process = Element::namespaced("controlActProcess", hl7.clone())
        .add_attribute(Attribute::new("classCode", "CACT"))
        .add_attribute(Attribute::new("moodCode", "EVN"))
        .add_child(
            Element::namespaced("code", hl7.clone())
                .add_attribute(Attribute::new("code", "PRPA_TE201306UV02"))
                .add_attribute(Attribute::new("displayName", "2.16.840.1.113883.1.18")),
        )
        .add_child(
            Element::namespaced("queryAck", hl7.clone())
                .add_child(Element::namespaced("statusCode", hl7.clone()).add_attribute(Attribute::new("code", "deliveredResponse")))
                .add_child(Element::namespaced("queryResponseCode", hl7.clone()).add_attribute(Attribute::new("code", "NF"))),
        );

    let body = response_envelope(&hl7, our_hcid, their_hcid, &creation_time, control_act_process);
    envelope::build_response(Action::Iti55Response, relates_to, body).map_err(ResponderError::from)
}

fn response_envelope<'a>(hl7: &Namespace<'a>, our_hcid: &'a str, their_hcid: &'a str, creation_time: &'a str, control_act_process: Element<'a>) -> Element<'a> {
    Element::namespaced("PRPA_IN201306UV02", hl7.clone())
        .add_namespace_declaration(HL7_NS, None)
        .add_attribute(Attribute::new("ITSVersion", "XML_1.0"))
        .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("extension", "0000")).add_attribute(Attribute::new("root", our_hcid)))
        .add_child(Element::namespaced("creationTime", hl7.clone()).add_attribute(Attribute::new("value", creation_time)))
        .add_child(
            Element::namespaced("interactionId", hl7.clone())
                .add_attribute(Attribute::new("extension", "PRPA_IN201306UV02"))
                .add_attribute(Attribute::new("root", our_hcid)),
        )
        .add_child(Element::namespaced("processingCode", hl7.clone()).add_attribute(Attribute::new("code", "T")))
        .add_child(Element::namespaced("processingModeCode", hl7.clone()).add_attribute(Attribute::new("code", "T")))
        .add_child(Element::namespaced("acceptAckCode", hl7.clone()).add_attribute(Attribute::new("code", "NE")))
        .add_child(
            Element::namespaced("receiver", hl7.clone()).add_attribute(Attribute::new("typeCode", "RCV")).add_child(
                Element::namespaced("device", hl7.clone())
                    .add_attribute(Attribute::new("classCode", "DEV"))
                    .add_attribute(Attribute::new("determinerCode", "INSTANCE"))
                    .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", their_hcid))),
            ),
        )
        .add_child(
            Element::namespaced("sender", hl7.clone()).add_attribute(Attribute::new("typeCode", "SND")).add_child(
                Element::namespaced("device", hl7.clone())
                    .add_attribute(Attribute::new("classCode", "DEV"))
                    .add_attribute(Attribute::new("determinerCode", "INSTANCE"))
                    .add_child(Element::namespaced("id", hl7.clone()).add_attribute(Attribute::new("root", our_hcid))),
            ),
        )
        .add_child(control_act_process)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_eight_digit_birth_time() {
        assert_eq!(normalize_birth_time("19800101"), "1980-01-01");
    }

    #[test]
    fn normalizes_short_birth_time_to_zeroes() {
        assert_eq!(normalize_birth_time("1980"), "0000-00-00");
    }

    #[test]
    fn normalizes_gender_codes() {
        assert_eq!(normalize_gender("M"), "male");
        assert_eq!(normalize_gender("Female"), "female");
    }
}
