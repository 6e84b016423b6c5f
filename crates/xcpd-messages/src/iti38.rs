//! ITI-38 (`AdhocQueryRequest`) request construction and response
//! parsing — grounded on `search/iti38initiator.py` and
//! `chained.py#extract_ITI39_params`.

use xcpd_core::model::DocumentReference;
use xcpd_xml::builder::{Attribute, Element, Namespace};
use xcpd_xml::parser::NodeExt;

pub const QUERY_NS: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:query:3.0";
pub const RIM_NS: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0";

const STATUS_APPROVED: &str = "'urn:oasis:names:tc:ebxml-regrep:StatusType:Approved'";
const PATIENT_ID_SCHEME: &str = "urn:uuid:58a6f841-87b3-4a3e-92fd-a8ffeff98427";
const DOCUMENT_ID_SCHEME: &str = "urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab";
const LOINC_CODING_SCHEME: &str = "2.16.840.1.113883.6.1";

pub const TIMEOUT_SECS: u64 = 60;

/// Builds the `AdhocQueryRequest` body for the given `(root, extension)`
/// patient-id pairs. `return_type` defaults to `"LeafClass"` when the
/// caller has no override.
pub fn build_request_body<'a>(pids: &'a [(String, String)], receiver_hcid: &'a str, return_type: &'a str) -> Element<'a> {
    let query = Namespace::new(QUERY_NS);
    let rim = Namespace::new(RIM_NS);

    let patient_id_values = pids
        .iter()
        .map(|(root, extension)| Element::namespaced("Value", rim.clone()).set_text(format!("'{extension}^^^&{root}&ISO'")))
        .collect::<Vec<_>>();

    let status_values = pids
        .iter()
        .map(|_| Element::namespaced("Value", rim.clone()).set_text(STATUS_APPROVED))
        .collect::<Vec<_>>();

    let adhoc_query = Element::namespaced("AdhocQuery", rim.clone())
        .add_namespace_declaration(RIM_NS, Some("rim"))
        .add_attribute(Attribute::new("id", format!("urn:uuid:{}", uuid::Uuid::new_v4())))
        .add_attribute(Attribute::new("home", format!("urn:oid:{receiver_hcid}")))
        .add_child(
            Element::namespaced("Slot", rim.clone())
                .add_attribute(Attribute::new("name", "$XDSDocumentEntryPatientId"))
                .add_child(Element::namespaced("ValueList", rim.clone()).add_children(patient_id_values)),
        )
        .add_child(
            Element::namespaced("Slot", rim.clone())
                .add_attribute(Attribute::new("name", "$XDSDocumentEntryStatus"))
                .add_child(Element::namespaced("ValueList", rim.clone()).add_children(status_values)),
        );

    Element::namespaced("AdhocQueryRequest", query.clone())
        .add_namespace_declaration(QUERY_NS, Some("query"))
        .add_child(
            Element::namespaced("ResponseOption", query.clone())
                .add_attribute(Attribute::new("returnComposedObjects", "true"))
                .add_attribute(Attribute::new("returnType", return_type)),
        )
        .add_child(adhoc_query)
}

/// Extracts one [`DocumentReference`] per fully-resolved `ExtrinsicObject`
/// (requiring `pid`, `doc_id`, and `rid` all present). Returns an empty
/// `Vec` on timeout, missing envelope, or unparseable body.
pub fn parse_response(body: Option<&str>, own_hcid: &str) -> Vec<DocumentReference> {
    let Some(body) = body else {
        tracing::debug!("iti38 response: no transport response");
        return Vec::new();
    };
    let Some(envelope) = xcpd_xml::parser::extract_envelope_content(body) else {
        tracing::debug!("iti38 response: no envelope found in body");
        return Vec::new();
    };
    let Ok(document) = xcpd_xml::parser::parse(envelope) else {
        tracing::debug!("iti38 response: envelope failed to parse");
        return Vec::new();
    };

    let root = document.root_element();
    let mut out = Vec::new();

    for extrinsic_object in root.descendants_named("ExtrinsicObject") {
        let replacement_hcid = extrinsic_object
            .attr("home")
            .map(|home| home.trim_start_matches("urn:oid:").to_string())
            .unwrap_or_else(|| own_hcid.to_string());

        let mut rid = extrinsic_object
            .descendants_named("Slot")
            .into_iter()
            .find(|slot| slot.attr("name") == Some("repositoryUniqueId"))
            .and_then(|slot| slot.descendants_named("Value").into_iter().next())
            .and_then(|value| value.own_text())
            .map(str::to_owned);

        let Some(doc_type) = extrinsic_object.descendants_named("Classification").into_iter().find_map(|classification| {
            let matches_loinc = classification
                .descendants_named("Value")
                .into_iter()
                .next()
                .and_then(|value| value.own_text())
                == Some(LOINC_CODING_SCHEME);
            if matches_loinc {
                classification.attr("nodeRepresentation").map(str::to_owned)
            } else {
                None
            }
        }) else {
            continue;
        };

        let mut pid = None;
        let mut doc_id = None;
        for identifier in extrinsic_object.descendants_named("ExternalIdentifier") {
            let Some(scheme) = identifier.attr("identificationScheme") else {
                continue;
            };
            let Some(value) = identifier.attr("value") else {
                continue;
            };
            if scheme == PATIENT_ID_SCHEME {
                pid = value.split("^^^").next().map(str::to_owned);
                if rid.is_none() {
                    rid = value.split("^^^&").nth(1).and_then(|rest| rest.split('&').next()).map(str::to_owned);
                }
            } else if scheme == DOCUMENT_ID_SCHEME {
                doc_id = Some(value.to_string());
            }
        }

        if let (Some(pid), Some(doc_id), Some(rid)) = (pid, doc_id, rid) {
            out.push(DocumentReference {
                pid,
                doc_id,
                rid,
                doc_type,
                replacement_hcid,
            });
        } else {
            tracing::debug!("iti38 response: ExtrinsicObject missing pid/doc_id/rid, dropping");
        }
    }

    tracing::debug!(resolved = out.len(), "iti38 response parsed");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_slot_cardinality_matches_patient_id_slot() {
        let pids = vec![("1.2".to_string(), "a".to_string()), ("1.3".to_string(), "b".to_string())];
        let body = build_request_body(&pids, "9.9.9", "LeafClass");
        let xml = xcpd_xml::builder::Builder::new(None, body).to_xml_string().unwrap();
        assert_eq!(xml.matches("StatusType:Approved").count(), 2);
        assert_eq!(xml.matches("^^^&").count(), 2);
    }

    #[test]
    fn timeout_returns_empty() {
        assert!(parse_response(None, "1.2.3").is_empty());
    }

    #[test]
    fn resolves_document_reference_from_external_identifiers() {
        let body = r#"<s:Envelope xmlns:s="x"><s:Body>
            <response><ExtrinsicObject home="urn:oid:5.5.5">
                <Slot name="repositoryUniqueId"><ValueList><Value>1.1.1.1</Value></ValueList></Slot>
                <Classification nodeRepresentation="34133-9">
                    <Slot><ValueList><Value>2.16.840.1.113883.6.1</Value></ValueList></Slot>
                </Classification>
                <ExternalIdentifier identificationScheme="urn:uuid:58a6f841-87b3-4a3e-92fd-a8ffeff98427" value="PID1^^^&amp;1.1.1.1&amp;ISO"/>
                <ExternalIdentifier identificationScheme="urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab" value="doc-123"/>
            </ExtrinsicObject></response>
        </s:Body></s:Envelope>"#;

        let refs = parse_response(Some(body), "own-hcid");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].doc_id, "doc-123");
        assert_eq!(refs[0].pid, "PID1");
        assert_eq!(refs[0].rid, "1.1.1.1");
        assert_eq!(refs[0].doc_type, "34133-9");
        assert_eq!(refs[0].replacement_hcid, "5.5.5");
    }
}
