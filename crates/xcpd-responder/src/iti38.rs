//! ITI-38 responder: patient-id extraction and `AdhocQueryResponse`
//! construction — grounded on `search/iti38responder.py`.

use crate::store::DocumentMetadata;
use crate::{check_addressee, DocumentStore, ResponderError};
use xcpd_messages::{
    envelope,
    iti38::{QUERY_NS, RIM_NS},
    Action,
};
use xcpd_xml::builder::{Attribute, Element, Namespace};
use xcpd_xml::parser::{Document, Node, NodeExt};

const CLASS_CODE_SCHEME: &str = "urn:uuid:41a5887f-8865-4c09-adf7-e362475b143a";
const FORMAT_CODE_SCHEME: &str = "urn:uuid:a09d5840-386c-46f2-b5ad-9c3699a4309d";
const CONFIDENTIALITY_CODE_SCHEME: &str = "urn:uuid:f4f85eac-e6cb-4883-b524-f2705394840f";
const HCF_CODE_SCHEME: &str = "urn:uuid:93606bcf-9494-43ec-9b4e-a7748d1a838d";
const LOINC_CODING_SCHEME: &str = "2.16.840.1.113883.6.1";
const PATIENT_ID_SCHEME: &str = "urn:uuid:58a6f841-87b3-4a3e-92fd-a8ffeff98427";
const DOCUMENT_ID_SCHEME: &str = "urn:uuid:2e82c1f6-a085-4c72-9da3-8640a32e42ab";

/// Extracts bare patient ids from
/// `Slot[@name="$XDSDocumentEntryPatientId"]/ValueList/Value`, whose
/// text is the quoted literal `'<pid>^^^&<root>&ISO'` the initiator
/// emits (`crates/xcpd-messages/src/iti38.rs`) — strip the surrounding
/// quote before splitting on `^^^`, mirroring `eval(element.text)`'s
/// unquoting in `process_xca_find_documents_request`.
pub fn extract_patient_ids(request: Node<'_, '_>) -> Vec<String> {
    request
        .descendants_named("Slot")
        .into_iter()
        .filter(|slot| slot.attr("name") == Some("$XDSDocumentEntryPatientId"))
        .flat_map(|slot| slot.descendants_named("Value"))
        .filter_map(|value| value.own_text())
        .map(|text| text.trim_matches('\''))
        .filter_map(|text| text.split("^^^").next())
        .map(str::to_owned)
        .collect()
}

pub fn extract_return_type(request: Node<'_, '_>) -> String {
    request
        .descendants_named("ResponseOption")
        .into_iter()
        .next()
        .and_then(|n| n.attr("returnType"))
        .unwrap_or("LeafClass")
        .to_string()
}

pub async fn handle_request(document: &Document<'_>, store: &impl DocumentStore, known_urls: &[String]) -> Result<String, ResponderError> {
    check_addressee(document, known_urls)?;

    let root = document.root_element();
    let relates_to = envelope::relates_to_from_request(document).unwrap_or_default();
    let return_type = extract_return_type(root);
    let patient_ids = extract_patient_ids(root);

    let documents = store.find_document_metadata(&patient_ids).await?;
    let body = build_response_body(&return_type, &documents);
    envelope::build_response(Action::Iti38Response, &relates_to, body).map_err(ResponderError::from)
}

fn build_response_body<'a>(return_type: &str, documents: &'a [DocumentMetadata]) -> Element<'a> {
    let query = Namespace::new(QUERY_NS);
    let rim = Namespace::new(RIM_NS);

    let mut registry_object_list = Element::namespaced("RegistryObjectList", rim.clone());

    if return_type == "ObjectRef" {
        for document in documents {
            registry_object_list = registry_object_list.add_child(
                Element::namespaced("ObjectRef", rim.clone())
                    .add_attribute(Attribute::new("id", format!("urn:uuid:{}", document.document_id)))
                    .add_attribute(Attribute::new("home", format!("urn:oid:{}", document.hcid))),
            );
        }
    } else {
        for document in documents {
            registry_object_list = registry_object_list.add_child(leaf_class_object(&rim, document));
        }
        if !documents.is_empty() {
            registry_object_list = registry_object_list.add_child(
                Element::namespaced("RegistryPackage", rim.clone())
                    .add_attribute(Attribute::new("home", format!("urn:oid:{}", documents[0].hcid)))
                    .add_attribute(Attribute::new("id", format!("urn:uuid:{}", uuid::Uuid::new_v4())))
                    .add_attribute(Attribute::new("objectType", "urn:oasis:names:tc:ebxml-regrep:ObjectType:RegistryPackage"))
                    .add_attribute(Attribute::new("status", "urn:oasis:names:tc:ebxml-regrep:StatusType:Approved")),
            );
        }
    }

    Element::namespaced("AdhocQueryResponse", query.clone())
        .add_namespace_declaration(QUERY_NS, Some("query"))
        .add_namespace_declaration(RIM_NS, Some("rim"))
        .add_attribute(Attribute::new("status", "urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Success"))
        .add_child(registry_object_list)
}

fn leaf_class_object<'a>(rim: &Namespace<'a>, document: &'a DocumentMetadata) -> Element<'a> {
    let registry_object_id = format!("urn:uuid:{}", uuid::Uuid::new_v4());
    let pid_concat = format!("{}^^^&{}&ISO", document.patient_id, document.hcid);

    let patient_slot = value_slot(rim, "sourcePatientId", &pid_concat);
    let repo_slot = value_slot(rim, "repositoryUniqueId", &document.repository_id);

    let patient_external_identifier = external_identifier(rim, &registry_object_id, PATIENT_ID_SCHEME, &pid_concat, "XDSDocumentEntry.patientId");
    let document_external_identifier = external_identifier(rim, &registry_object_id, DOCUMENT_ID_SCHEME, &document.document_id, "XDSDocumentEntry.uniqueId");

    let name = Element::namespaced("Name", rim.clone())
        .add_child(Element::namespaced("LocalizedString", rim.clone()).add_attribute(Attribute::new("charset", "UTF-8")).add_attribute(Attribute::new("value", document.doc_name.clone())));

    let mut extrinsic_object = Element::namespaced("ExtrinsicObject", rim.clone())
        .add_attribute(Attribute::new("id", registry_object_id.clone()))
        .add_attribute(Attribute::new("home", format!("urn:oid:{}", document.hcid)))
        .add_attribute(Attribute::new("mimeType", "text/xml"))
        .add_attribute(Attribute::new("isOpaque", "false"))
        .add_attribute(Attribute::new("status", "urn:oasis:names:tc:ebxml-regrep:StatusType:Approved"))
        .add_child(patient_slot)
        .add_child(repo_slot)
        .add_child(name)
        .add_child(classification(rim, &registry_object_id, CLASS_CODE_SCHEME, &document.loinc_code, LOINC_CODING_SCHEME))
        .add_child(classification(rim, &registry_object_id, FORMAT_CODE_SCHEME, &document.format_code, &document.format_system))
        .add_child(classification(rim, &registry_object_id, CONFIDENTIALITY_CODE_SCHEME, "N", "2.16.840.1.113883.5.25"));

    if let (Some(hcf_code), Some(hcf_system)) = (&document.hcf_code, &document.hcf_system) {
        extrinsic_object = extrinsic_object.add_child(classification(rim, &registry_object_id, HCF_CODE_SCHEME, hcf_code, hcf_system));
    }

    extrinsic_object.add_child(patient_external_identifier).add_child(document_external_identifier)
}

fn value_slot<'a>(rim: &Namespace<'a>, name: &'a str, value: &'a str) -> Element<'a> {
    Element::namespaced("Slot", rim.clone())
        .add_attribute(Attribute::new("name", name))
        .add_child(Element::namespaced("ValueList", rim.clone()).add_child(Element::namespaced("Value", rim.clone()).set_text(value)))
}

fn external_identifier<'a>(rim: &Namespace<'a>, registry_object_id: &'a str, scheme: &'a str, value: &'a str, display_name: &'a str) -> Element<'a> {
    Element::namespaced("ExternalIdentifier", rim.clone())
        .add_attribute(Attribute::new("id", format!("urn:uuid:{}", uuid::Uuid::new_v4())))
        .add_attribute(Attribute::new("lid", format!("urn:uuid:{}", uuid::Uuid::new_v4())))
        .add_attribute(Attribute::new("objectType", "urn:oasis:names:tc:ebxml-regrep:ObjectType:RegistryObject:ExternalIdentifier"))
        .add_attribute(Attribute::new("registryObject", registry_object_id))
        .add_attribute(Attribute::new("identificationScheme", scheme))
        .add_attribute(Attribute::new("value", value))
        .add_child(
            Element::namespaced("Name", rim.clone())
                .add_child(Element::namespaced("LocalizedString", rim.clone()).add_attribute(Attribute::new("charset", "UTF-8")).add_attribute(Attribute::new("value", display_name))),
        )
}

fn classification<'a>(rim: &Namespace<'a>, registry_object_id: &'a str, scheme: &'a str, code: &'a str, system: &'a str) -> Element<'a> {
    Element::namespaced("Classification", rim.clone())
        .add_attribute(Attribute::new("id", format!("urn:uuid:{}", uuid::Uuid::new_v4())))
        .add_attribute(Attribute::new("objectType", "urn:oasis:names:tc:ebxml-regrep:ObjectType:RegistryObject:Classification"))
        .add_attribute(Attribute::new("classificationScheme", scheme))
        .add_attribute(Attribute::new("classifiedObject", registry_object_id))
        .add_attribute(Attribute::new("nodeRepresentation", code))
        .add_child(Element::namespaced("Slot", rim.clone()).add_attribute(Attribute::new("name", "codingScheme")).add_child(
            Element::namespaced("ValueList", rim.clone()).add_child(Element::namespaced("Value", rim.clone()).set_text(system)),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_concatenated_patient_id() {
        let xml = r#"<r xmlns="urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0">
            <Slot name="$XDSDocumentEntryPatientId"><ValueList><Value>'999^^^&amp;1.2.3&amp;ISO'</Value></ValueList></Slot>
        </r>"#;
        let doc = xcpd_xml::parser::parse(xml).unwrap();
        let ids = extract_patient_ids(doc.root_element());
        assert_eq!(ids, vec!["999"]);
    }

    #[test]
    fn defaults_return_type_to_leaf_class() {
        let xml = r#"<r xmlns="urn:oasis:names:tc:ebxml-regrep:xsd:query:3.0"></r>"#;
        let doc = xcpd_xml::parser::parse(xml).unwrap();
        assert_eq!(extract_return_type(doc.root_element()), "LeafClass");
    }
}
