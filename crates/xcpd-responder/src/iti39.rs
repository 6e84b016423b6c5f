//! ITI-39 responder: `DocumentRequest` extraction, local hcid
//! filtering, and the lossy JSON→XML document rendering — grounded on
//! `search/iti39responder.py`.

use crate::{check_addressee, DocumentStore, ResponderError};
use base64::{engine::general_purpose::STANDARD, Engine};
use xcpd_messages::{envelope, Action};
use xcpd_xml::builder::{Attribute, Element, Namespace};
use xcpd_xml::parser::{Document, Node, NodeExt};

const XDSB_NS: &str = "urn:ihe:iti:xds-b:2007";
const RS_NS: &str = "urn:oasis:names:tc:ebxml-regrep:xsd:rs:3.0";

/// One `(repository id, document id)` request, after the `home`
/// community id has been stripped of its `urn:oid:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRequest {
    pub repository_id: String,
    pub document_id: String,
}

/// Extracts `DocumentRequest` elements and keeps only those whose
/// `HomeCommunityId` matches `our_hcid` — `process_xca_retrieve_documents_request`.
pub fn extract_requests(request: Node<'_, '_>, our_hcid: &str) -> Vec<DocumentRequest> {
    request
        .descendants_named("DocumentRequest")
        .into_iter()
        .filter_map(|node| {
            let repository_id = node.descendants_named("RepositoryUniqueId").into_iter().next().and_then(|n| n.own_text())?;
            let raw_hcid = node.descendants_named("HomeCommunityId").into_iter().next().and_then(|n| n.own_text())?;
            let document_id = node.descendants_named("DocumentUniqueId").into_iter().next().and_then(|n| n.own_text())?;
            let hcid = raw_hcid.strip_prefix("urn:oid:").unwrap_or(raw_hcid);
            if hcid != our_hcid {
                return None;
            }
            Some(DocumentRequest {
                repository_id: repository_id.to_string(),
                document_id: document_id.to_string(),
            })
        })
        .collect()
}

pub async fn handle_request(document: &Document<'_>, store: &impl DocumentStore, known_urls: &[String], our_hcid: &str) -> Result<String, ResponderError> {
    check_addressee(document, known_urls)?;

    let root = document.root_element();
    let relates_to = envelope::relates_to_from_request(document).unwrap_or_default();
    let requests = extract_requests(root, our_hcid);

    let mut found = Vec::new();
    for request in &requests {
        if let Some(resource) = store.retrieve_document(&request.repository_id, &request.document_id).await? {
            let rendered = json_to_xml(&resource, "");
            let encoded = STANDARD.encode(rendered.as_bytes());
            found.push((request, encoded));
        }
    }

    let body = build_response_body(our_hcid, &found);
    envelope::build_response(Action::Iti39Response, &relates_to, body).map_err(ResponderError::from)
}

fn build_response_body<'a>(our_hcid: &'a str, found: &'a [(&'a DocumentRequest, String)]) -> Element<'a> {
    let xdsb = Namespace::new(XDSB_NS);
    let rs = Namespace::new(RS_NS);

    let mut response = Element::namespaced("RetrieveDocumentSetResponse", xdsb.clone())
        .add_namespace_declaration(XDSB_NS, None)
        .add_namespace_declaration(RS_NS, Some("rs"))
        .add_child(
            Element::namespaced("RegistryResponse", rs.clone())
                .add_attribute(Attribute::new("status", "urn:oasis:names:tc:ebxml-regrep:ResponseStatusType:Success")),
        );

    for (request, document) in found {
        response = response.add_child(
            Element::namespaced("DocumentResponse", xdsb.clone())
                .add_child(Element::namespaced("HomeCommunityId", xdsb.clone()).set_text(our_hcid))
                .add_child(Element::namespaced("RepositoryUniqueId", xdsb.clone()).set_text(request.repository_id.clone()))
                .add_child(Element::namespaced("DocumentUniqueId", xdsb.clone()).set_text(request.document_id.clone()))
                .add_child(Element::namespaced("mimeType", xdsb.clone()).set_text("text/xml"))
                .add_child(Element::namespaced("Document", xdsb.clone()).set_text(document.clone())),
        );
    }

    response
}

/// A deliberately lossy JSON→XML recursion: object keys become
/// wrapping elements, arrays recurse without a wrapping element of
/// their own, and scalars render as bare text — grounded verbatim on
/// `utils.py#json2xml`.
fn json_to_xml(value: &serde_json::Value, padding: &str) -> String {
    match value {
        serde_json::Value::Array(items) => items.iter().map(|item| json_to_xml(item, padding)).collect::<Vec<_>>().join("\n"),
        serde_json::Value::Object(map) => {
            let nested = format!("\t{padding}");
            let mut lines = Vec::with_capacity(map.len() * 3);
            for (tag, sub) in map {
                lines.push(format!("{padding}<{tag}>"));
                lines.push(json_to_xml(sub, &nested));
                lines.push(format!("{padding}</{tag}>"));
            }
            lines.join("\n")
        }
        scalar => format!("{padding}{}", scalar_text(scalar)),
    }
}

/// `"None"` for `Null` mirrors the original's fallthrough to Python's
/// `%s` formatting of `None` — there is no null special-case in
/// `json2xml`, so a null value renders as the literal text `None`.
fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => "None".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_oid_prefix_and_filters_by_hcid() {
        let xml = r#"<r>
            <DocumentRequest>
                <HomeCommunityId>urn:oid:1.2.3</HomeCommunityId>
                <RepositoryUniqueId>rep1</RepositoryUniqueId>
                <DocumentUniqueId>doc1</DocumentUniqueId>
            </DocumentRequest>
            <DocumentRequest>
                <HomeCommunityId>urn:oid:9.9.9</HomeCommunityId>
                <RepositoryUniqueId>rep2</RepositoryUniqueId>
                <DocumentUniqueId>doc2</DocumentUniqueId>
            </DocumentRequest>
        </r>"#;
        let doc = xcpd_xml::parser::parse(xml).unwrap();
        let requests = extract_requests(doc.root_element(), "1.2.3");
        assert_eq!(requests, vec![DocumentRequest { repository_id: "rep1".into(), document_id: "doc1".into() }]);
    }

    #[test]
    fn json_to_xml_recurses_objects_without_wrapping_arrays() {
        let value = json!({"name": [{"given": "Jane"}]});
        let xml = json_to_xml(&value, "");
        assert_eq!(xml, "<name>\n\t<given>\n\t\tJane\n\t</given>\n</name>");
    }
}
