//! ITI-39 (`RetrieveDocumentSetRequest`) request construction and
//! response parsing — grounded on `search/iti39initiator.py` and
//! `chained.py#extract_full_docs_and_sort`.

use xcpd_core::model::DocumentReference;
use xcpd_xml::builder::{Element, Namespace};

pub const XDSB_NS: &str = "urn:ihe:iti:xds-b:2007";
pub const CHUNK_SIZE: usize = 5;
pub const TIMEOUT_SECS: u64 = 60;

/// Splits `refs` into chunks of [`CHUNK_SIZE`], each sent as a
/// concurrent `RetrieveDocumentSetRequest`.
pub fn chunk(refs: &[DocumentReference]) -> impl Iterator<Item = &[DocumentReference]> {
    refs.chunks(CHUNK_SIZE)
}

/// Builds one `DocumentRequest` per reference in `chunk`.
pub fn build_request_body<'a>(chunk: &'a [DocumentReference]) -> Element<'a> {
    let xdsb = Namespace::new(XDSB_NS);

    let requests = chunk.iter().map(|reference| {
        Element::namespaced("DocumentRequest", xdsb.clone())
            .add_child(
                Element::namespaced("HomeCommunityId", xdsb.clone())
                    .set_text(format!("urn:oid:{}", reference.replacement_hcid)),
            )
            .add_child(Element::namespaced("RepositoryUniqueId", xdsb.clone()).set_text(reference.rid.clone()))
            .add_child(Element::namespaced("DocumentUniqueId", xdsb.clone()).set_text(reference.doc_id.clone()))
    });

    Element::namespaced("RetrieveDocumentSetRequest", xdsb.clone())
        .add_namespace_declaration(XDSB_NS, None)
        .add_children(requests)
}

/// Extracts every `ClinicalDocument` fragment from one chunk's response
/// body and associates it with `chunk_refs[i]`'s `doc_type` — indexed
/// against that chunk's own slice, not a global response index (the
/// original source's single-chunk-only indexing bug, see DESIGN.md).
pub fn parse_chunk_response<'a>(body: Option<&'a str>, chunk_refs: &[DocumentReference]) -> Vec<(String, String)> {
    let Some(body) = body else {
        tracing::debug!("iti39 chunk response: no transport response");
        return Vec::new();
    };

    let documents = xcpd_xml::parser::extract_all_tag_spans(body, "ClinicalDocument");
    if documents.is_empty() {
        tracing::debug!("iti39 chunk response: no ClinicalDocument fragments found");
    }
    documents
        .into_iter()
        .enumerate()
        .filter_map(|(i, doc)| chunk_refs.get(i).map(|reference| (reference.doc_type.clone(), doc.to_string())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(doc_type: &str) -> DocumentReference {
        DocumentReference {
            pid: "p".into(),
            doc_id: "d".into(),
            rid: "r".into(),
            doc_type: doc_type.into(),
            replacement_hcid: "1.2.3".into(),
        }
    }

    #[test]
    fn chunks_into_groups_of_five() {
        let refs: Vec<_> = (0..12).map(|_| reference("34133-9")).collect();
        let chunks: Vec<_> = chunk(&refs).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 2);
    }

    #[test]
    fn request_body_carries_replacement_hcid() {
        let refs = vec![reference("34133-9")];
        let body = build_request_body(&refs);
        let xml = xcpd_xml::builder::Builder::new(None, body).to_xml_string().unwrap();
        assert!(xml.contains("urn:oid:1.2.3"));
    }

    #[test]
    fn parses_documents_by_chunk_local_index() {
        let refs = vec![reference("type-a"), reference("type-b")];
        let body = "<ClinicalDocument>A</ClinicalDocument><ClinicalDocument>B</ClinicalDocument>";
        let parsed = parse_chunk_response(Some(body), &refs);
        assert_eq!(parsed[0].0, "type-a");
        assert_eq!(parsed[1].0, "type-b");
    }

    #[test]
    fn timeout_returns_empty() {
        assert!(parse_chunk_response(None, &[reference("x")]).is_empty());
    }
}
