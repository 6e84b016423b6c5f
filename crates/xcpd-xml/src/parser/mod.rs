//! Thin wrapper around `roxmltree` plus the handful of lookup helpers
//! the message parsers need (descendants by local name, attribute
//! access, first-matching-text).

pub use roxmltree::{Document, Node};

use crate::XmlError;

/// Extracts the substring spanning a (possibly namespace-prefixed)
/// `Envelope`...`Envelope` element from a raw response body. Transport
/// layers here are not guaranteed to hand back a bare envelope (proxies
/// and gateways sometimes wrap or prefix the body), so this scans for
/// the element by tag suffix rather than assuming byte offset 0.
pub fn extract_envelope_content(body: &str) -> Option<&str> {
    let start_tag = find_tag_open(body, "Envelope", 0)?;
    let open_end = body[start_tag..].find('>')? + start_tag + 1;
    let close = find_tag_close(body, "Envelope", open_end)?;
    Some(&body[start_tag..close])
}

fn find_tag_open(body: &str, local_name: &str, from: usize) -> Option<usize> {
    let mut idx = from;
    while let Some(pos) = body[idx..].find('<') {
        let abs = idx + pos;
        let rest = &body[abs + 1..];
        if rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('!') {
            idx = abs + 1;
            continue;
        }
        let tag_end = rest
            .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
            .unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        if tag == local_name || tag.ends_with(&format!(":{local_name}")) {
            return Some(abs);
        }
        idx = abs + 1;
    }
    None
}

fn find_tag_close(body: &str, local_name: &str, from: usize) -> Option<usize> {
    let mut idx = from;
    while let Some(pos) = body[idx..].find("</") {
        let abs = idx + pos;
        let rest = &body[abs + 2..];
        let tag_end = rest.find('>')?;
        let tag = &rest[..tag_end];
        if tag == local_name || tag.ends_with(&format!(":{local_name}")) {
            return Some(abs + 2 + tag_end + 1);
        }
        idx = abs + 2;
    }
    None
}

/// Extracts every non-overlapping substring spanning a (possibly
/// namespace-prefixed) `local_name`...`local_name` element, scanning
/// left to right. Used for pulling raw `ClinicalDocument` fragments out
/// of an ITI-39 response body without requiring the whole body to be
/// well-formed XML (it usually isn't — it's a MIME/SOAP mix).
pub fn extract_all_tag_spans<'a>(body: &'a str, local_name: &str) -> Vec<&'a str> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some(start) = find_tag_open(body, local_name, from) {
        let Some(open_end) = body[start..].find('>').map(|i| start + i + 1) else {
            break;
        };
        let Some(close) = find_tag_close(body, local_name, open_end) else {
            break;
        };
        spans.push(&body[start..close]);
        from = close;
    }
    spans
}

/// Parses a full envelope document, returning the `roxmltree::Document`.
pub fn parse(xml: &str) -> Result<Document<'_>, XmlError> {
    Ok(roxmltree::Document::parse(xml)?)
}

pub trait NodeExt<'a, 'input: 'a> {
    fn local_name(&self) -> &'a str;
    fn descendants_named(&self, local_name: &str) -> Vec<Node<'a, 'input>>;
    fn first_child_named(&self, local_name: &str) -> Option<Node<'a, 'input>>;
    fn attr(&self, name: &str) -> Option<&'a str>;
    fn own_text(&self) -> Option<&'a str>;
}

impl<'a, 'input: 'a> NodeExt<'a, 'input> for Node<'a, 'input> {
    fn local_name(&self) -> &'a str {
        self.tag_name().name()
    }

    fn descendants_named(&self, local_name: &str) -> Vec<Node<'a, 'input>> {
        self.descendants()
            .filter(|n| n.is_element() && n.local_name() == local_name)
            .collect()
    }

    fn first_child_named(&self, local_name: &str) -> Option<Node<'a, 'input>> {
        self.children()
            .find(|n| n.is_element() && n.local_name() == local_name)
    }

    fn attr(&self, name: &str) -> Option<&'a str> {
        self.attribute(name)
    }

    fn own_text(&self) -> Option<&'a str> {
        self.children().find(|n| n.is_text()).and_then(|n| n.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_prefixed_envelope() {
        let body = r#"garbage<soap:Envelope xmlns:soap="x"><soap:Body/></soap:Envelope>trailer"#;
        let extracted = extract_envelope_content(body).unwrap();
        assert!(extracted.starts_with("<soap:Envelope"));
        assert!(extracted.ends_with("</soap:Envelope>"));
    }

    #[test]
    fn returns_none_without_envelope() {
        assert_eq!(extract_envelope_content("<foo/>"), None);
    }
}
