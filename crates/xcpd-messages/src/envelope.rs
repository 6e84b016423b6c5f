//! SOAP 1.2 envelope construction (§4.1): header ordering, WS-Addressing
//! elements, and the signed `wsse:Security` block on requests.

use crate::{Action, MessagesError};
use chrono::{DateTime, Utc};
use xcpd_core::model::UserQualifications;
use xcpd_saml::SigningIdentity;
use xcpd_xml::builder::{Attribute, Builder, Declaration, Element, Namespace};

pub const SOAP_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const ADDR_NS: &str = "http://www.w3.org/2005/08/addressing";

/// Builds a signed SOAP request envelope: `Security`, `Action`
/// (`mustUnderstand="1"`), `MessageID` (fresh UUIDv4), `To`
/// (`wsu:Id="_1"`), an optional `ReplyTo`, wrapping `body`.
#[allow(clippy::too_many_arguments)]
pub fn build_request<'a>(
    identity: &'a SigningIdentity,
    qualifications: &'a UserQualifications,
    action: Action,
    to_url: &'a str,
    reply_to_url: Option<&'a str>,
    issued_at: DateTime<Utc>,
    body: Element<'a>,
) -> Result<String, MessagesError> {
    let soap_ns = Namespace::new(SOAP_NS);
    let addr_ns = Namespace::new(ADDR_NS);
    let wsu_ns = Namespace::new(xcpd_saml::WSU_NS);

    let assertion_result = xcpd_saml::build_assertion(identity, qualifications, issued_at);

    // `wsu:Id` is declared on `To` itself (not inherited from an
    // ancestor) so its canonical bytes are identical both when signed
    // standalone and once embedded in the final envelope.
    let to_element = Element::namespaced("To", addr_ns.clone())
        .add_namespace_declaration(xcpd_saml::WSU_NS, Some("wsu"))
        .add_attribute(Attribute::new("Id", "_1").set_namespace(wsu_ns))
        .set_text(to_url);

    let security = xcpd_saml::build_security_header(
        identity,
        assertion_result.assertion,
        &assertion_result.assertion_id,
        issued_at,
        &to_element,
        &soap_ns,
    )?;

    let mut header = Element::namespaced("Header", soap_ns.clone())
        .add_child(security)
        .add_child(
            Element::namespaced("Action", addr_ns.clone())
                .add_attribute(Attribute::new("mustUnderstand", "1").set_namespace(soap_ns.clone()))
                .set_text(action.as_str()),
        )
        .add_child(
            Element::namespaced("MessageID", addr_ns.clone())
                .set_text(format!("urn:uuid:{}", uuid::Uuid::new_v4())),
        )
        .add_child(to_element);

    if let Some(reply_to) = reply_to_url {
        header = header.add_child(
            Element::namespaced("ReplyTo", addr_ns.clone())
                .add_child(Element::namespaced("Address", addr_ns.clone()).set_text(reply_to)),
        );
    }

    let envelope = Element::namespaced("Envelope", soap_ns.clone())
        .add_namespace_declaration(SOAP_NS, Some("s"))
        .add_namespace_declaration(ADDR_NS, Some("a"))
        .add_child(header)
        .add_child(Element::namespaced("Body", soap_ns.clone()).add_child(body));

    Builder::new(Some(Declaration::new("1.0", "utf-8")), envelope)
        .to_xml_string()
        .map_err(MessagesError::Xml)
}

/// Builds a response envelope carrying only a `Header` (`Action` +
/// `RelatesTo`, no SAML block) and the given `body` — grounded on
/// `main.py#create_envelope_with_only_header`. Responses in the
/// original source never carry a fresh SAML assertion.
pub fn build_response<'a>(action: Action, relates_to: &'a str, body: Element<'a>) -> Result<String, MessagesError> {
    let soap_ns = Namespace::new(SOAP_NS);
    let addr_ns = Namespace::new(ADDR_NS);

    let header = Element::namespaced("Header", soap_ns.clone())
        .add_child(
            Element::namespaced("Action", addr_ns.clone())
                .add_attribute(Attribute::new("mustUnderstand", "1").set_namespace(soap_ns.clone()))
                .set_text(action.as_str()),
        )
        .add_child(Element::namespaced("RelatesTo", addr_ns.clone()).set_text(relates_to));

    let envelope = Element::namespaced("Envelope", soap_ns.clone())
        .add_namespace_declaration(SOAP_NS, Some("s"))
        .add_namespace_declaration(ADDR_NS, Some("a"))
        .add_child(header)
        .add_child(Element::namespaced("Body", soap_ns.clone()).add_child(body));

    Builder::new(Some(Declaration::new("1.0", "utf-8")), envelope)
        .to_xml_string()
        .map_err(MessagesError::Xml)
}

/// Returns the incoming request's `MessageID` text, used as the
/// outgoing response's `RelatesTo` — grounded on `main.py#get_relates_to`.
pub fn relates_to_from_request(document: &xcpd_xml::parser::Document<'_>) -> Option<String> {
    use xcpd_xml::parser::NodeExt;
    document
        .root_element()
        .descendants_named("MessageID")
        .first()
        .and_then(|n| n.own_text())
        .map(str::to_owned)
}
