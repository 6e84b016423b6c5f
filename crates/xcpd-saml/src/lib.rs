//! SAML 2.0 Holder-of-Key assertion construction and the WS-Security
//! `Security` header (assertion + detached signature over the SOAP
//! `Timestamp`/`To`) described in SPEC_FULL.md §4.2.
//!
//! Canonicalization note: a conformant implementation would run
//! Exclusive XML Canonicalization (`xml-exc-c14n`) over arbitrary,
//! possibly third-party XML. This crate only ever canonicalizes
//! fragments *it produced itself* with `xcpd_xml::builder`, whose
//! serialization is already deterministic (fixed attribute order, one
//! namespace declaration point per fragment) — so canonicalization
//! here is the identity function over those bytes rather than a
//! general-purpose C14N pass. The wire-level algorithm identifier is
//! still `http://www.w3.org/2001/10/xml-exc-c14n#`, matching what
//! responders expect to see declared.

mod identity;
mod sign;

pub use identity::SigningIdentity;

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use xcpd_core::model::{Role, UserQualifications};
use xcpd_xml::builder::{Attribute, Element, Namespace};

pub const SAML_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

const FIXED_AUDIENCE: &str = "http://ihe.connectathon.XUA/X-ServiceProvider-IHE-Connectathon";

#[derive(Debug, thiserror::Error)]
pub enum SamlError {
    #[error("failed to load signing identity: {0}")]
    Identity(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Xml(#[from] xcpd_xml::XmlError),
}

fn format_instant(dt: DateTime<Utc>) -> String {
    // millisecond precision, matching the original's `%f`[:-3]+"Z" truncation.
    format!("{}Z", dt.format("%Y-%m-%dT%H:%M:%S%.3f"))
}

pub struct AssertionResult<'a> {
    pub assertion: Element<'a>,
    pub assertion_id: String,
}

/// Builds the SAML assertion described in SPEC_FULL.md §4.2, items 2-2.
///
/// `issued_at` is threaded in explicitly (rather than read from the
/// system clock inside this function) so the same timestamp can also
/// stamp the SOAP `Timestamp` header and so tests are deterministic.
pub fn build_assertion<'a>(
    identity: &'a SigningIdentity,
    qualifications: &'a UserQualifications,
    issued_at: DateTime<Utc>,
) -> AssertionResult<'a> {
    let assertion_id = format!("_{}", uuid::Uuid::new_v4());
    let not_before = format_instant(issued_at);
    let not_on_or_after = format_instant(issued_at + Duration::hours(1));
    let subject = identity.subject_name.as_str();

    let saml_ns = Namespace::new(SAML_NS);
    let dsig_ns = Namespace::new(DSIG_NS);

    let key_info = Element::namespaced("KeyInfo", dsig_ns.clone())
        .add_namespace_declaration(DSIG_NS, Some("ds"))
        .add_child(
        Element::namespaced("KeyValue", dsig_ns.clone()).add_child(
            Element::namespaced("RSAKeyValue", dsig_ns.clone())
                .add_child(Element::namespaced("Modulus", dsig_ns.clone()).set_text(identity.modulus_base64()))
                .add_child(Element::namespaced("Exponent", dsig_ns.clone()).set_text("AQAB")),
        ),
    );

    let subject_confirmation_data = Element::namespaced("SubjectConfirmationData", saml_ns.clone())
        .add_attribute(Attribute::new("type", "KeyInfoConfirmationDataType"))
        .add_child(key_info);

    let subject_el = Element::namespaced("Subject", saml_ns.clone())
        .add_child(
            Element::namespaced("NameID", saml_ns.clone())
                .add_attribute(Attribute::new(
                    "Format",
                    "urn:oasis:names:tc:SAML:1.1:nameid-format:X509SubjectName",
                ))
                .set_text(subject),
        )
        .add_child(
            Element::namespaced("SubjectConfirmation", saml_ns.clone())
                .add_attribute(Attribute::new(
                    "Method",
                    "urn:oasis:names:tc:SAML:2.0:cm:holder-of-key",
                ))
                .add_child(subject_confirmation_data),
        );

    let conditions = Element::namespaced("Conditions", saml_ns.clone())
        .add_attribute(Attribute::new("NotBefore", not_before.clone()))
        .add_attribute(Attribute::new("NotOnOrAfter", not_on_or_after.clone()))
        .add_child(
            Element::namespaced("AudienceRestriction", saml_ns.clone())
                .add_child(Element::namespaced("Audience", saml_ns.clone()).set_text(FIXED_AUDIENCE)),
        );

    let authn_statement = Element::namespaced("AuthnStatement", saml_ns.clone())
        .add_attribute(Attribute::new("AuthnInstant", not_before.clone()))
        .add_child(
            Element::namespaced("AuthnContext", saml_ns.clone()).add_child(
                Element::namespaced("AuthnContextClassRef", saml_ns.clone())
                    .set_text("urn:oasis:names:tc:SAML:2.0:ac:classes:Password"),
            ),
        );

    let attribute_statement = Element::namespaced("AttributeStatement", saml_ns.clone()).add_children([
        simple_attribute(
            &saml_ns,
            "urn:oasis:names:tc:xspa:1.0:subject:subject-id",
            Some("XSPA Subject"),
            &qualifications.subject_name,
        ),
        simple_attribute(
            &saml_ns,
            "urn:oasis:names:tc:xspa:1.0:subject:organization",
            None,
            &qualifications.organization,
        ),
        simple_attribute(
            &saml_ns,
            "urn:oasis:names:tc:xspa:2.0:subject:npi",
            Some("NPI"),
            &qualifications.npi,
        ),
        simple_attribute(
            &saml_ns,
            "urn:oasis:names:tc:xspa:1.0:subject:organization-id",
            Some("XSPA Organization ID"),
            format!("urn:oid:{}", qualifications.org_hcid),
        ),
        simple_attribute(
            &saml_ns,
            "urn:nhin:names:saml:homeCommunityId",
            Some("XCA Home Community ID"),
            format!("urn:oid:{}", qualifications.org_hcid),
        ),
        purpose_of_use_attribute(&saml_ns, qualifications),
        role_attribute(&saml_ns, qualifications),
    ]);

    let assertion = Element::namespaced("Assertion", saml_ns.clone())
        .add_namespace_declaration(SAML_NS, Some("saml2"))
        .add_attribute(Attribute::new("ID", assertion_id.clone()))
        .add_attribute(Attribute::new("IssueInstant", not_before.clone()))
        .add_attribute(Attribute::new("Version", "2.0"))
        .add_child(Element::namespaced("Issuer", saml_ns.clone()).set_text(subject))
        .add_child(subject_el)
        .add_child(conditions)
        .add_child(authn_statement)
        .add_child(attribute_statement);

    let signed = sign::sign_enveloped(identity, assertion, &assertion_id);

    AssertionResult {
        assertion: signed,
        assertion_id,
    }
}

fn simple_attribute<'a>(
    saml_ns: &Namespace<'a>,
    name: &'a str,
    friendly_name: Option<&'a str>,
    value: impl Into<std::borrow::Cow<'a, str>>,
) -> Element<'a> {
    let mut el = Element::namespaced("Attribute", saml_ns.clone()).add_attribute(Attribute::new("Name", name));
    if let Some(friendly) = friendly_name {
        el = el.add_attribute(Attribute::new("FriendlyName", friendly));
    }
    el.add_child(Element::namespaced("AttributeValue", saml_ns.clone()).set_text(value))
}

fn purpose_of_use_attribute<'a>(saml_ns: &Namespace<'a>, q: &'a UserQualifications) -> Element<'a> {
    let pou = &q.purpose_of_use;
    let extension = Element::new("PurposeOfUse")
        .add_namespace_declaration("urn:hl7-org:v3", None)
        .add_attribute(Attribute::new("code", pou.code.as_str()))
        .add_attribute(Attribute::new("codeSystem", pou.code_system.as_str()))
        .add_attribute(Attribute::new("codeSystemName", pou.code_system_name.as_str()))
        .add_attribute(Attribute::new("displayName", pou.display_name.as_str()));

    Element::namespaced("Attribute", saml_ns.clone())
        .add_attribute(Attribute::new(
            "Name",
            "urn:oasis:names:tc:xspa:1.0:subject:purposeofuse",
        ))
        .add_attribute(Attribute::new("FriendlyName", "Purpose of Use"))
        .add_child(Element::namespaced("AttributeValue", saml_ns.clone()).add_child(extension))
}

fn role_attribute<'a>(saml_ns: &Namespace<'a>, q: &'a UserQualifications) -> Element<'a> {
    let role: &Role = &q.role;
    let extension = Element::new("Role")
        .add_namespace_declaration("urn:hl7-org:v3", None)
        .add_attribute(Attribute::new("code", role.code.as_str()))
        .add_attribute(Attribute::new("codeSystem", role.code_system.as_str()))
        .add_attribute(Attribute::new("codeSystemName", role.code_system_name.as_str()))
        .add_attribute(Attribute::new("displayName", ""));

    Element::namespaced("Attribute", saml_ns.clone())
        .add_attribute(Attribute::new("Name", "urn:oasis:names:tc:xacml:2.0:subject:role"))
        .add_attribute(Attribute::new("FriendlyName", "HL7 Role"))
        .add_child(Element::namespaced("AttributeValue", saml_ns.clone()).add_child(extension))
}

/// Builds the `wsse:Security` header: `Timestamp` (`_0`), the signed
/// assertion, and a detached signature over `#_0`/`#_1` whose `KeyInfo`
/// is a `SecurityTokenReference` pointing at the assertion.
///
/// `to_element` must be the exact `a:To` header element this envelope
/// will be sent with (`wsu:Id="_1"`) — its serialized bytes are the
/// second signed reference, so it has to be handed in rather than
/// built here.
///
/// `soap_ns` is the caller's SOAP envelope namespace, needed so the
/// `Security` header's `mustUnderstand` attribute can be declared in
/// it rather than left bare.
pub fn build_security_header<'a>(
    identity: &'a SigningIdentity,
    assertion: Element<'a>,
    assertion_id: &'a str,
    issued_at: DateTime<Utc>,
    to_element: &Element<'a>,
    soap_ns: &Namespace<'a>,
) -> Result<Element<'a>, SamlError> {
    let wsu_ns = Namespace::new(WSU_NS);

    let created = format_instant(issued_at);
    let expires = format_instant(issued_at + Duration::hours(1));

    // The namespace declaration lives on this element itself (not an
    // ancestor) so its canonical bytes are identical whether it's
    // canonicalized standalone (for the digest) or embedded in the
    // final `Security` block.
    let timestamp = Element::namespaced("Timestamp", wsu_ns.clone())
        .add_namespace_declaration(crate::WSU_NS, Some("wsu"))
        .add_attribute(Attribute::new("Id", "_0").set_namespace(wsu_ns.clone()))
        .add_child(Element::new("Created").set_namespace(wsu_ns.clone()).set_text(created))
        .add_child(Element::new("Expires").set_namespace(wsu_ns.clone()).set_text(expires));

    sign::sign_detached(identity, timestamp, assertion, assertion_id, to_element, soap_ns)
}

pub(crate) fn sha1_digest_base64(bytes: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    let digest = Sha1::digest(bytes);
    STANDARD.encode(digest)
}
