use crate::{identity::SigningIdentity, sha1_digest_base64, SamlError, DSIG_NS, WSSE_NS};
use base64::{engine::general_purpose::STANDARD, Engine};
use rsa::pkcs1v15::Pkcs1v15Sign;
use sha1::{Digest, Sha1};
use xcpd_xml::builder::{Attribute, Builder, Element, Namespace};

const C14N_ALGO: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
const RSA_SHA1_ALGO: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
const SHA1_ALGO: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
const SAML_TOKEN_VALUE_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLID";
const SAML_TOKEN_TYPE: &str =
    "http://docs.oasis-open.org/wss/oasis-wss-saml-token-profile-1.0#SAMLV2.0";

fn canonicalize(element: &Element<'_>) -> String {
    // See the module-level note in lib.rs: this crate only signs
    // fragments it built itself, whose serialization is already
    // deterministic, so canonicalization is the builder's own
    // `to_xml_string` output.
    Builder::new(None, element.clone()).to_xml_string().unwrap_or_default()
}

fn rsa_sign(identity: &SigningIdentity, bytes: &[u8]) -> Result<Vec<u8>, SamlError> {
    let hashed = Sha1::digest(bytes);
    identity
        .key
        .sign(Pkcs1v15Sign::new::<Sha1>(), &hashed)
        .map_err(|e| SamlError::Signing(e.to_string()))
}

fn key_value<'a>(identity: &'a SigningIdentity, dsig_ns: &Namespace<'a>) -> Element<'a> {
    Element::namespaced("KeyValue", dsig_ns.clone()).add_child(
        Element::namespaced("RSAKeyValue", dsig_ns.clone())
            .add_child(Element::namespaced("Modulus", dsig_ns.clone()).set_text(identity.modulus_base64()))
            .add_child(Element::namespaced("Exponent", dsig_ns.clone()).set_text("AQAB")),
    )
}

fn reference<'a>(dsig_ns: &Namespace<'a>, uri: &'a str, digest_b64: String) -> Element<'a> {
    Element::namespaced("Reference", dsig_ns.clone())
        .add_attribute(Attribute::new("URI", uri))
        .add_child(
            Element::namespaced("Transforms", dsig_ns.clone()).add_child(
                Element::namespaced("Transform", dsig_ns.clone())
                    .add_attribute(Attribute::new("Algorithm", C14N_ALGO)),
            ),
        )
        .add_child(
            Element::namespaced("DigestMethod", dsig_ns.clone())
                .add_attribute(Attribute::new("Algorithm", SHA1_ALGO)),
        )
        .add_child(Element::namespaced("DigestValue", dsig_ns.clone()).set_text(digest_b64))
}

fn enveloped_reference<'a>(dsig_ns: &Namespace<'a>, digest_b64: String) -> Element<'a> {
    Element::namespaced("Reference", dsig_ns.clone())
        .add_attribute(Attribute::new("URI", ""))
        .add_child(
            Element::namespaced("Transforms", dsig_ns.clone())
                .add_child(
                    Element::namespaced("Transform", dsig_ns.clone()).add_attribute(Attribute::new(
                        "Algorithm",
                        "http://www.w3.org/2000/09/xmldsig#enveloped-signature",
                    )),
                )
                .add_child(
                    Element::namespaced("Transform", dsig_ns.clone())
                        .add_attribute(Attribute::new("Algorithm", C14N_ALGO)),
                ),
        )
        .add_child(
            Element::namespaced("DigestMethod", dsig_ns.clone())
                .add_attribute(Attribute::new("Algorithm", SHA1_ALGO)),
        )
        .add_child(Element::namespaced("DigestValue", dsig_ns.clone()).set_text(digest_b64))
}

fn signed_info<'a>(dsig_ns: &Namespace<'a>, references: Vec<Element<'a>>) -> Element<'a> {
    // Declared on SignedInfo itself (not just its Signature parent) so
    // the bytes signed here match the bytes that appear once it's
    // embedded — see the canonicalization note in lib.rs.
    Element::namespaced("SignedInfo", dsig_ns.clone())
        .add_namespace_declaration(DSIG_NS, Some("ds"))
        .add_child(
            Element::namespaced("CanonicalizationMethod", dsig_ns.clone())
                .add_attribute(Attribute::new("Algorithm", C14N_ALGO)),
        )
        .add_child(
            Element::namespaced("SignatureMethod", dsig_ns.clone())
                .add_attribute(Attribute::new("Algorithm", RSA_SHA1_ALGO)),
        )
        .add_children(references)
}

/// Signs `assertion` in place with an enveloped signature referencing
/// the whole document (`URI=""`), `always_add_key_value`-style (the
/// `KeyValue` is always present, not only when the verifier lacks the
/// cert out of band).
pub(crate) fn sign_enveloped<'a>(
    identity: &'a SigningIdentity,
    assertion: Element<'a>,
    _assertion_id: &'a str,
) -> Element<'a> {
    let dsig_ns = Namespace::new(DSIG_NS);
    let digest = sha1_digest_base64(canonicalize(&assertion).as_bytes());

    let signed_info_el = signed_info(&dsig_ns, vec![enveloped_reference(&dsig_ns, digest)]);
    let signature_value = rsa_sign(identity, canonicalize(&signed_info_el).as_bytes())
        .map(|bytes| STANDARD.encode(bytes))
        .unwrap_or_default();

    let signature = Element::namespaced("Signature", dsig_ns.clone())
        .add_namespace_declaration(DSIG_NS, Some("ds"))
        .add_child(signed_info_el)
        .add_child(Element::namespaced("SignatureValue", dsig_ns.clone()).set_text(signature_value))
        .add_child(Element::namespaced("KeyInfo", dsig_ns.clone()).add_child(key_value(identity, &dsig_ns)));

    assertion.add_child(signature)
}

/// Builds the detached signature over `Timestamp` (`#_0`) and `To`
/// (`#_1`), whose `KeyInfo` is a `SecurityTokenReference` pointing at
/// the already-signed assertion (`always_add_key_value=false`), and
/// appends it to `security`.
pub(crate) fn sign_detached<'a>(
    identity: &'a SigningIdentity,
    timestamp: Element<'a>,
    assertion: Element<'a>,
    assertion_id: &'a str,
    to_element: &Element<'a>,
    soap_ns: &Namespace<'a>,
) -> Result<Element<'a>, SamlError> {
    let dsig_ns = Namespace::new(DSIG_NS);
    let wsse_ns = Namespace::new(WSSE_NS);

    let timestamp_digest = sha1_digest_base64(canonicalize(&timestamp).as_bytes());
    let to_digest = sha1_digest_base64(canonicalize(to_element).as_bytes());

    let references = vec![
        reference(&dsig_ns, "#_0", timestamp_digest),
        reference(&dsig_ns, "#_1", to_digest),
    ];
    let signed_info_el = signed_info(&dsig_ns, references);
    let signature_value = rsa_sign(identity, canonicalize(&signed_info_el).as_bytes())
        .map(|bytes| STANDARD.encode(bytes))?;

    let key_identifier = Element::namespaced("KeyIdentifier", wsse_ns.clone())
        .add_attribute(Attribute::new("ValueType", SAML_TOKEN_VALUE_TYPE))
        .set_text(format!("_{assertion_id}"));

    let token_reference = Element::namespaced("SecurityTokenReference", wsse_ns.clone())
        .add_attribute(Attribute::new("TokenType", SAML_TOKEN_TYPE).set_namespace(wsse_ns.clone()))
        .add_child(key_identifier);

    let signature = Element::namespaced("Signature", dsig_ns.clone())
        .add_namespace_declaration(DSIG_NS, Some("ds"))
        .add_child(signed_info_el)
        .add_child(Element::namespaced("SignatureValue", dsig_ns.clone()).set_text(signature_value))
        .add_child(Element::namespaced("KeyInfo", dsig_ns.clone()).add_child(token_reference));

    let security = Element::namespaced("Security", wsse_ns.clone())
        .add_namespace_declaration(WSSE_NS, Some("wsse"))
        .add_namespace_declaration(crate::WSU_NS, Some("wsu"))
        .add_attribute(Attribute::new("mustUnderstand", "true").set_namespace(soap_ns.clone()))
        .add_child(timestamp)
        .add_child(assertion)
        .add_child(signature);

    Ok(security)
}
