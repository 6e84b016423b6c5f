//! SOAP envelope construction/parsing and the ITI-55/38/39 message
//! factories described in SPEC_FULL.md §4.1, §4.3-§4.5.

pub mod action;
pub mod envelope;
pub mod iti38;
pub mod iti39;
pub mod iti55;

pub use action::Action;

#[derive(Debug, thiserror::Error)]
pub enum MessagesError {
    #[error(transparent)]
    Xml(#[from] xcpd_xml::XmlError),

    #[error(transparent)]
    Saml(#[from] xcpd_saml::SamlError),
}
