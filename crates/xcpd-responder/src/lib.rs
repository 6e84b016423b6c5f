//! Inbound ITI-55/38/39 handlers run against a local patient/document
//! store — grounded on `search/iti55responder.py`,
//! `search/iti38responder.py` and `search/iti39responder.py`.

pub mod iti38;
pub mod iti55;
pub mod iti39;
pub mod store;

pub use store::{DocumentMetadata, DocumentStore, Iti55Query, PatientRecord, PatientStore};

#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    /// The inbound `To` header doesn't name one of our own known URLs
    /// — unconditionally fatal (§9), never a soft warning.
    #[error("request addressed to {0}, which is not one of our known endpoints")]
    WrongAddressee(String),

    #[error("request body has no envelope or is missing a required element")]
    MalformedRequest,

    #[error(transparent)]
    Xml(#[from] xcpd_xml::XmlError),

    #[error(transparent)]
    Messages(#[from] xcpd_messages::MessagesError),

    #[error("patient/document store error: {0}")]
    Store(String),
}

/// Checks the inbound `To` element against the set of URLs this
/// gateway answers as. Grounded verbatim on every responder's
/// constructor-time `to_element not in self.possible_urls` check.
pub(crate) fn check_addressee(document: &xcpd_xml::parser::Document<'_>, known_urls: &[String]) -> Result<(), ResponderError> {
    use xcpd_xml::parser::NodeExt;
    let to = document
        .root_element()
        .descendants_named("To")
        .first()
        .and_then(|n| n.own_text())
        .ok_or(ResponderError::MalformedRequest)?;
    if known_urls.iter().any(|url| url == to) {
        Ok(())
    } else {
        Err(ResponderError::WrongAddressee(to.to_string()))
    }
}
