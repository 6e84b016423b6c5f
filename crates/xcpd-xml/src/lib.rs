//! A small XML element tree builder and a thin `roxmltree`-based parser,
//! used to assemble and inspect the SOAP/HL7v3/ebXML wire shapes this
//! crate speaks.

pub mod builder;
pub mod parser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    #[error("invalid xml: {0}")]
    ParserError(String),

    #[error("invalid namespace: expected '{expected}', found '{found:?}'")]
    InvalidNamespace {
        expected: String,
        found: Option<String>,
    },

    #[error("invalid tag: expected '{expected}', found '{found}'")]
    InvalidTag { expected: String, found: String },

    #[error("invalid number of tags for {tag}: found {value}")]
    TagCountInvalid { tag: String, value: usize },

    #[error("element not found: {0}")]
    MissingElement(String),

    #[error("no envelope found in response body")]
    NoEnvelope,

    #[error("{0}")]
    Generic(String),
}

impl From<roxmltree::Error> for XmlError {
    fn from(e: roxmltree::Error) -> Self {
        XmlError::ParserError(e.to_string())
    }
}
