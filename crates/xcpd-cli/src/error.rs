//! Top-level error aggregator unifying every per-crate `thiserror` enum
//! at the one boundary that has to turn them into an HTTP response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum XcpdError {
    #[error(transparent)]
    Core(#[from] xcpd_core::CoreError),

    #[error(transparent)]
    Xml(#[from] xcpd_xml::XmlError),

    #[error(transparent)]
    Messages(#[from] xcpd_messages::MessagesError),

    #[error(transparent)]
    Saml(#[from] xcpd_saml::SamlError),

    #[error(transparent)]
    Transport(#[from] xcpd_transport::TransportError),

    #[error(transparent)]
    Directory(#[from] xcpd_directory::DirectoryError),

    #[error(transparent)]
    Pipeline(#[from] xcpd_pipeline::PipelineError),

    #[error(transparent)]
    Responder(#[from] xcpd_responder::ResponderError),

    #[error("database pool failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// §7: malformed/absent envelopes collapse to `NF` inside each
/// responder handler already; what reaches here is either a
/// programmer-visible boundary failure (bad addressee, bad JSON action
/// envelope) or an infrastructure failure. Neither has patient data in
/// it, so the message is safe to return as-is.
impl IntoResponse for XcpdError {
    fn into_response(self) -> Response {
        let status = match &self {
            XcpdError::Responder(xcpd_responder::ResponderError::WrongAddressee(_)) => StatusCode::FORBIDDEN,
            XcpdError::Responder(xcpd_responder::ResponderError::MalformedRequest) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
