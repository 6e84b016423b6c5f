#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("missing required user qualification: {0}")]
    MissingUserQualification(&'static str),

    #[error("responder endpoint '{name}' is missing {field}")]
    IncompleteEndpoint { name: String, field: &'static str },
}
