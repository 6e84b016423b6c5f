//! Federated patient-discovery orchestration: per-responder XCPD/XCA
//! pipelines, national/regional search passes, and the two-pass
//! orchestrator tying them together — grounded on `search/chained.py`
//! and `search/main.py`'s `lambda_handler`.

pub mod federated;
pub mod pipeline;
pub mod search;

pub use federated::{run_federated_search, FederatedSearchResult};
pub use pipeline::Pipeline;
pub use search::Search;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Messages(#[from] xcpd_messages::MessagesError),

    #[error(transparent)]
    Directory(#[from] xcpd_directory::DirectoryError),
}
