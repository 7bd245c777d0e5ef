use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("client credentials are not configured; fill in {}", .0.display())]
    ConfigMissing(PathBuf),

    #[error("authorization code exchange failed: {0}")]
    AuthExchange(String),

    #[error("authorization required: {0}")]
    AuthorizationRequired(String),

    #[error("No URLs found in the link file.")]
    EmptyBatch,

    #[error("a batch is already running")]
    BatchInProgress,

    #[error("{0}")]
    Submission(String),
}
