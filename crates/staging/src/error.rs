//! Staging error types.

/// Errors returned by a [`ContentRepository`](crate::ContentRepository).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("repository communication failed: {0}")]
    Communication(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("cancelled")]
    Cancelled,
}

/// Errors produced while building or evaluating the staging graph.
#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("comparison failed for {path}: {message}")]
    Comparison { path: String, message: String },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("transfer error: {0}")]
    Transfer(#[from] assetstage_transfer::TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("cancelled")]
    Cancelled,
}
