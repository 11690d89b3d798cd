//! Upload error types.

use assetstage_protocol::ContentId;
use assetstage_staging::{RepositoryError, StagingError};

/// Errors that abort an upload batch.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("{asset} depends on {dependency}, which is not part of the batch")]
    DanglingDependency {
        asset: ContentId,
        dependency: ContentId,
    },

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("cancelled")]
    Cancelled,
}

impl UploadError {
    /// `true` when the batch stopped because it was cancelled, not because
    /// something failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Repository(RepositoryError::Cancelled)
                | Self::Staging(StagingError::Cancelled)
        )
    }
}
