//! Data types shared by the staging, upload and CLI crates.
//!
//! Everything here is plain serde data: no I/O and no async.

pub mod ids;
pub mod records;
pub mod report;
pub mod types;
pub mod upload;

// Re-export primary types for convenience.
pub use ids::{AssetIdentifier, ContentId, ContentIdentifier, ProjectRef};
pub use records::{AssetRecord, ImportedAssetInfo, Metadata, RemoteFile, TrackedFile};
pub use report::{BatchOutcome, ItemOutcome, ItemResult, UploadReport};
pub use types::{
    DEFAULT_MAX_CONCURRENT_TASKS, DependencyMode, FilePathMode, RemoteSyncStatus,
    StagingSettings, UploadMode, UploadStatus,
};
pub use upload::{AssetUpdate, CreateAssetRequest, UploadAsset, UploadFile};
