//! Execution-time projections of staged assets.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ids::{AssetIdentifier, ContentId, ContentIdentifier, ProjectRef};
use crate::records::Metadata;
use crate::types::UploadStatus;

/// A local file and where it lands inside the remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFile {
    pub source: PathBuf,
    /// Forward-slash path relative to the record root.
    pub destination: String,
    #[serde(default)]
    pub size: u64,
}

/// Immutable snapshot of one asset to upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAsset {
    pub name: String,
    pub identifier: ContentIdentifier,
    pub status: UploadStatus,
    /// Existing record that receives a new version (Override only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<AssetIdentifier>,
    pub files: Vec<UploadFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// `Local` entries point at other assets of the same batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ContentIdentifier>,
    /// Local ids of every dependency, including remotely linked ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_content_ids: Vec<ContentId>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub diff_summary: String,
    pub target_project: ProjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_collection: Option<String>,
}

impl UploadAsset {
    /// Local content id of this asset.
    ///
    /// Projections are always built from local nodes, so a remote
    /// identifier here has no content id.
    pub fn content_id(&self) -> Option<&ContentId> {
        self.identifier.content_id()
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Content ids of the batch-local dependencies.
    pub fn local_dependencies(&self) -> impl Iterator<Item = &ContentId> {
        self.dependencies.iter().filter_map(ContentIdentifier::content_id)
    }
}

/// Request to create a brand new record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetRequest {
    pub project: ProjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Name, tags and metadata pushed onto an unfrozen version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpdate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
}
