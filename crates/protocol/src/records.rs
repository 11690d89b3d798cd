//! Remote records and the locally tracked import baselines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AssetIdentifier, ContentId, ProjectRef};

/// Free-form metadata attached to a record.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A file stored in a remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// A record version as returned by the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub identifier: AssetIdentifier,
    pub name: String,
    /// Frozen versions are immutable.
    #[serde(default)]
    pub frozen: bool,
    /// The record's files are owned by external source control.
    #[serde(default)]
    pub source_controlled: bool,
    #[serde(default)]
    pub version_number: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<RemoteFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<AssetIdentifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

/// A file as it was when the asset was last uploaded or imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    /// Case-insensitive normalized key of the local source path.
    pub path: String,
    pub checksum: String,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
}

/// Baseline of a record that is currently imported into the local project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedAssetInfo {
    pub identifier: AssetIdentifier,
    pub content_id: ContentId,
    #[serde(default)]
    pub version_number: u32,
    #[serde(default)]
    pub files: Vec<TrackedFile>,
    /// Final remote identifiers of the dependencies at import time.
    #[serde(default)]
    pub dependencies: Vec<AssetIdentifier>,
    /// Local content ids of the dependencies at import time.
    #[serde(default)]
    pub dependency_content_ids: Vec<ContentId>,
    pub imported_at: DateTime<Utc>,
}

impl ImportedAssetInfo {
    pub fn project(&self) -> ProjectRef {
        self.identifier.project()
    }

    pub fn tracked_file(&self, path_key: &str) -> Option<&TrackedFile> {
        self.files.iter().find(|f| f.path == path_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_omits_empty_collections() {
        let record = AssetRecord {
            identifier: AssetIdentifier::new(&ProjectRef::new("o", "p"), "a", "1"),
            name: "Crate".into(),
            frozen: true,
            source_controlled: false,
            version_number: 1,
            files: vec![],
            dependencies: vec![],
            tags: vec![],
            metadata: Metadata::new(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("files"));
        assert!(!json.contains("dependencies"));
        assert!(!json.contains("metadata"));
        let parsed: AssetRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn tracked_file_lookup() {
        let info = ImportedAssetInfo {
            identifier: AssetIdentifier::new(&ProjectRef::new("o", "p"), "a", "1"),
            content_id: ContentId::new("c"),
            version_number: 1,
            files: vec![TrackedFile {
                path: "assets/crate.png".into(),
                checksum: "abc".into(),
                modified: Utc::now(),
                size: 3,
            }],
            dependencies: vec![],
            dependency_content_ids: vec![],
            imported_at: Utc::now(),
        };
        assert!(info.tracked_file("assets/crate.png").is_some());
        assert!(info.tracked_file("assets/other.png").is_none());
        assert_eq!(info.project(), ProjectRef::new("o", "p"));
    }
}
