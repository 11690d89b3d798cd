//! Baselines of records currently imported into the local project.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use assetstage_protocol::{AssetIdentifier, ContentId, ImportedAssetInfo, ProjectRef};

use crate::error::StagingError;

/// Read/write access to the "currently imported" baseline per record.
pub trait ImportedAssetTracker: Send + Sync {
    /// Baseline of the record, whatever version was imported.
    fn get(&self, asset: &AssetIdentifier) -> Option<ImportedAssetInfo>;

    /// Baseline imported for a local content item within `project`.
    fn find_by_content(&self, content_id: &ContentId, project: &ProjectRef)
    -> Option<ImportedAssetInfo>;

    /// Records `info` as the new baseline of its record.
    fn track(&self, info: ImportedAssetInfo) -> Result<(), StagingError>;

    fn untrack(&self, asset: &AssetIdentifier) -> Option<ImportedAssetInfo>;
}

fn record_key(id: &AssetIdentifier) -> String {
    format!("{}/{}/{}", id.organization_id, id.project_id, id.asset_id)
}

/// In-memory tracker with JSON persistence.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    entries: RwLock<HashMap<String, ImportedAssetInfo>>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // Every write is a single map operation, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ImportedAssetInfo>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ImportedAssetInfo>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads baselines from a JSON file; a missing file yields an empty tracker.
    pub fn load(path: &Path) -> Result<Self, StagingError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let infos: Vec<ImportedAssetInfo> = serde_json::from_str(&content)?;
        let tracker = Self::new();
        {
            let mut entries = tracker.write();
            for info in infos {
                entries.insert(record_key(&info.identifier), info);
            }
        }
        Ok(tracker)
    }

    /// Writes every baseline to `path` as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), StagingError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut infos = self.all();
        infos.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        let json = serde_json::to_string_pretty(&infos)?;
        std::fs::write(path, json)?;
        tracing::debug!(path = %path.display(), count = infos.len(), "import baselines saved");
        Ok(())
    }

    pub fn all(&self) -> Vec<ImportedAssetInfo> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ImportedAssetTracker for MemoryTracker {
    fn get(&self, asset: &AssetIdentifier) -> Option<ImportedAssetInfo> {
        self.read().get(&record_key(asset)).cloned()
    }

    fn find_by_content(
        &self,
        content_id: &ContentId,
        project: &ProjectRef,
    ) -> Option<ImportedAssetInfo> {
        self.read()
            .values()
            .filter(|info| &info.content_id == content_id && &info.project() == project)
            .max_by_key(|info| info.imported_at)
            .cloned()
    }

    fn track(&self, info: ImportedAssetInfo) -> Result<(), StagingError> {
        let mut entries = self.write();
        entries.insert(record_key(&info.identifier), info);
        Ok(())
    }

    fn untrack(&self, asset: &AssetIdentifier) -> Option<ImportedAssetInfo> {
        self.write().remove(&record_key(asset))
    }
}
