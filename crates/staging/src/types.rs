//! Data types for the staging flow.

use std::collections::BTreeSet;

use assetstage_protocol::{ContentId, Metadata, ProjectRef};
use serde::{Deserialize, Serialize};

/// Metadata values the user set for one asset in one target project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOverride {
    pub content_id: ContentId,
    pub project: ProjectRef,
    pub values: Metadata,
}

/// User-level edits on top of the generated graph.
///
/// Keyed by content id so they can be replayed onto a freshly rebuilt
/// node set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingEdits {
    /// Root selection, in the order the user picked it.
    #[serde(default)]
    pub selected: Vec<ContentId>,
    /// Dependencies the user excluded from upload.
    #[serde(default)]
    pub ignored: BTreeSet<ContentId>,
    #[serde(default)]
    pub include_extra_files: BTreeSet<ContentId>,
    #[serde(default)]
    pub metadata_overrides: Vec<MetadataOverride>,
}

impl StagingEdits {
    /// Adds a root; returns `false` if it was already selected.
    pub fn select(&mut self, id: ContentId) -> bool {
        if self.selected.contains(&id) {
            return false;
        }
        self.selected.push(id);
        true
    }

    /// Removes a root; returns `false` if it was not selected.
    pub fn deselect(&mut self, id: &ContentId) -> bool {
        let before = self.selected.len();
        self.selected.retain(|s| s != id);
        self.selected.len() != before
    }

    pub fn is_selected(&self, id: &ContentId) -> bool {
        self.selected.contains(id)
    }

    /// Returns `true` if the flag actually changed.
    pub fn set_ignored(&mut self, id: &ContentId, ignored: bool) -> bool {
        if ignored {
            self.ignored.insert(id.clone())
        } else {
            self.ignored.remove(id)
        }
    }

    pub fn is_ignored(&self, id: &ContentId) -> bool {
        self.ignored.contains(id)
    }

    /// Returns `true` if the flag actually changed.
    pub fn set_include_extra_files(&mut self, id: &ContentId, include: bool) -> bool {
        if include {
            self.include_extra_files.insert(id.clone())
        } else {
            self.include_extra_files.remove(id)
        }
    }

    pub fn includes_extra_files(&self, id: &ContentId) -> bool {
        self.include_extra_files.contains(id)
    }

    pub fn set_metadata(
        &mut self,
        id: &ContentId,
        project: &ProjectRef,
        key: impl Into<String>,
        value: serde_json::Value,
    ) {
        let key = key.into();
        if let Some(entry) = self
            .metadata_overrides
            .iter_mut()
            .find(|o| &o.content_id == id && &o.project == project)
        {
            entry.values.insert(key, value);
            return;
        }

        let mut values = Metadata::new();
        values.insert(key, value);
        self.metadata_overrides.push(MetadataOverride {
            content_id: id.clone(),
            project: project.clone(),
            values,
        });
    }

    /// Removes one override; returns `true` if it existed.
    pub fn clear_metadata(&mut self, id: &ContentId, project: &ProjectRef, key: &str) -> bool {
        let mut removed = false;
        for entry in self
            .metadata_overrides
            .iter_mut()
            .filter(|o| &o.content_id == id && &o.project == project)
        {
            removed |= entry.values.remove(key).is_some();
        }
        self.metadata_overrides.retain(|o| !o.values.is_empty());
        removed
    }

    /// Overrides for `id` in `project` (empty when none were set).
    pub fn metadata_for(&self, id: &ContentId, project: &ProjectRef) -> Metadata {
        self.metadata_overrides
            .iter()
            .find(|o| &o.content_id == id && &o.project == project)
            .map(|o| o.values.clone())
            .unwrap_or_default()
    }
}

/// Aggregate snapshot of the staged selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingStatus {
    pub total: usize,
    /// Ready assets that create a new record (Add or Duplicate).
    pub added: usize,
    /// Ready assets that create a new version (Override).
    pub updated: usize,
    pub skipped: usize,
    pub ignored: usize,
    pub manually_ignored_dependencies: usize,
    pub errors: usize,
    pub ready: usize,
    pub has_files_outside_project: bool,
    /// Files of the ready assets.
    pub total_files: usize,
    /// Bytes of the ready assets.
    pub total_size: u64,
}

impl StagingStatus {
    pub fn can_upload(&self) -> bool {
        self.ready > 0
    }
}

/// Change notification emitted by the coordinator.
#[derive(Debug, Clone)]
pub enum StagingEvent {
    /// The graph was rebuilt.
    Regenerated { nodes: usize },
    /// Self-status evaluation progress.
    Progress { completed: usize, total: usize },
    /// The aggregate status changed.
    StatusChanged(StagingStatus),
}
