use serde::{Deserialize, Serialize};

use crate::ids::ProjectRef;

/// Default bound on concurrently running per-asset tasks.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 8;

/// Upload decision for a staged asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Not evaluated yet (freshly generated node).
    #[default]
    Pending,
    /// No usable remote counterpart: a new record will be created.
    Add,
    /// Identical to the tracked remote version; nothing to upload.
    Skip,
    /// A new version of the existing remote record will be created.
    Override,
    /// A new record will be created even though a counterpart exists.
    Duplicate,
    /// At least one file lies outside the managed project root.
    ErrorOutsideProject,
    /// The counterpart's files are managed by external source control.
    SourceControlled,
}

impl UploadStatus {
    /// Statuses that produce remote work.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Add | Self::Override | Self::Duplicate)
    }

    /// Terminal per-node error statuses.
    pub fn is_error(self) -> bool {
        matches!(self, Self::ErrorOutsideProject | Self::SourceControlled)
    }

    /// Statuses that end in a brand new remote record.
    pub fn creates_record(self) -> bool {
        matches!(self, Self::Add | Self::Duplicate)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Add => "add",
            Self::Skip => "skip",
            Self::Override => "override",
            Self::Duplicate => "duplicate",
            Self::ErrorOutsideProject => "outside project",
            Self::SourceControlled => "source controlled",
        }
    }
}

/// How an asset with an existing counterpart is uploaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    /// Upload a new version only when something changed.
    #[default]
    SkipIdentical,
    /// Always upload a new version of the counterpart.
    ForceNewVersion,
    /// Always create a new record.
    ForceNewAsset,
}

/// How dependencies of a selected item are staged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyMode {
    /// Dependencies are not traversed.
    Ignore,
    /// Every dependency becomes its own asset, linked by id.
    #[default]
    Separate,
    /// Dependency files are folded into the asset that references them.
    Embedded,
}

/// How destination paths inside a remote record are derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePathMode {
    /// Path relative to the project root.
    Full,
    /// Path relative to the deepest directory shared by all files.
    #[default]
    Compact,
    /// Every file at the asset root; colliding names are renamed.
    Flatten,
}

/// Result of checking an imported record against the repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemoteSyncStatus {
    UpToDate,
    OutOfDate {
        latest_version: String,
    },
    /// The record no longer exists remotely.
    Deleted,
    #[default]
    Unknown,
}

/// Immutable settings snapshot for one staging generation.
///
/// Any change produces a new snapshot and a full regeneration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingSettings {
    #[serde(default)]
    pub target_project: ProjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_collection: Option<String>,
    #[serde(default)]
    pub upload_mode: UploadMode,
    #[serde(default)]
    pub dependency_mode: DependencyMode,
    #[serde(default)]
    pub file_path_mode: FilePathMode,
    /// Embedded mode only: fold the shared satellite file set into every asset.
    #[serde(default)]
    pub include_satellite_files: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

fn default_max_concurrent_tasks() -> usize {
    DEFAULT_MAX_CONCURRENT_TASKS
}

impl Default for StagingSettings {
    fn default() -> Self {
        Self {
            target_project: ProjectRef::default(),
            target_collection: None,
            upload_mode: UploadMode::default(),
            dependency_mode: DependencyMode::default(),
            file_path_mode: FilePathMode::default(),
            include_satellite_files: false,
            tags: Vec::new(),
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
        }
    }
}

impl StagingSettings {
    pub fn for_project(project: ProjectRef) -> Self {
        Self {
            target_project: project,
            ..Self::default()
        }
    }

    /// Concurrency bound, never zero.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_tasks.max(1)
    }
}
