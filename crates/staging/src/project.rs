//! Local project index trait.

use std::path::{Path, PathBuf};

use assetstage_protocol::{AssetIdentifier, ContentId};

/// Read-only view of the local project the host manages.
///
/// Lookups are synchronous; graph construction runs them on a blocking
/// thread.
pub trait LocalProjectIndex: Send + Sync {
    /// Absolute root of the managed project.
    fn project_root(&self) -> &Path;

    /// Absolute path of the item's main file, `None` if the id is unknown.
    fn id_to_path(&self, id: &ContentId) -> Option<PathBuf>;

    fn path_to_id(&self, path: &Path) -> Option<ContentId>;

    /// Human-readable name, defaults to the file stem.
    fn display_name(&self, id: &ContentId) -> Option<String> {
        self.id_to_path(id).and_then(|p| {
            p.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
    }

    /// Children of a container item, `None` if `id` is not a container.
    fn list_container_contents(&self, id: &ContentId) -> Option<Vec<ContentId>>;

    /// Direct (or, with `recursive`, transitive) dependencies of an item, in order.
    fn list_dependencies(&self, id: &ContentId, recursive: bool) -> Vec<ContentId>;

    /// Additional files that travel with an item when the user opts in.
    fn extra_files(&self, _id: &ContentId) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Project-wide satellite file set (e.g. code files) for embedded staging.
    fn list_satellite_files(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// Remote record persisted on the local item, if any.
    fn remote_identity(&self, _id: &ContentId) -> Option<AssetIdentifier> {
        None
    }

    fn file_size(&self, path: &Path) -> u64 {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}
