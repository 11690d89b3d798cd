//! Project index backed by a JSON manifest.
//!
//! ```json
//! {
//!   "assets": [
//!     { "id": "hero", "path": "Assets/Hero.prefab", "dependencies": ["mat"] },
//!     { "id": "mat", "path": "Assets/Hero.mat", "extraFiles": ["Assets/Hero.mat.meta"] },
//!     { "id": "chars", "path": "Assets/Characters", "contents": ["hero"] }
//!   ],
//!   "satellites": ["Scripts/Hero.cs"]
//! }
//! ```
//!
//! Paths are relative to the project root.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use assetstage_protocol::{AssetIdentifier, ContentId};
use assetstage_staging::LocalProjectIndex;
use assetstage_transfer::normalize_path_key;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: ContentId,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ContentId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_files: Vec<PathBuf>,
    /// Present only on containers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<Vec<ContentId>>,
    /// Remote record this item was imported from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<AssetIdentifier>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub assets: Vec<ManifestEntry>,
    #[serde(default)]
    pub satellites: Vec<PathBuf>,
}

/// [`LocalProjectIndex`] over a parsed [`Manifest`].
#[derive(Debug)]
pub struct ManifestIndex {
    root: PathBuf,
    entries: HashMap<ContentId, ManifestEntry>,
    by_path: HashMap<String, ContentId>,
    satellites: Vec<PathBuf>,
}

impl ManifestIndex {
    pub fn new(root: impl Into<PathBuf>, manifest: Manifest) -> Self {
        let root = root.into();
        let mut entries = HashMap::new();
        let mut by_path = HashMap::new();
        for entry in manifest.assets {
            by_path.insert(normalize_path_key(&root.join(&entry.path)), entry.id.clone());
            if let Some(previous) = entries.insert(entry.id.clone(), entry) {
                tracing::warn!(id = %previous.id, "duplicate manifest entry, keeping the last one");
            }
        }
        let satellites = manifest.satellites.iter().map(|p| root.join(p)).collect();
        Self {
            root,
            entries,
            by_path,
            satellites,
        }
    }

    /// Reads the manifest at `path`.
    pub fn load(root: impl Into<PathBuf>, path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("invalid manifest {}", path.display()))?;
        let index = Self::new(root, manifest);
        tracing::debug!(path = %path.display(), assets = index.entries.len(), "manifest loaded");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalProjectIndex for ManifestIndex {
    fn project_root(&self) -> &Path {
        &self.root
    }

    fn id_to_path(&self, id: &ContentId) -> Option<PathBuf> {
        self.entries.get(id).map(|e| self.root.join(&e.path))
    }

    fn path_to_id(&self, path: &Path) -> Option<ContentId> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        self.by_path.get(&normalize_path_key(&absolute)).cloned()
    }

    fn display_name(&self, id: &ContentId) -> Option<String> {
        let entry = self.entries.get(id)?;
        entry.name.clone().or_else(|| {
            entry
                .path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
    }

    fn list_container_contents(&self, id: &ContentId) -> Option<Vec<ContentId>> {
        self.entries.get(id)?.contents.clone()
    }

    fn list_dependencies(&self, id: &ContentId, recursive: bool) -> Vec<ContentId> {
        let Some(entry) = self.entries.get(id) else {
            return Vec::new();
        };
        if !recursive {
            return entry.dependencies.clone();
        }

        let mut out = Vec::new();
        let mut seen = HashSet::from([id.clone()]);
        let mut stack: Vec<&ContentId> = entry.dependencies.iter().rev().collect();
        while let Some(dep) = stack.pop() {
            if !seen.insert(dep.clone()) {
                continue;
            }
            out.push(dep.clone());
            if let Some(next) = self.entries.get(dep) {
                stack.extend(next.dependencies.iter().rev());
            }
        }
        out
    }

    fn extra_files(&self, id: &ContentId) -> Vec<PathBuf> {
        self.entries
            .get(id)
            .map(|e| e.extra_files.iter().map(|p| self.root.join(p)).collect())
            .unwrap_or_default()
    }

    fn list_satellite_files(&self) -> Vec<PathBuf> {
        self.satellites.clone()
    }

    fn remote_identity(&self, id: &ContentId) -> Option<AssetIdentifier> {
        self.entries.get(id)?.remote.clone()
    }
}
