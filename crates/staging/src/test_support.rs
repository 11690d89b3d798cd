//! Mock collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use assetstage_protocol::{
    AssetIdentifier, AssetRecord, AssetUpdate, ContentId, CreateAssetRequest, ImportedAssetInfo,
    Metadata, ProjectRef, RemoteSyncStatus, TrackedFile, UploadFile,
};
use assetstage_transfer::{FileState, normalize_path_key};
use chrono::{DateTime, Utc};

use crate::compare::{CompareFuture, FileComparator, FileComparison};
use crate::error::{RepositoryError, StagingError};
use crate::project::LocalProjectIndex;
use crate::repository::{ContentRepository, RepoFuture};

pub(crate) fn project() -> ProjectRef {
    ProjectRef::new("org", "proj")
}

/// Main file path of a mock asset.
pub(crate) fn asset_path(content: &str) -> PathBuf {
    PathBuf::from(format!("/proj/Assets/{content}.asset"))
}

/// Remote identifier the fixtures use for a content id: asset `r<id>` at version 1.
pub(crate) fn remote_of(content: &str) -> AssetIdentifier {
    AssetIdentifier::new(&project(), format!("r{content}"), "1")
}

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(0, 0).unwrap()
}

/// Baseline of `content` imported as `asset@version`, depending on `deps`.
pub(crate) fn imported(content: &str, asset: &str, version: &str, deps: &[&str]) -> ImportedAssetInfo {
    ImportedAssetInfo {
        identifier: AssetIdentifier::new(&project(), asset, version),
        content_id: ContentId::new(content),
        version_number: version.parse().unwrap_or(0),
        files: vec![TrackedFile {
            path: normalize_path_key(&asset_path(content)),
            checksum: "baseline".into(),
            modified: epoch(),
            size: 0,
        }],
        dependencies: deps.iter().map(|d| remote_of(d)).collect(),
        dependency_content_ids: deps.iter().map(|d| ContentId::new(*d)).collect(),
        imported_at: Utc::now(),
    }
}

#[derive(Debug)]
pub(crate) struct MockIndex {
    root: PathBuf,
    paths: HashMap<ContentId, PathBuf>,
    deps: HashMap<ContentId, Vec<ContentId>>,
    containers: HashMap<ContentId, Vec<ContentId>>,
    extras: HashMap<ContentId, Vec<PathBuf>>,
    satellites: Vec<PathBuf>,
    satellite_calls: AtomicUsize,
    remotes: HashMap<ContentId, AssetIdentifier>,
}

impl MockIndex {
    pub(crate) fn new() -> Self {
        Self {
            root: PathBuf::from("/proj"),
            paths: HashMap::new(),
            deps: HashMap::new(),
            containers: HashMap::new(),
            extras: HashMap::new(),
            satellites: Vec::new(),
            satellite_calls: AtomicUsize::new(0),
            remotes: HashMap::new(),
        }
    }

    pub(crate) fn asset(mut self, id: &str, deps: &[&str]) -> Self {
        let id = ContentId::new(id);
        self.paths.insert(id.clone(), asset_path(id.as_str()));
        self.deps
            .insert(id, deps.iter().map(|d| ContentId::new(*d)).collect());
        self
    }

    /// Moves the main file of `id` to `path`.
    pub(crate) fn file(mut self, id: &str, path: &str) -> Self {
        self.paths.insert(ContentId::new(id), PathBuf::from(path));
        self
    }

    pub(crate) fn container(mut self, id: &str, children: &[&str]) -> Self {
        let id = ContentId::new(id);
        self.paths
            .insert(id.clone(), PathBuf::from(format!("/proj/Assets/{id}")));
        self.containers
            .insert(id, children.iter().map(|c| ContentId::new(*c)).collect());
        self
    }

    pub(crate) fn extra(mut self, id: &str, path: &str) -> Self {
        self.extras
            .entry(ContentId::new(id))
            .or_default()
            .push(PathBuf::from(path));
        self
    }

    pub(crate) fn satellite(mut self, path: &str) -> Self {
        self.satellites.push(PathBuf::from(path));
        self
    }

    pub(crate) fn remote(mut self, id: &str, identifier: AssetIdentifier) -> Self {
        self.remotes.insert(ContentId::new(id), identifier);
        self
    }

    /// Number of times the satellite set was listed.
    pub(crate) fn satellite_calls(&self) -> usize {
        self.satellite_calls.load(Ordering::SeqCst)
    }

    fn collect_recursive(&self, id: &ContentId, seen: &mut HashSet<ContentId>, out: &mut Vec<ContentId>) {
        for dep in self.deps.get(id).into_iter().flatten() {
            if seen.insert(dep.clone()) {
                out.push(dep.clone());
                self.collect_recursive(dep, seen, out);
            }
        }
    }
}

impl LocalProjectIndex for MockIndex {
    fn project_root(&self) -> &Path {
        &self.root
    }

    fn id_to_path(&self, id: &ContentId) -> Option<PathBuf> {
        self.paths.get(id).cloned()
    }

    fn path_to_id(&self, path: &Path) -> Option<ContentId> {
        let key = normalize_path_key(path);
        self.paths
            .iter()
            .find(|(_, p)| normalize_path_key(p) == key)
            .map(|(id, _)| id.clone())
    }

    fn list_container_contents(&self, id: &ContentId) -> Option<Vec<ContentId>> {
        self.containers.get(id).cloned()
    }

    fn list_dependencies(&self, id: &ContentId, recursive: bool) -> Vec<ContentId> {
        if !recursive {
            return self.deps.get(id).cloned().unwrap_or_default();
        }
        let mut seen = HashSet::from([id.clone()]);
        let mut out = Vec::new();
        self.collect_recursive(id, &mut seen, &mut out);
        out
    }

    fn extra_files(&self, id: &ContentId) -> Vec<PathBuf> {
        self.extras.get(id).cloned().unwrap_or_default()
    }

    fn list_satellite_files(&self) -> Vec<PathBuf> {
        self.satellite_calls.fetch_add(1, Ordering::SeqCst);
        self.satellites.clone()
    }

    fn remote_identity(&self, id: &ContentId) -> Option<AssetIdentifier> {
        self.remotes.get(id).cloned()
    }

    fn file_size(&self, _path: &Path) -> u64 {
        4
    }
}

/// Comparator answering from fixed sets of changed and unreadable paths.
#[derive(Debug, Default)]
pub(crate) struct MockComparator {
    changed: Mutex<HashSet<String>>,
    failing: HashSet<String>,
}

impl MockComparator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mut self, path: &Path) -> Self {
        self.failing.insert(normalize_path_key(path));
        self
    }

    pub(crate) fn mark_changed(&self, path: &Path) {
        self.changed.lock().unwrap().insert(normalize_path_key(path));
    }
}

impl FileComparator for MockComparator {
    fn compare<'a>(
        &'a self,
        baseline: Option<&'a TrackedFile>,
        path: &'a Path,
    ) -> CompareFuture<'a, FileComparison> {
        Box::pin(async move {
            let state = self.snapshot(path).await?;
            let changed =
                baseline.is_none() || self.changed.lock().unwrap().contains(&normalize_path_key(path));
            Ok(FileComparison { changed, state })
        })
    }

    fn snapshot<'a>(&'a self, path: &'a Path) -> CompareFuture<'a, FileState> {
        Box::pin(async move {
            let key = normalize_path_key(path);
            if self.failing.contains(&key) {
                return Err(StagingError::Comparison {
                    path: key,
                    message: "permission denied".into(),
                });
            }
            Ok(FileState {
                size: 0,
                modified: epoch(),
                checksum: Some("baseline".into()),
            })
        })
    }
}

/// Read-only repository for status checks.
#[derive(Debug, Default)]
pub(crate) struct MockRepository {
    source_controlled: HashSet<String>,
    sync: HashMap<String, RemoteSyncStatus>,
    status_unavailable: bool,
    pub(crate) status_calls: Mutex<usize>,
}

impl MockRepository {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn source_controlled(mut self, asset_id: &str) -> Self {
        self.source_controlled.insert(asset_id.to_string());
        self
    }

    pub(crate) fn sync(mut self, asset_id: &str, status: RemoteSyncStatus) -> Self {
        self.sync.insert(asset_id.to_string(), status);
        self
    }

    pub(crate) fn status_unavailable(mut self) -> Self {
        self.status_unavailable = true;
        self
    }
}

fn unsupported<'a, T: Send + 'a>() -> RepoFuture<'a, T> {
    Box::pin(async { Err(RepositoryError::Rejected("read-only mock".into())) })
}

impl ContentRepository for MockRepository {
    fn create_item<'a>(&'a self, _request: &'a CreateAssetRequest) -> RepoFuture<'a, AssetIdentifier> {
        unsupported()
    }

    fn create_unfrozen_version<'a>(
        &'a self,
        _existing: &'a AssetIdentifier,
    ) -> RepoFuture<'a, AssetIdentifier> {
        unsupported()
    }

    fn update_item<'a>(&'a self, _id: &'a AssetIdentifier, _update: &'a AssetUpdate) -> RepoFuture<'a, ()> {
        unsupported()
    }

    fn upload_file<'a>(&'a self, _id: &'a AssetIdentifier, _file: &'a UploadFile) -> RepoFuture<'a, ()> {
        unsupported()
    }

    fn remove_file<'a>(&'a self, _id: &'a AssetIdentifier, _path: &'a str) -> RepoFuture<'a, ()> {
        unsupported()
    }

    fn update_dependencies<'a>(
        &'a self,
        _id: &'a AssetIdentifier,
        _dependencies: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, ()> {
        unsupported()
    }

    fn freeze_version<'a>(&'a self, _id: &'a AssetIdentifier) -> RepoFuture<'a, u32> {
        unsupported()
    }

    fn remove_item<'a>(&'a self, _id: &'a AssetIdentifier) -> RepoFuture<'a, ()> {
        unsupported()
    }

    fn remove_unfrozen_version<'a>(&'a self, _id: &'a AssetIdentifier) -> RepoFuture<'a, ()> {
        unsupported()
    }

    fn fetch_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, AssetRecord> {
        Box::pin(async move {
            Ok(AssetRecord {
                identifier: id.clone(),
                name: id.asset_id.clone(),
                frozen: true,
                source_controlled: self.source_controlled.contains(&id.asset_id),
                version_number: 1,
                files: vec![],
                dependencies: vec![],
                tags: vec![],
                metadata: Metadata::new(),
            })
        })
    }

    fn fetch_import_status<'a>(
        &'a self,
        ids: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, HashMap<AssetIdentifier, RemoteSyncStatus>> {
        Box::pin(async move {
            *self.status_calls.lock().unwrap() += 1;
            if self.status_unavailable {
                return Err(RepositoryError::Communication("connection reset".into()));
            }
            Ok(ids
                .iter()
                .map(|id| {
                    let status = self
                        .sync
                        .get(&id.asset_id)
                        .cloned()
                        .unwrap_or(RemoteSyncStatus::UpToDate);
                    (id.clone(), status)
                })
                .collect())
        })
    }
}
