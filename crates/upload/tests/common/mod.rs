//! Shared fixtures for the upload integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use assetstage_protocol::{
    AssetIdentifier, AssetRecord, AssetUpdate, ContentId, ContentIdentifier, CreateAssetRequest,
    Metadata, ProjectRef, RemoteFile, RemoteSyncStatus, UploadAsset, UploadFile, UploadStatus,
};
use assetstage_staging::{ContentRepository, LocalProjectIndex, RepoFuture, RepositoryError};
use tokio_util::sync::CancellationToken;

pub fn project() -> ProjectRef {
    ProjectRef::new("org", "proj")
}

/// Repository mock that records every call as a readable line.
#[derive(Default)]
pub struct RecordingRepository {
    calls: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
    fail_on: Mutex<Option<(String, String)>>,
    fail_rollback: bool,
    cancel_on_create: Mutex<Option<(usize, CancellationToken)>>,
    creates: Mutex<usize>,
    remote_files: Mutex<HashMap<String, Vec<String>>>,
}

impl RecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails `operation` when its target (name, asset id or path) equals `target`.
    pub fn fail_on(self, operation: &str, target: &str) -> Self {
        *self.fail_on.lock().unwrap() = Some((operation.into(), target.into()));
        self
    }

    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    /// Cancels `token` while serving the `nth` create (1-based).
    pub fn cancel_on_create(self, nth: usize, token: CancellationToken) -> Self {
        *self.cancel_on_create.lock().unwrap() = Some((nth, token));
        self
    }

    /// Files the record `asset_id` reports on fetch.
    pub fn with_remote_files(self, asset_id: &str, paths: &[&str]) -> Self {
        self.remote_files.lock().unwrap().insert(
            asset_id.into(),
            paths.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation} ");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    fn record(&self, operation: &str, target: &str, detail: &str) -> Result<(), RepositoryError> {
        let line = if detail.is_empty() {
            format!("{operation} {target}")
        } else {
            format!("{operation} {target} {detail}")
        };
        self.calls.lock().unwrap().push(line);

        let rollback = operation == "remove_item" || operation == "remove_unfrozen_version";
        if rollback && self.fail_rollback {
            return Err(RepositoryError::Communication("rollback refused".into()));
        }
        if let Some((op, t)) = self.fail_on.lock().unwrap().as_ref() {
            if op == operation && (t == target || t == detail) {
                return Err(RepositoryError::Communication("injected failure".into()));
            }
        }
        Ok(())
    }
}

fn version_of(id: &AssetIdentifier) -> u32 {
    id.version.parse().unwrap_or(0)
}

impl ContentRepository for RecordingRepository {
    fn create_item<'a>(&'a self, request: &'a CreateAssetRequest) -> RepoFuture<'a, AssetIdentifier> {
        Box::pin(async move {
            self.record("create_item", &request.name, "")?;
            let created = {
                let mut creates = self.creates.lock().unwrap();
                *creates += 1;
                *creates
            };
            if let Some((nth, token)) = self.cancel_on_create.lock().unwrap().as_ref() {
                if *nth == created {
                    token.cancel();
                }
            }
            let id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                *next
            };
            Ok(AssetIdentifier::new(&request.project, format!("new-{id}"), "1"))
        })
    }

    fn create_unfrozen_version<'a>(
        &'a self,
        existing: &'a AssetIdentifier,
    ) -> RepoFuture<'a, AssetIdentifier> {
        Box::pin(async move {
            self.record("create_unfrozen_version", &existing.asset_id, "")?;
            Ok(existing.with_version((version_of(existing) + 1).to_string()))
        })
    }

    fn update_item<'a>(&'a self, id: &'a AssetIdentifier, update: &'a AssetUpdate) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.record("update_item", &id.asset_id, &update.name) })
    }

    fn upload_file<'a>(&'a self, id: &'a AssetIdentifier, file: &'a UploadFile) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.record("upload_file", &id.asset_id, &file.destination) })
    }

    fn remove_file<'a>(&'a self, id: &'a AssetIdentifier, path: &'a str) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.record("remove_file", &id.asset_id, path) })
    }

    fn update_dependencies<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dependencies: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let deps: Vec<String> = dependencies.iter().map(|d| d.to_string()).collect();
            self.record("update_dependencies", &id.asset_id, &format!("[{}]", deps.join(",")))
        })
    }

    fn freeze_version<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, u32> {
        Box::pin(async move {
            self.record("freeze_version", &id.asset_id, "")?;
            Ok(version_of(id))
        })
    }

    fn remove_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.record("remove_item", &id.asset_id, "") })
    }

    fn remove_unfrozen_version<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, ()> {
        Box::pin(async move { self.record("remove_unfrozen_version", &id.asset_id, &id.version) })
    }

    fn fetch_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, AssetRecord> {
        Box::pin(async move {
            self.record("fetch_item", &id.asset_id, "")?;
            let files = self
                .remote_files
                .lock()
                .unwrap()
                .get(&id.asset_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|path| RemoteFile {
                    path,
                    checksum: None,
                    size: 0,
                })
                .collect();
            Ok(AssetRecord {
                identifier: id.clone(),
                name: id.asset_id.clone(),
                frozen: false,
                source_controlled: false,
                version_number: version_of(id),
                files,
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
            Ok(ids
                .iter()
                .map(|id| (id.clone(), RemoteSyncStatus::UpToDate))
                .collect())
        })
    }
}

/// Writes `<dir>/<id>.asset` and returns an upload projection for it.
pub fn upload_asset(dir: &Path, id: &str, status: UploadStatus, deps: &[&str]) -> UploadAsset {
    let source = dir.join(format!("{id}.asset"));
    std::fs::write(&source, format!("content of {id}")).unwrap();
    UploadAsset {
        name: id.to_uppercase(),
        identifier: ContentIdentifier::local(&project(), &ContentId::new(id)),
        status,
        existing: None,
        files: vec![UploadFile {
            source,
            destination: format!("{id}.asset"),
            size: 12,
        }],
        tags: vec!["props".into()],
        dependencies: deps
            .iter()
            .map(|d| ContentIdentifier::local(&project(), &ContentId::new(*d)))
            .collect(),
        dependency_content_ids: deps.iter().map(|d| ContentId::new(*d)).collect(),
        metadata: Metadata::new(),
        diff_summary: String::new(),
        target_project: project(),
        target_collection: None,
    }
}

/// Project index over a directory: `<root>/Assets/<id>.asset` per asset.
pub struct DirIndex {
    root: PathBuf,
    deps: HashMap<ContentId, Vec<ContentId>>,
}

impl DirIndex {
    pub fn new(root: &Path) -> Self {
        std::fs::create_dir_all(root.join("Assets")).unwrap();
        Self {
            root: root.to_path_buf(),
            deps: HashMap::new(),
        }
    }

    pub fn asset(mut self, id: &str, deps: &[&str]) -> Self {
        std::fs::write(self.path_of(id), format!("content of {id}")).unwrap();
        self.deps.insert(
            ContentId::new(id),
            deps.iter().map(|d| ContentId::new(*d)).collect(),
        );
        self
    }

    pub fn path_of(&self, id: &str) -> PathBuf {
        self.root.join("Assets").join(format!("{id}.asset"))
    }
}

impl LocalProjectIndex for DirIndex {
    fn project_root(&self) -> &Path {
        &self.root
    }

    fn id_to_path(&self, id: &ContentId) -> Option<PathBuf> {
        self.deps.contains_key(id).then(|| self.path_of(id.as_str()))
    }

    fn path_to_id(&self, path: &Path) -> Option<ContentId> {
        let stem = path.file_stem()?.to_string_lossy().into_owned();
        let id = ContentId::new(stem);
        self.deps.contains_key(&id).then_some(id)
    }

    fn list_container_contents(&self, _id: &ContentId) -> Option<Vec<ContentId>> {
        None
    }

    fn list_dependencies(&self, id: &ContentId, _recursive: bool) -> Vec<ContentId> {
        self.deps.get(id).cloned().unwrap_or_default()
    }
}
