//! Content repository kept in a local directory.
//!
//! Layout: `<root>/<org>/<project>/<asset>/record.json` holds the record and
//! its versions; uploaded files live under `<root>/<org>/<project>/<asset>/<version>/`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use assetstage_protocol::{
    AssetIdentifier, AssetRecord, AssetUpdate, CreateAssetRequest, Metadata, ProjectRef,
    RemoteFile, RemoteSyncStatus, UploadFile,
};
use assetstage_staging::{ContentRepository, RepoFuture, RepositoryError};
use assetstage_transfer::{checksum_bytes, validate_destination_path};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const RECORD_FILE: &str = "record.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredVersion {
    frozen: bool,
    #[serde(default)]
    files: Vec<RemoteFile>,
    #[serde(default)]
    dependencies: Vec<AssetIdentifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    project: ProjectRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collection: Option<String>,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    source_controlled: bool,
    versions: BTreeMap<u32, StoredVersion>,
}

impl StoredRecord {
    fn latest(&self) -> Option<(u32, &StoredVersion)> {
        self.versions.iter().next_back().map(|(n, v)| (*n, v))
    }

    fn latest_frozen(&self) -> Option<u32> {
        self.versions
            .iter()
            .rev()
            .find(|(_, v)| v.frozen)
            .map(|(n, _)| *n)
    }

    fn unfrozen_mut(&mut self, id: &AssetIdentifier) -> Result<&mut StoredVersion, RepositoryError> {
        let number = version_number(id)?;
        let version = self
            .versions
            .get_mut(&number)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if version.frozen {
            return Err(RepositoryError::Rejected(format!("{id} is frozen")));
        }
        Ok(version)
    }
}

fn version_number(id: &AssetIdentifier) -> Result<u32, RepositoryError> {
    id.version
        .parse()
        .map_err(|_| RepositoryError::Rejected(format!("invalid version in {id}")))
}

fn io_error(e: std::io::Error) -> RepositoryError {
    RepositoryError::Communication(e.to_string())
}

async fn remove_if_exists(path: &Path, dir: bool) -> Result<(), RepositoryError> {
    let result = if dir {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    match result {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(io_error(e)),
        _ => Ok(()),
    }
}

/// [`ContentRepository`] storing records as JSON files under a directory.
#[derive(Debug)]
pub struct DirectoryRepository {
    root: PathBuf,
    /// Serializes read-modify-write cycles on record files.
    lock: Mutex<()>,
}

impl DirectoryRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lock: Mutex::new(()),
        }
    }

    fn record_dir(&self, project: &ProjectRef, asset_id: &str) -> PathBuf {
        self.root
            .join(&project.organization_id)
            .join(&project.project_id)
            .join(asset_id)
    }

    fn dir_of(&self, id: &AssetIdentifier) -> PathBuf {
        self.record_dir(&id.project(), &id.asset_id)
    }

    fn blob_path(&self, id: &AssetIdentifier, version: u32, path: &str) -> PathBuf {
        self.dir_of(id).join(version.to_string()).join(path)
    }

    async fn load(&self, id: &AssetIdentifier) -> Result<StoredRecord, RepositoryError> {
        let path = self.dir_of(id).join(RECORD_FILE);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(io_error(e)),
        };
        serde_json::from_str(&content)
            .map_err(|e| RepositoryError::Communication(format!("corrupt record {id}: {e}")))
    }

    async fn store(&self, dir: &Path, record: &StoredRecord) -> Result<(), RepositoryError> {
        tokio::fs::create_dir_all(dir).await.map_err(io_error)?;
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| RepositoryError::Communication(e.to_string()))?;
        tokio::fs::write(dir.join(RECORD_FILE), json)
            .await
            .map_err(io_error)
    }

    /// Loads a record, applies `edit`, and writes it back.
    async fn modify<T>(
        &self,
        id: &AssetIdentifier,
        edit: impl FnOnce(&mut StoredRecord) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let mut record = self.load(id).await?;
        let out = edit(&mut record)?;
        self.store(&self.dir_of(id), &record).await?;
        Ok(out)
    }
}

impl ContentRepository for DirectoryRepository {
    fn create_item<'a>(&'a self, request: &'a CreateAssetRequest) -> RepoFuture<'a, AssetIdentifier> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let asset_id = uuid::Uuid::new_v4().to_string();
            let record = StoredRecord {
                project: request.project.clone(),
                collection: request.collection.clone(),
                name: request.name.clone(),
                tags: request.tags.clone(),
                metadata: Metadata::new(),
                source_controlled: false,
                versions: BTreeMap::from([(1, StoredVersion::default())]),
            };
            self.store(&self.record_dir(&request.project, &asset_id), &record)
                .await?;
            let id = AssetIdentifier::new(&request.project, asset_id, "1");
            debug!(record = %id, name = %request.name, "record created");
            Ok(id)
        })
    }

    fn create_unfrozen_version<'a>(
        &'a self,
        existing: &'a AssetIdentifier,
    ) -> RepoFuture<'a, AssetIdentifier> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let mut record = self.load(existing).await?;
            let (latest, previous) = record
                .latest()
                .map(|(n, v)| (n, v.clone()))
                .ok_or_else(|| RepositoryError::NotFound(existing.to_string()))?;
            if !previous.frozen {
                return Err(RepositoryError::Rejected(format!(
                    "{} already has an unfrozen version",
                    existing.asset_id
                )));
            }

            let next = latest + 1;
            for file in &previous.files {
                let target = self.blob_path(existing, next, &file.path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
                }
                tokio::fs::copy(self.blob_path(existing, latest, &file.path), &target)
                    .await
                    .map_err(io_error)?;
            }
            record.versions.insert(
                next,
                StoredVersion {
                    frozen: false,
                    ..previous
                },
            );
            self.store(&self.dir_of(existing), &record).await?;
            Ok(existing.with_version(next.to_string()))
        })
    }

    fn update_item<'a>(&'a self, id: &'a AssetIdentifier, update: &'a AssetUpdate) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            self.modify(id, |record| {
                record.unfrozen_mut(id)?;
                record.name = update.name.clone();
                record.tags = update.tags.clone();
                record.metadata = update.metadata.clone();
                Ok(())
            })
            .await
        })
    }

    fn upload_file<'a>(&'a self, id: &'a AssetIdentifier, file: &'a UploadFile) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            validate_destination_path(&file.destination)
                .map_err(|e| RepositoryError::Rejected(e.to_string()))?;
            let data = tokio::fs::read(&file.source).await.map_err(io_error)?;

            let _guard = self.lock.lock().await;
            let number = version_number(id)?;
            // Validate the target version before touching its blobs.
            self.load(id).await?.unfrozen_mut(id)?;

            let target = self.blob_path(id, number, &file.destination);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
            }
            tokio::fs::write(&target, &data).await.map_err(io_error)?;

            let stored = RemoteFile {
                path: file.destination.clone(),
                checksum: Some(checksum_bytes(&data)),
                size: data.len() as u64,
            };
            self.modify(id, |record| {
                let version = record.unfrozen_mut(id)?;
                version.files.retain(|f| f.path != stored.path);
                version.files.push(stored);
                Ok(())
            })
            .await
        })
    }

    fn remove_file<'a>(&'a self, id: &'a AssetIdentifier, path: &'a str) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let number = version_number(id)?;
            self.modify(id, |record| {
                record.unfrozen_mut(id)?.files.retain(|f| f.path != path);
                Ok(())
            })
            .await?;
            remove_if_exists(&self.blob_path(id, number, path), false).await
        })
    }

    fn update_dependencies<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dependencies: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            self.modify(id, |record| {
                record.unfrozen_mut(id)?.dependencies = dependencies.to_vec();
                Ok(())
            })
            .await
        })
    }

    fn freeze_version<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, u32> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let number = version_number(id)?;
            self.modify(id, |record| {
                record.unfrozen_mut(id)?.frozen = true;
                Ok(())
            })
            .await?;
            debug!(record = %id, "version frozen");
            Ok(number)
        })
    }

    fn remove_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let dir = self.dir_of(id);
            if !tokio::fs::try_exists(dir.join(RECORD_FILE))
                .await
                .map_err(io_error)?
            {
                return Err(RepositoryError::NotFound(id.to_string()));
            }
            remove_if_exists(&dir, true).await
        })
    }

    fn remove_unfrozen_version<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.lock.lock().await;
            let number = version_number(id)?;
            self.modify(id, |record| {
                record.unfrozen_mut(id)?;
                record.versions.remove(&number);
                Ok(())
            })
            .await?;
            remove_if_exists(&self.dir_of(id).join(number.to_string()), true).await
        })
    }

    fn fetch_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, AssetRecord> {
        Box::pin(async move {
            let record = self.load(id).await?;
            let number = version_number(id)?;
            let version = record
                .versions
                .get(&number)
                .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
            Ok(AssetRecord {
                identifier: id.clone(),
                name: record.name.clone(),
                frozen: version.frozen,
                source_controlled: record.source_controlled,
                version_number: number,
                files: version.files.clone(),
                dependencies: version.dependencies.clone(),
                tags: record.tags.clone(),
                metadata: record.metadata.clone(),
            })
        })
    }

    fn fetch_import_status<'a>(
        &'a self,
        ids: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, HashMap<AssetIdentifier, RemoteSyncStatus>> {
        Box::pin(async move {
            let mut out = HashMap::with_capacity(ids.len());
            for id in ids {
                let status = match self.load(id).await {
                    Ok(record) => match (record.latest_frozen(), id.version.parse::<u32>()) {
                        (Some(latest), Ok(current)) if latest > current => {
                            RemoteSyncStatus::OutOfDate {
                                latest_version: latest.to_string(),
                            }
                        }
                        (Some(_), Ok(_)) => RemoteSyncStatus::UpToDate,
                        _ => RemoteSyncStatus::Unknown,
                    },
                    Err(RepositoryError::NotFound(_)) => RemoteSyncStatus::Deleted,
                    Err(e) => return Err(e),
                };
                out.insert(id.clone(), status);
            }
            Ok(out)
        })
    }
}
