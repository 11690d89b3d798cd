//! Six-stage upload executor with rollback.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use assetstage_protocol::{
    AssetIdentifier, AssetUpdate, BatchOutcome, ContentId, ContentIdentifier, CreateAssetRequest,
    DEFAULT_MAX_CONCURRENT_TASKS, ImportedAssetInfo, ItemOutcome, ItemResult, TrackedFile,
    UploadAsset, UploadReport, UploadStatus,
};
use assetstage_staging::{
    ChecksumComparator, ContentRepository, FileComparator, ImportedAssetTracker, StagingError,
};
use assetstage_transfer::normalize_path_key;
use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::types::{UploadEvent, UploadStage};

/// Record the batch created or recycled for one asset.
#[derive(Debug, Clone)]
enum Staged {
    /// Brand new record; undone by removing it.
    Created(AssetIdentifier),
    /// New unfrozen version of an existing record; undone by discarding it.
    Recycled(AssetIdentifier),
}

impl Staged {
    fn identifier(&self) -> &AssetIdentifier {
        match self {
            Self::Created(id) | Self::Recycled(id) => id,
        }
    }
}

struct Planned<'a> {
    id: ContentId,
    asset: &'a UploadAsset,
}

/// Mutable bookkeeping of one batch, owned by the stage loop.
struct BatchState<'a> {
    planned: Vec<Planned<'a>>,
    staged: HashMap<ContentId, Staged>,
    /// Content ids in the order their records appeared.
    staged_order: Vec<ContentId>,
    resolved: HashMap<ContentId, Vec<AssetIdentifier>>,
    versions: HashMap<ContentId, u32>,
    failed: HashSet<ContentId>,
}

impl<'a> BatchState<'a> {
    fn new(assets: Vec<&'a UploadAsset>) -> Self {
        let planned = assets
            .into_iter()
            .filter_map(|asset| {
                asset.content_id().map(|id| Planned {
                    id: id.clone(),
                    asset,
                })
            })
            .collect();
        Self {
            planned,
            staged: HashMap::new(),
            staged_order: Vec::new(),
            resolved: HashMap::new(),
            versions: HashMap::new(),
            failed: HashSet::new(),
        }
    }

    /// Folds one stage's task results into the state.
    ///
    /// Returns the first real failure, or `Cancelled` if tasks only
    /// observed cancellation.
    fn absorb<T>(
        &mut self,
        results: Vec<(ContentId, Result<T, UploadError>)>,
        mut accept: impl FnMut(&mut Self, ContentId, T),
    ) -> Result<(), UploadError> {
        let mut failure: Option<UploadError> = None;
        for (id, result) in results {
            match result {
                Ok(value) => accept(self, id, value),
                Err(e) if e.is_cancelled() => {
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => {
                    warn!(content_id = %id, error = %e, "upload task failed");
                    self.failed.insert(id);
                    if failure.as_ref().is_none_or(UploadError::is_cancelled) {
                        failure = Some(e);
                    }
                }
            }
        }
        failure.map_or(Ok(()), Err)
    }
}

/// Stage 1: the selection plus every asset it reaches through local
/// dependency references, in input order.
///
/// `None` selects every asset. Projections that are not ready are never
/// uploaded; a local reference to one (or to an id missing from `assets`)
/// fails with [`UploadError::DanglingDependency`].
pub fn expand_selection<'a>(
    assets: &'a [UploadAsset],
    requested: Option<&[ContentId]>,
) -> Result<Vec<&'a UploadAsset>, UploadError> {
    let mut by_id: HashMap<&ContentId, &UploadAsset> = HashMap::new();
    for asset in assets {
        match asset.content_id() {
            Some(id) if asset.status.is_ready() => {
                by_id.insert(id, asset);
            }
            _ => warn!(
                name = %asset.name,
                status = asset.status.label(),
                "asset is not uploadable, skipped"
            ),
        }
    }

    let mut stack: Vec<&ContentId> = match requested {
        Some(ids) => ids.iter().collect(),
        None => assets.iter().filter_map(UploadAsset::content_id).collect(),
    };
    let mut included: HashSet<&ContentId> = HashSet::new();

    while let Some(id) = stack.pop() {
        let Some(asset) = by_id.get(id) else {
            warn!(content_id = %id, "requested asset is not part of the batch");
            continue;
        };
        if !included.insert(id) {
            continue;
        }
        for dep in asset.local_dependencies() {
            if !by_id.contains_key(dep) {
                return Err(UploadError::DanglingDependency {
                    asset: id.clone(),
                    dependency: dep.clone(),
                });
            }
            stack.push(dep);
        }
    }

    Ok(assets
        .iter()
        .filter(|asset| {
            asset.status.is_ready() && asset.content_id().is_some_and(|id| included.contains(id))
        })
        .collect())
}

fn ensure_active(batch: &CancellationToken) -> Result<(), UploadError> {
    if batch.is_cancelled() {
        return Err(UploadError::Cancelled);
    }
    Ok(())
}

/// Executes upload batches against a content repository.
pub struct UploadExecutor {
    repository: Arc<dyn ContentRepository>,
    tracker: Arc<dyn ImportedAssetTracker>,
    comparator: Arc<dyn FileComparator>,
    concurrency: usize,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadExecutor {
    pub fn new(repository: Arc<dyn ContentRepository>, tracker: Arc<dyn ImportedAssetTracker>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            repository,
            tracker,
            comparator: Arc::new(ChecksumComparator::new()),
            concurrency: DEFAULT_MAX_CONCURRENT_TASKS,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Bounds the number of concurrent tasks per stage.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Replaces the comparator used to checksum uploaded files.
    pub fn with_comparator(mut self, comparator: Arc<dyn FileComparator>) -> Self {
        self.comparator = comparator;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    fn emit(&self, event: UploadEvent) {
        let _ = self.events_tx.try_send(event);
    }

    /// Uploads `assets` (or the `requested` subset and its dependencies).
    ///
    /// The batch succeeds as a whole or leaves the repository as it found
    /// it: on failure or cancellation every record created or recycled so
    /// far is undone before the report is returned.
    pub async fn upload(
        &self,
        assets: &[UploadAsset],
        requested: Option<&[ContentId]>,
        cancel: &CancellationToken,
    ) -> UploadReport {
        self.emit(UploadEvent::StageStarted {
            stage: UploadStage::Expand,
        });
        let expanded = match expand_selection(assets, requested) {
            Ok(expanded) => expanded,
            Err(e) => {
                error!(error = %e, "upload batch rejected");
                let outcome = BatchOutcome::Error(e.to_string());
                let state = BatchState::new(assets.iter().collect());
                return self.finish(&state, outcome);
            }
        };
        self.emit(UploadEvent::StageCompleted {
            stage: UploadStage::Expand,
        });

        let mut state = BatchState::new(expanded);
        info!(assets = state.planned.len(), "upload batch started");

        // Stage tasks cancel this token on their first failure; the caller's
        // token is left alone.
        let batch = cancel.child_token();
        let outcome = match self.run(&mut state, &batch).await {
            Ok(()) => BatchOutcome::Success,
            Err(e) => {
                self.rollback(&state).await;
                if e.is_cancelled() {
                    info!("upload batch cancelled");
                    BatchOutcome::Cancelled
                } else {
                    error!(error = %e, "upload batch failed");
                    BatchOutcome::Error(e.to_string())
                }
            }
        };

        self.finish(&state, outcome)
    }

    async fn run(&self, state: &mut BatchState<'_>, batch: &CancellationToken) -> Result<(), UploadError> {
        // 2. Create or recycle records
        self.begin(UploadStage::CreateRecords, batch)?;
        let tasks: Vec<_> = state
            .planned
            .iter()
            .map(|item| (item.id.clone(), self.stage_record(item.asset, batch)))
            .collect();
        let results = self.fan_out(tasks, batch).await;
        state.absorb(results, |state, id, staged| {
            self.emit(UploadEvent::AssetStaged {
                content_id: id.clone(),
                identifier: staged.identifier().clone(),
            });
            state.staged_order.push(id.clone());
            state.staged.insert(id, staged);
        })?;
        self.end(UploadStage::CreateRecords);

        // 3. Resolve dependency identifiers
        self.begin(UploadStage::ResolveDependencies, batch)?;
        for item in &state.planned {
            let resolved = resolve_dependencies(item, &state.staged)?;
            state.resolved.insert(item.id.clone(), resolved);
        }
        self.end(UploadStage::ResolveDependencies);

        // 4. Upload metadata and files
        self.begin(UploadStage::UploadContent, batch)?;
        let tasks: Vec<_> = state
            .planned
            .iter()
            .filter_map(|item| {
                let staged = state.staged.get(&item.id)?;
                Some((item.id.clone(), self.upload_content(item.asset, staged, batch)))
            })
            .collect();
        let results = self.fan_out(tasks, batch).await;
        state.absorb(results, |_, id, ()| {
            self.emit(UploadEvent::AssetUploaded { content_id: id });
        })?;
        self.end(UploadStage::UploadContent);

        // 5. Link dependencies, then freeze
        self.begin(UploadStage::LinkDependencies, batch)?;
        let tasks: Vec<_> = state
            .planned
            .iter()
            .filter_map(|item| {
                let staged = state.staged.get(&item.id)?;
                let dependencies = state.resolved.get(&item.id)?;
                Some((
                    item.id.clone(),
                    self.link_dependencies(staged.identifier(), dependencies, batch),
                ))
            })
            .collect();
        let results = self.fan_out(tasks, batch).await;
        state.absorb(results, |_, _, ()| {})?;

        // Freezing publishes a version, so it runs one record at a time and
        // stops at the first failure. Frozen records survive a rollback.
        for item in &state.planned {
            let Some(staged) = state.staged.get(&item.id) else {
                continue;
            };
            match self.freeze(staged.identifier(), batch).await {
                Ok(version) => {
                    state.versions.insert(item.id.clone(), version);
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(content_id = %item.id, error = %e, "freeze failed");
                        state.failed.insert(item.id.clone());
                    }
                    return Err(e);
                }
            }
        }
        self.end(UploadStage::LinkDependencies);

        // 6. Track new baselines. Remote state is final from here on.
        self.emit(UploadEvent::StageStarted {
            stage: UploadStage::TrackImports,
        });
        self.track_imports(state).await;
        self.end(UploadStage::TrackImports);

        Ok(())
    }

    fn begin(&self, stage: UploadStage, batch: &CancellationToken) -> Result<(), UploadError> {
        ensure_active(batch)?;
        debug!(stage = stage.number(), name = stage.label(), "stage started");
        self.emit(UploadEvent::StageStarted { stage });
        Ok(())
    }

    fn end(&self, stage: UploadStage) {
        debug!(stage = stage.number(), name = stage.label(), "stage completed");
        self.emit(UploadEvent::StageCompleted { stage });
    }

    /// Runs per-asset tasks with bounded concurrency until all have finished.
    ///
    /// The first real failure cancels `batch` so pending tasks stop before
    /// their next remote call.
    async fn fan_out<T, Fut>(
        &self,
        tasks: Vec<(ContentId, Fut)>,
        batch: &CancellationToken,
    ) -> Vec<(ContentId, Result<T, UploadError>)>
    where
        Fut: Future<Output = Result<T, UploadError>>,
    {
        let total = tasks.len();
        let mut pending = stream::iter(
            tasks
                .into_iter()
                .map(|(id, task)| async move { (id, task.await) }),
        )
        .buffer_unordered(self.concurrency);

        let mut results = Vec::with_capacity(total);
        while let Some((id, result)) = pending.next().await {
            if let Err(e) = &result {
                if !e.is_cancelled() && !batch.is_cancelled() {
                    debug!(content_id = %id, "task failed, cancelling the rest of the stage");
                    batch.cancel();
                }
            }
            results.push((id, result));
        }
        results
    }

    async fn stage_record(
        &self,
        asset: &UploadAsset,
        batch: &CancellationToken,
    ) -> Result<Staged, UploadError> {
        ensure_active(batch)?;
        if asset.status == UploadStatus::Override {
            if let Some(existing) = &asset.existing {
                let version = self.repository.create_unfrozen_version(existing).await?;
                debug!(name = %asset.name, record = %version, "unfrozen version created");
                return Ok(Staged::Recycled(version));
            }
            warn!(name = %asset.name, "override without an existing record, creating a new one");
        }

        let request = CreateAssetRequest {
            project: asset.target_project.clone(),
            collection: asset.target_collection.clone(),
            name: asset.name.clone(),
            tags: asset.tags.clone(),
        };
        let created = self.repository.create_item(&request).await?;
        debug!(name = %asset.name, record = %created, "record created");
        Ok(Staged::Created(created))
    }

    async fn upload_content(
        &self,
        asset: &UploadAsset,
        staged: &Staged,
        batch: &CancellationToken,
    ) -> Result<(), UploadError> {
        let id = staged.identifier();

        ensure_active(batch)?;
        let update = AssetUpdate {
            name: asset.name.clone(),
            tags: asset.tags.clone(),
            metadata: asset.metadata.clone(),
        };
        self.repository.update_item(id, &update).await?;

        for file in &asset.files {
            ensure_active(batch)?;
            self.repository.upload_file(id, file).await?;
        }

        if let Staged::Recycled(_) = staged {
            // The new version starts as a copy of the previous one.
            ensure_active(batch)?;
            let record = self.repository.fetch_item(id).await?;
            let local: HashSet<String> = asset
                .files
                .iter()
                .map(|f| f.destination.to_lowercase())
                .collect();
            for stale in record
                .files
                .iter()
                .filter(|f| !local.contains(&f.path.to_lowercase()))
            {
                ensure_active(batch)?;
                debug!(record = %id, path = %stale.path, "removing stale file");
                self.repository.remove_file(id, &stale.path).await?;
            }
        }

        debug!(
            name = %asset.name,
            files = asset.files.len(),
            bytes = asset.total_size(),
            "content uploaded"
        );
        Ok(())
    }

    async fn link_dependencies(
        &self,
        id: &AssetIdentifier,
        dependencies: &[AssetIdentifier],
        batch: &CancellationToken,
    ) -> Result<(), UploadError> {
        ensure_active(batch)?;
        self.repository.update_dependencies(id, dependencies).await?;
        Ok(())
    }

    async fn freeze(&self, id: &AssetIdentifier, batch: &CancellationToken) -> Result<u32, UploadError> {
        ensure_active(batch)?;
        Ok(self.repository.freeze_version(id).await?)
    }

    /// Records every uploaded asset as its record's import baseline.
    ///
    /// Failures are logged; the remote state is already final.
    async fn track_imports(&self, state: &BatchState<'_>) {
        let tasks = state.planned.iter().filter_map(|item| {
            let staged = state.staged.get(&item.id)?;
            Some(async move {
                let result = self.track_one(item, staged.identifier(), state).await;
                (&item.id, result)
            })
        });
        let mut pending = stream::iter(tasks).buffer_unordered(self.concurrency);
        while let Some((id, result)) = pending.next().await {
            if let Err(e) = result {
                warn!(content_id = %id, error = %e, "failed to record import baseline");
            }
        }
    }

    async fn track_one(
        &self,
        item: &Planned<'_>,
        identifier: &AssetIdentifier,
        state: &BatchState<'_>,
    ) -> Result<(), StagingError> {
        let mut files = Vec::with_capacity(item.asset.files.len());
        for file in &item.asset.files {
            let snapshot = self.comparator.snapshot(&file.source).await?;
            files.push(TrackedFile {
                path: normalize_path_key(&file.source),
                checksum: snapshot.checksum.unwrap_or_default(),
                modified: snapshot.modified,
                size: snapshot.size,
            });
        }

        self.tracker.track(ImportedAssetInfo {
            identifier: identifier.clone(),
            content_id: item.id.clone(),
            version_number: state.versions.get(&item.id).copied().unwrap_or(0),
            files,
            dependencies: state.resolved.get(&item.id).cloned().unwrap_or_default(),
            dependency_content_ids: item.asset.dependency_content_ids.clone(),
            imported_at: Utc::now(),
        })
    }

    /// Undoes every staged record that is not frozen yet, newest first.
    ///
    /// A frozen version is published and cannot be discarded; it is left in
    /// place and reported as committed. Failures are logged and never
    /// returned, so they cannot hide the error that triggered the rollback.
    async fn rollback(&self, state: &BatchState<'_>) {
        let (frozen, undoable): (Vec<&ContentId>, Vec<&ContentId>) = state
            .staged_order
            .iter()
            .partition(|id| state.versions.contains_key(*id));

        for id in frozen {
            if let Some(staged) = state.staged.get(id) {
                error!(
                    content_id = %id,
                    record = %staged.identifier(),
                    "version already frozen, cannot be rolled back"
                );
            }
        }

        let records = undoable.len();
        if records == 0 {
            return;
        }
        warn!(records, "rolling back upload batch");
        self.emit(UploadEvent::RollingBack { records });

        for id in undoable.into_iter().rev() {
            let Some(staged) = state.staged.get(id) else {
                continue;
            };
            let result = match staged {
                Staged::Created(record) => self.repository.remove_item(record).await,
                Staged::Recycled(record) => self.repository.remove_unfrozen_version(record).await,
            };
            match result {
                Ok(()) => debug!(content_id = %id, record = %staged.identifier(), "rolled back"),
                Err(e) => error!(
                    content_id = %id,
                    record = %staged.identifier(),
                    error = %e,
                    "rollback failed"
                ),
            }
        }
    }

    fn finish(&self, state: &BatchState<'_>, outcome: BatchOutcome) -> UploadReport {
        let items = state
            .planned
            .iter()
            .map(|item| {
                let staged = state.staged.get(&item.id);
                let result = if outcome.is_success() {
                    ItemResult::Uploaded
                } else if state.versions.contains_key(&item.id) {
                    ItemResult::Committed
                } else if state.failed.contains(&item.id) {
                    ItemResult::Failed
                } else if staged.is_some() {
                    ItemResult::RolledBack
                } else {
                    ItemResult::NotStarted
                };
                ItemOutcome {
                    content_id: item.id.clone(),
                    identifier: staged.map(|s| s.identifier().clone()),
                    version_number: state.versions.get(&item.id).copied(),
                    result,
                }
            })
            .collect();

        info!(outcome = ?outcome, "upload batch finished");
        self.emit(UploadEvent::Finished {
            outcome: outcome.clone(),
        });
        UploadReport { outcome, items }
    }
}

/// Stage 3: maps each dependency reference to the identifier it ends up with.
fn resolve_dependencies(
    item: &Planned<'_>,
    staged: &HashMap<ContentId, Staged>,
) -> Result<Vec<AssetIdentifier>, UploadError> {
    item.asset
        .dependencies
        .iter()
        .map(|dep| match dep {
            ContentIdentifier::Remote(id) => Ok(id.clone()),
            ContentIdentifier::Local { content_id, .. } => staged
                .get(content_id)
                .map(|s| s.identifier().clone())
                .ok_or_else(|| UploadError::DanglingDependency {
                    asset: item.id.clone(),
                    dependency: content_id.clone(),
                }),
        })
        .collect()
}
