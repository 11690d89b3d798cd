//! Staging coordinator.
//!
//! Owns the live node set, the user's edits and the last computed status.
//! Every rebuild starts from scratch and replays the edits by content id.

use std::sync::Arc;

use assetstage_protocol::{
    ContentId, ContentIdentifier, ItemResult, ProjectRef, StagingSettings, UploadAsset,
    UploadFile, UploadReport, UploadStatus,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compare::{ChecksumComparator, FileComparator};
use crate::error::StagingError;
use crate::graph::{AssetGraph, GraphBuilder};
use crate::node::{AssetNode, RemoteLink};
use crate::project::LocalProjectIndex;
use crate::repository::ContentRepository;
use crate::status::StatusResolver;
use crate::tracker::ImportedAssetTracker;
use crate::types::{StagingEdits, StagingEvent, StagingStatus};

/// Single owner of one staging workspace.
///
/// Methods take `&mut self`, so a regenerate, refresh or edit can never
/// overlap another one on the same instance.
pub struct StagingCoordinator {
    index: Arc<dyn LocalProjectIndex>,
    tracker: Arc<dyn ImportedAssetTracker>,
    repository: Arc<dyn ContentRepository>,
    builder: GraphBuilder,
    resolver: StatusResolver,
    settings: StagingSettings,
    edits: StagingEdits,
    graph: AssetGraph,
    status: StagingStatus,
    events_tx: mpsc::Sender<StagingEvent>,
    events_rx: Option<mpsc::Receiver<StagingEvent>>,
}

impl StagingCoordinator {
    /// Creates an empty workspace using the checksum comparator.
    pub fn new(
        index: Arc<dyn LocalProjectIndex>,
        tracker: Arc<dyn ImportedAssetTracker>,
        repository: Arc<dyn ContentRepository>,
        settings: StagingSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let comparator: Arc<dyn FileComparator> = Arc::new(ChecksumComparator::new());
        Self {
            builder: GraphBuilder::new(index.clone(), tracker.clone()),
            resolver: StatusResolver::new(repository.clone(), tracker.clone(), comparator),
            index,
            tracker,
            repository,
            settings,
            edits: StagingEdits::default(),
            graph: AssetGraph::default(),
            status: StagingStatus::default(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Replaces the file comparator.
    pub fn with_comparator(mut self, comparator: Arc<dyn FileComparator>) -> Self {
        self.resolver = StatusResolver::new(self.repository.clone(), self.tracker.clone(), comparator);
        self
    }

    /// Restores previously saved edits; they apply on the next regenerate.
    pub fn with_edits(mut self, edits: StagingEdits) -> Self {
        self.edits = edits;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<StagingEvent>> {
        self.events_rx.take()
    }

    pub fn settings(&self) -> &StagingSettings {
        &self.settings
    }

    pub fn edits(&self) -> &StagingEdits {
        &self.edits
    }

    pub fn status(&self) -> &StagingStatus {
        &self.status
    }

    pub fn graph(&self) -> &AssetGraph {
        &self.graph
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AssetNode> {
        self.graph.nodes()
    }

    pub fn node(&self, id: &ContentId) -> Option<&AssetNode> {
        self.graph.get(id)
    }

    /// Adds a root; takes effect on the next regenerate.
    pub fn add_to_selection(&mut self, id: impl Into<ContentId>) -> bool {
        self.edits.select(id.into())
    }

    pub fn remove_from_selection(&mut self, id: &ContentId) -> bool {
        self.edits.deselect(id)
    }

    /// Replaces the settings snapshot; takes effect on the next regenerate.
    pub fn set_settings(&mut self, settings: StagingSettings) {
        if settings != self.settings {
            debug!(project = %settings.target_project, "settings replaced");
            self.settings = settings;
        }
    }

    /// Excludes (or re-includes) a dependency from the upload.
    ///
    /// The flag is applied in place and statuses are re-propagated; roots
    /// cannot be ignored. Returns `true` if the edit changed.
    pub fn set_ignore(&mut self, id: &ContentId, ignored: bool) -> bool {
        if !self.edits.set_ignored(id, ignored) {
            return false;
        }
        if let Some(node) = self.graph.get_mut(id) {
            if node.is_dependency() {
                node.set_ignored(ignored);
                self.resolver.propagate(&mut self.graph);
                self.update_status();
            } else {
                debug!(content_id = %id, "selected roots cannot be ignored");
            }
        }
        true
    }

    /// Opts an item's extra files in or out; takes effect on the next regenerate.
    pub fn set_include_extra_files(&mut self, id: &ContentId, include: bool) -> bool {
        self.edits.set_include_extra_files(id, include)
    }

    pub fn set_metadata_override(
        &mut self,
        id: &ContentId,
        project: &ProjectRef,
        key: impl Into<String>,
        value: serde_json::Value,
    ) {
        self.edits.set_metadata(id, project, key, value);
    }

    pub fn clear_metadata_override(&mut self, id: &ContentId, project: &ProjectRef, key: &str) -> bool {
        self.edits.clear_metadata(id, project, key)
    }

    /// Rebuilds the graph from the current selection, replaying the edits.
    ///
    /// Every node starts out `Pending`; call [`Self::refresh_status`] next.
    pub async fn regenerate(&mut self) -> Result<usize, StagingError> {
        let builder = self.builder.clone();
        let roots = self.edits.selected.clone();
        let edits = self.edits.clone();
        let settings = self.settings.clone();

        let graph = tokio::task::spawn_blocking(move || builder.build(&roots, &edits, &settings))
            .await
            .map_err(|e| StagingError::Task(format!("task join error: {e}")))??;

        self.graph = graph;
        let nodes = self.graph.len();
        let _ = self.events_tx.try_send(StagingEvent::Regenerated { nodes });
        self.update_status();
        Ok(nodes)
    }

    /// Resolves the status of every node and returns the new aggregate.
    ///
    /// On cancellation the previous statuses stay in place.
    pub async fn refresh_status(
        &mut self,
        check_remote: bool,
        cancel: &CancellationToken,
    ) -> Result<StagingStatus, StagingError> {
        let events = self.events_tx.clone();
        let progress = move |completed: usize, total: usize| {
            let _ = events.try_send(StagingEvent::Progress { completed, total });
        };

        self.resolver
            .resolve_self(&mut self.graph, &self.settings, check_remote, &progress, cancel)
            .await?;
        self.resolver.propagate(&mut self.graph);
        self.update_status();

        info!(
            total = self.status.total,
            ready = self.status.ready,
            errors = self.status.errors,
            "staging status refreshed"
        );
        Ok(self.status.clone())
    }

    /// Projects every ready node into an upload snapshot.
    pub fn generate_upload_assets(&self) -> Vec<UploadAsset> {
        let project = &self.settings.target_project;
        self.graph
            .nodes()
            .filter(|node| node.is_ready())
            .map(|node| UploadAsset {
                name: node.name().to_string(),
                identifier: ContentIdentifier::local(project, node.content_id()),
                status: node.resolved_status(),
                existing: match node.resolved_status() {
                    UploadStatus::Override => node.counterpart().map(|l| l.identifier.clone()),
                    _ => None,
                },
                files: node
                    .files()
                    .map(|f| UploadFile {
                        source: f.source.clone(),
                        destination: f.destination.clone(),
                        size: self.index.file_size(&f.source),
                    })
                    .collect(),
                tags: self.settings.tags.clone(),
                dependencies: self.upload_dependencies(node),
                dependency_content_ids: node.dependencies().to_vec(),
                metadata: self.edits.metadata_for(node.content_id(), project),
                diff_summary: node.diff().to_string(),
                target_project: project.clone(),
                target_collection: self.settings.target_collection.clone(),
            })
            .collect()
    }

    fn upload_dependencies(&self, node: &AssetNode) -> Vec<ContentIdentifier> {
        let project = &self.settings.target_project;
        let mut out = Vec::new();
        for dep_id in node.dependencies() {
            let Some(dep) = self.graph.get(dep_id) else {
                continue;
            };
            if dep.is_ready() {
                out.push(ContentIdentifier::local(project, dep_id));
            } else if let Some(link) = dep.counterpart() {
                out.push(ContentIdentifier::Remote(link.identifier.clone()));
            } else {
                warn!(
                    content_id = %node.content_id(),
                    dependency = %dep_id,
                    "dependency has no remote record and is not uploaded, link omitted"
                );
            }
        }
        out
    }

    /// Applies an upload report to the node set.
    ///
    /// Uploaded nodes link to their new version and read as unchanged until
    /// the next refresh.
    pub fn apply_upload_report(&mut self, report: &UploadReport) {
        let mut applied = 0;
        for item in report.items.iter().filter(|i| i.result == ItemResult::Uploaded) {
            let (Some(node), Some(identifier)) =
                (self.graph.get_mut(&item.content_id), item.identifier.clone())
            else {
                continue;
            };
            node.set_counterpart(Some(RemoteLink {
                identifier,
                version_number: item.version_number.unwrap_or(0),
            }));
            node.set_self_status(UploadStatus::Skip, "uploaded".into());
            applied += 1;
        }
        if applied > 0 {
            self.update_status();
        }
        debug!(applied, "upload report applied");
    }

    fn update_status(&mut self) {
        let status = self.compute_status();
        if status != self.status {
            self.status = status;
            let _ = self
                .events_tx
                .try_send(StagingEvent::StatusChanged(self.status.clone()));
        }
    }

    fn compute_status(&self) -> StagingStatus {
        let mut status = StagingStatus {
            total: self.graph.len(),
            ..StagingStatus::default()
        };

        for node in self.graph.nodes() {
            let resolved = node.resolved_status();
            if node.has_files_outside_project() {
                status.has_files_outside_project = true;
            }
            if resolved.is_error() {
                status.errors += 1;
            }
            if node.is_ignored() {
                status.ignored += 1;
                if resolved.is_ready() {
                    status.manually_ignored_dependencies += 1;
                }
                continue;
            }
            match resolved {
                UploadStatus::Add | UploadStatus::Duplicate => status.added += 1,
                UploadStatus::Override => status.updated += 1,
                UploadStatus::Skip => status.skipped += 1,
                _ => {}
            }
            if node.is_ready() {
                status.ready += 1;
                status.total_files += node.file_count();
                status.total_size += node
                    .files()
                    .map(|f| self.index.file_size(&f.source))
                    .sum::<u64>();
            }
        }
        status
    }
}
