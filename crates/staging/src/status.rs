//! Upload status resolution.
//!
//! Resolution runs in two phases. [`StatusResolver::resolve_self`] decides
//! each node on its own (files, counterpart, upload mode) and may suspend
//! on file and repository I/O. [`StatusResolver::propagate`] then walks the
//! graph post-order and promotes unchanged nodes whose dependencies moved.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use assetstage_protocol::{
    AssetIdentifier, ContentId, ImportedAssetInfo, RemoteSyncStatus, StagingSettings, UploadMode,
    UploadStatus,
};
use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::compare::FileComparator;
use crate::error::StagingError;
use crate::graph::AssetGraph;
use crate::node::AssetNode;
use crate::repository::ContentRepository;
use crate::tracker::ImportedAssetTracker;

const NO_CHANGES: &str = "no changes";

/// Self-status decision for one node.
struct Decision {
    content_id: ContentId,
    status: UploadStatus,
    diff: String,
}

/// Inputs shared by every node of one Phase 1 run.
struct SelfContext<'a> {
    settings: &'a StagingSettings,
    check_remote: bool,
    remote_notes: &'a HashMap<ContentId, String>,
}

/// Final identifier a dependency will have once the batch is uploaded.
enum FinalIdentifier<'a> {
    /// A record that does not exist yet.
    Pending,
    /// A new version of this record.
    NewVersion(&'a AssetIdentifier),
    /// This exact existing version.
    Existing(&'a AssetIdentifier),
    /// Left out of the upload.
    Omitted,
}

/// Two-phase decision engine.
#[derive(Clone)]
pub struct StatusResolver {
    repository: Arc<dyn ContentRepository>,
    tracker: Arc<dyn ImportedAssetTracker>,
    comparator: Arc<dyn FileComparator>,
}

impl StatusResolver {
    pub fn new(
        repository: Arc<dyn ContentRepository>,
        tracker: Arc<dyn ImportedAssetTracker>,
        comparator: Arc<dyn FileComparator>,
    ) -> Self {
        Self {
            repository,
            tracker,
            comparator,
        }
    }

    /// Phase 1: computes the self status of every node.
    ///
    /// Nodes are evaluated concurrently, bounded by the settings'
    /// concurrency. `progress` receives `(completed, total)` after each node.
    /// Nothing is written to the graph if the run is cancelled.
    pub async fn resolve_self(
        &self,
        graph: &mut AssetGraph,
        settings: &StagingSettings,
        check_remote: bool,
        progress: &(dyn Fn(usize, usize) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<(), StagingError> {
        let remote_notes = if check_remote {
            self.sync_remote(graph).await
        } else {
            HashMap::new()
        };

        let ctx = SelfContext {
            settings,
            check_remote,
            remote_notes: &remote_notes,
        };
        let total = graph.len();
        let mut decisions = Vec::with_capacity(total);
        {
            let mut pending = stream::iter(graph.nodes().map(|node| self.evaluate(node, &ctx)))
                .buffer_unordered(settings.concurrency());

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!(completed = decisions.len(), total, "status refresh cancelled");
                        return Err(StagingError::Cancelled);
                    }
                    next = pending.next() => match next {
                        Some(decision) => {
                            decisions.push(decision);
                            progress(decisions.len(), total);
                        }
                        None => break,
                    }
                }
            }
        }

        for decision in decisions {
            if let Some(node) = graph.get_mut(&decision.content_id) {
                debug!(
                    content_id = %decision.content_id,
                    status = decision.status.label(),
                    "self status"
                );
                node.set_self_status(decision.status, decision.diff);
            }
        }
        Ok(())
    }

    /// Asks the repository for the sync state of every linked record.
    ///
    /// Deleted records are unlinked and newer remote versions are noted.
    /// A failed request leaves every node on local-only decisions.
    async fn sync_remote(&self, graph: &mut AssetGraph) -> HashMap<ContentId, String> {
        let linked: Vec<AssetIdentifier> = graph
            .nodes()
            .filter_map(|node| node.counterpart().map(|link| link.identifier.clone()))
            .collect();
        let mut notes = HashMap::new();
        if linked.is_empty() {
            return notes;
        }

        let statuses = match self.repository.fetch_import_status(&linked).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(error = %e, "remote status unavailable, using local state only");
                return notes;
            }
        };

        for node in graph.nodes_mut() {
            let Some(link) = node.counterpart() else {
                continue;
            };
            let status = statuses
                .get(&link.identifier)
                .cloned()
                .unwrap_or_default();
            match status {
                RemoteSyncStatus::Deleted => {
                    debug!(
                        content_id = %node.content_id(),
                        remote = %link.identifier,
                        "counterpart deleted remotely"
                    );
                    node.set_counterpart(None);
                }
                RemoteSyncStatus::OutOfDate { latest_version } => {
                    let mut link = link.clone();
                    if let Ok(number) = latest_version.parse() {
                        link.version_number = number;
                    }
                    notes.insert(
                        node.content_id().clone(),
                        format!("remote has newer version {latest_version}"),
                    );
                    node.set_counterpart(Some(link));
                }
                RemoteSyncStatus::UpToDate | RemoteSyncStatus::Unknown => {}
            }
        }
        notes
    }

    async fn evaluate(&self, node: &AssetNode, ctx: &SelfContext<'_>) -> Decision {
        let (status, mut lines) = self.decide(node, ctx).await;
        if let Some(note) = ctx.remote_notes.get(node.content_id()) {
            lines.push(note.clone());
        }
        Decision {
            content_id: node.content_id().clone(),
            status,
            diff: lines.join("\n"),
        }
    }

    async fn decide(&self, node: &AssetNode, ctx: &SelfContext<'_>) -> (UploadStatus, Vec<String>) {
        if node.has_files_outside_project() {
            return (
                UploadStatus::ErrorOutsideProject,
                vec!["files outside the project".into()],
            );
        }

        let Some(link) = node.counterpart() else {
            return (UploadStatus::Add, vec!["new asset".into()]);
        };

        if ctx.settings.upload_mode == UploadMode::ForceNewAsset {
            return (UploadStatus::Duplicate, vec!["forced new asset".into()]);
        }

        let Some(baseline) = self.tracker.get(&link.identifier) else {
            return (
                UploadStatus::Add,
                vec![format!("{} is not imported, uploading as new asset", link.identifier)],
            );
        };

        if ctx.check_remote {
            match self.repository.fetch_item(&link.identifier).await {
                Ok(record) if record.source_controlled => {
                    return (
                        UploadStatus::SourceControlled,
                        vec!["files are managed by source control".into()],
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(
                        content_id = %node.content_id(),
                        error = %e,
                        "record fetch failed, skipping source control check"
                    );
                }
            }
        }

        let changes = self.diff_against(node, &baseline).await;

        if ctx.settings.upload_mode == UploadMode::ForceNewVersion {
            let mut lines = vec!["forced new version".to_string()];
            lines.extend(changes);
            return (UploadStatus::Override, lines);
        }

        if changes.is_empty() {
            (UploadStatus::Skip, vec![NO_CHANGES.into()])
        } else {
            (UploadStatus::Override, changes)
        }
    }

    /// Lists every difference between the node and its import baseline.
    ///
    /// Comparison failures count as differences.
    async fn diff_against(&self, node: &AssetNode, baseline: &ImportedAssetInfo) -> Vec<String> {
        let mut changes = Vec::new();
        let mut current = HashSet::new();

        for file in node.files() {
            let key = file.key();
            let tracked = baseline.tracked_file(&key);
            match self.comparator.compare(tracked, &file.source).await {
                Ok(result) if result.changed => {
                    let verb = if tracked.is_some() { "modified" } else { "added" };
                    changes.push(format!("{verb}: {}", file.destination));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(content_id = %node.content_id(), error = %e, "file comparison failed");
                    changes.push(format!("comparison failed: {e}"));
                }
            }
            current.insert(key);
        }

        for tracked in &baseline.files {
            if !current.contains(&tracked.path) {
                changes.push(format!("removed: {}", tracked.path));
            }
        }

        let now: HashSet<&ContentId> = node.dependencies().iter().collect();
        let before: HashSet<&ContentId> = baseline.dependency_content_ids.iter().collect();
        if now != before {
            changes.push("dependencies changed".into());
        }

        changes
    }

    /// Phase 2: resolves every node's final status.
    ///
    /// Synchronous post-order walk; each node is finalized once even when
    /// several parents reach it. A `Skip` node with a counterpart becomes
    /// `Override` when a dependency's final identifier differs from the one
    /// recorded at import. Any other self status carries over unchanged.
    pub fn propagate(&self, graph: &mut AssetGraph) {
        let mut visited = HashSet::new();
        let mut resolved: HashMap<ContentId, (UploadStatus, String)> = HashMap::new();
        let mut revisit = Vec::new();

        let ids: Vec<ContentId> = graph.ids().cloned().collect();
        for id in &ids {
            self.finalize(id, graph, &mut visited, &mut resolved, &mut revisit);
        }
        if !revisit.is_empty() {
            self.revisit_cycles(graph, revisit, &mut resolved);
        }

        let mut promoted = 0;
        for (id, (status, diff)) in resolved {
            if let Some(node) = graph.get_mut(&id) {
                if status != node.self_status() {
                    promoted += 1;
                }
                node.set_resolved_status(status, diff);
            }
        }
        debug!(nodes = ids.len(), promoted, "statuses propagated");
    }

    fn finalize(
        &self,
        id: &ContentId,
        graph: &AssetGraph,
        visited: &mut HashSet<ContentId>,
        resolved: &mut HashMap<ContentId, (UploadStatus, String)>,
        revisit: &mut Vec<ContentId>,
    ) {
        if !visited.insert(id.clone()) {
            return;
        }
        let Some(node) = graph.get(id) else {
            return;
        };
        for dep in node.dependencies() {
            self.finalize(dep, graph, visited, resolved, revisit);
        }

        // Dependencies still on the stack close a cycle back to this node.
        let reads_open_dependency = node
            .dependencies()
            .iter()
            .any(|dep| graph.contains(dep) && !resolved.contains_key(dep));

        let outcome = self.resolve_node(node, graph, resolved);
        if reads_open_dependency && outcome.0 == UploadStatus::Skip {
            revisit.push(id.clone());
        }
        resolved.insert(id.clone(), outcome);
    }

    /// Re-evaluates `Skip` nodes that read a cycle partner before it was final.
    ///
    /// A promotion is passed on to every `Skip` dependent in turn. Nodes only
    /// move from `Skip` to `Override`, so the worklist drains.
    fn revisit_cycles(
        &self,
        graph: &AssetGraph,
        mut worklist: Vec<ContentId>,
        resolved: &mut HashMap<ContentId, (UploadStatus, String)>,
    ) {
        let mut dependents: HashMap<&ContentId, Vec<&ContentId>> = HashMap::new();
        for node in graph.nodes() {
            for dep in node.dependencies() {
                dependents.entry(dep).or_default().push(node.content_id());
            }
        }

        while let Some(id) = worklist.pop() {
            let Some(node) = graph.get(&id) else {
                continue;
            };
            if resolved
                .get(&id)
                .is_some_and(|(status, _)| *status != UploadStatus::Skip)
            {
                continue;
            }
            let outcome = self.resolve_node(node, graph, resolved);
            if outcome.0 == UploadStatus::Skip {
                continue;
            }
            debug!(content_id = %id, "promoted through a dependency cycle");
            if let Some(parents) = dependents.get(&id) {
                worklist.extend(parents.iter().map(|parent| (*parent).clone()));
            }
            resolved.insert(id, outcome);
        }
    }

    fn resolve_node(
        &self,
        node: &AssetNode,
        graph: &AssetGraph,
        resolved: &HashMap<ContentId, (UploadStatus, String)>,
    ) -> (UploadStatus, String) {
        let unchanged = (node.self_status(), node.self_diff().to_string());
        if node.self_status() != UploadStatus::Skip {
            return unchanged;
        }
        let Some(link) = node.counterpart() else {
            return unchanged;
        };
        let Some(baseline) = self.tracker.get(&link.identifier) else {
            return unchanged;
        };

        let mut reasons = Vec::new();
        let mut present: Vec<&AssetIdentifier> = Vec::new();

        for dep_id in node.dependencies() {
            let Some(dep) = graph.get(dep_id) else {
                continue;
            };
            // A dependency still on the stack (cycle) contributes its self status
            // here; `revisit_cycles` re-checks the node once the pass ends.
            let status = resolved
                .get(dep_id)
                .map(|(status, _)| *status)
                .unwrap_or_else(|| dep.self_status());

            match final_identifier(dep, status) {
                FinalIdentifier::Pending => {
                    reasons.push(format!("dependency {} is new", dep.name()));
                }
                FinalIdentifier::NewVersion(record) => {
                    reasons.push(format!("dependency {} has a new version", dep.name()));
                    present.push(record);
                }
                FinalIdentifier::Existing(identifier) => {
                    match baseline
                        .dependencies
                        .iter()
                        .find(|recorded| recorded.same_asset(identifier))
                    {
                        None => reasons.push(format!("dependency {} was added", dep.name())),
                        Some(recorded) if recorded.version != identifier.version => {
                            reasons.push(format!("dependency {} changed version", dep.name()));
                        }
                        Some(_) => {}
                    }
                    present.push(identifier);
                }
                FinalIdentifier::Omitted => {}
            }
        }

        for recorded in &baseline.dependencies {
            if !present.iter().any(|p| p.same_asset(recorded)) {
                reasons.push(format!("dependency removed: {recorded}"));
            }
        }

        if reasons.is_empty() {
            return unchanged;
        }

        debug!(content_id = %node.content_id(), reasons = reasons.len(), "promoted to override");
        let mut lines: Vec<String> = vec!["dependencies changed".into()];
        lines.extend(reasons);
        lines.extend(
            node.self_diff()
                .lines()
                .filter(|line| *line != NO_CHANGES)
                .map(String::from),
        );
        (UploadStatus::Override, lines.join("\n"))
    }
}

fn final_identifier(dep: &AssetNode, status: UploadStatus) -> FinalIdentifier<'_> {
    let ready = status.is_ready() && !dep.is_ignored();
    match (ready, dep.counterpart()) {
        (true, _) if status.creates_record() => FinalIdentifier::Pending,
        (true, Some(link)) => FinalIdentifier::NewVersion(&link.identifier),
        (true, None) => FinalIdentifier::Pending,
        (false, Some(link)) => FinalIdentifier::Existing(&link.identifier),
        (false, None) => FinalIdentifier::Omitted,
    }
}
