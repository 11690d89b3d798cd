//! Expansion of a root selection into the staging graph.
//!
//! Construction is a memoized depth-first walk over an id-indexed map.
//! An id whose node is still being built is marked in progress; reaching it
//! again (a cycle) records a pending edge instead of recursing. A second
//! pass attaches every pending edge once all nodes are complete.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use assetstage_protocol::{ContentId, DependencyMode, StagingSettings};
use tracing::{debug, info, warn};

use crate::error::StagingError;
use crate::node::{AssetNode, RemoteLink};
use crate::project::LocalProjectIndex;
use crate::tracker::ImportedAssetTracker;
use crate::types::StagingEdits;

/// Deduplicated node set of one generation.
#[derive(Debug, Clone, Default)]
pub struct AssetGraph {
    nodes: BTreeMap<ContentId, AssetNode>,
    roots: Vec<ContentId>,
}

impl AssetGraph {
    pub fn get(&self, id: &ContentId) -> Option<&AssetNode> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ContentId) -> Option<&mut AssetNode> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes ordered by content id.
    pub fn nodes(&self) -> impl Iterator<Item = &AssetNode> {
        self.nodes.values()
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut AssetNode> {
        self.nodes.values_mut()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ContentId> {
        self.nodes.keys()
    }

    /// Leaf items the selection expanded to, in selection order.
    pub fn roots(&self) -> &[ContentId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_nodes(self) -> Vec<AssetNode> {
        self.nodes.into_values().collect()
    }
}

/// Edge to a node that was still in progress when it was reached.
struct PendingEdge {
    from: ContentId,
    position: usize,
    to: ContentId,
}

/// Per-build state; `None` in `memo` marks a node in progress.
struct BuildContext<'a> {
    edits: &'a StagingEdits,
    settings: &'a StagingSettings,
    memo: HashMap<ContentId, Option<AssetNode>>,
    pending: Vec<PendingEdge>,
    satellites: Option<Vec<PathBuf>>,
}

/// Builds [`AssetGraph`]s from a local project index.
#[derive(Clone)]
pub struct GraphBuilder {
    index: Arc<dyn LocalProjectIndex>,
    tracker: Arc<dyn ImportedAssetTracker>,
}

impl GraphBuilder {
    pub fn new(index: Arc<dyn LocalProjectIndex>, tracker: Arc<dyn ImportedAssetTracker>) -> Self {
        Self { index, tracker }
    }

    /// Expands `roots` into the full node set.
    ///
    /// Unknown ids produce no node. Blocking; run it off the async runtime.
    pub fn build(
        &self,
        roots: &[ContentId],
        edits: &StagingEdits,
        settings: &StagingSettings,
    ) -> Result<AssetGraph, StagingError> {
        if settings.target_project.is_empty() {
            return Err(StagingError::Configuration(
                "settings have no target project".into(),
            ));
        }

        let leaves = self.expand_containers(roots);
        let mut ctx = BuildContext {
            edits,
            settings,
            memo: HashMap::new(),
            pending: Vec::new(),
            satellites: None,
        };

        match settings.dependency_mode {
            DependencyMode::Ignore => {
                for id in &leaves {
                    if let Some(node) = self.make_node(id, &ctx) {
                        ctx.memo.insert(id.clone(), Some(node));
                    }
                }
            }
            DependencyMode::Separate => {
                for id in &leaves {
                    self.visit(id, &mut ctx);
                }
                self.attach_pending(&mut ctx);
            }
            DependencyMode::Embedded => {
                for id in &leaves {
                    if let Some(node) = self.make_embedded_node(id, &mut ctx) {
                        ctx.memo.insert(id.clone(), Some(node));
                    }
                }
            }
        }

        let root_set: HashSet<&ContentId> = leaves.iter().collect();
        let mut nodes = BTreeMap::new();
        for (id, slot) in ctx.memo {
            let Some(mut node) = slot else {
                // Every in-progress slot is completed before the walk returns.
                warn!(content_id = %id, "node left in progress, dropped");
                continue;
            };
            let is_root = root_set.contains(&id);
            node.set_is_dependency(!is_root);
            node.set_ignored(!is_root && edits.is_ignored(&id));
            nodes.insert(id, node);
        }

        let roots: Vec<ContentId> = leaves
            .into_iter()
            .filter(|id| nodes.contains_key(id))
            .collect();

        info!(
            roots = roots.len(),
            nodes = nodes.len(),
            mode = ?settings.dependency_mode,
            "staging graph generated"
        );

        Ok(AssetGraph { nodes, roots })
    }

    /// Replaces container ids by the leaf items they hold.
    fn expand_containers(&self, roots: &[ContentId]) -> Vec<ContentId> {
        let mut leaves = Vec::new();
        let mut seen = HashSet::new();
        let mut stack: Vec<ContentId> = roots.iter().rev().cloned().collect();

        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.index.list_container_contents(&id) {
                Some(children) => stack.extend(children.into_iter().rev()),
                None => leaves.push(id),
            }
        }
        leaves
    }

    fn visit(&self, id: &ContentId, ctx: &mut BuildContext<'_>) -> bool {
        if ctx.memo.contains_key(id) {
            return true;
        }
        let Some(mut node) = self.make_node(id, ctx) else {
            return false;
        };
        ctx.memo.insert(id.clone(), None);

        let mut dependencies = Vec::new();
        let mut position = 0;
        let mut listed = HashSet::new();
        for dep in self.index.list_dependencies(id, false) {
            if &dep == id || !listed.insert(dep.clone()) {
                continue;
            }
            match ctx.memo.get(&dep) {
                Some(Some(_)) => {
                    dependencies.push(dep);
                    position += 1;
                }
                Some(None) => {
                    debug!(from = %id, to = %dep, "cycle detected, deferring edge");
                    ctx.pending.push(PendingEdge {
                        from: id.clone(),
                        position,
                        to: dep,
                    });
                    position += 1;
                }
                None => {
                    if self.visit(&dep, ctx) {
                        dependencies.push(dep);
                        position += 1;
                    }
                }
            }
        }

        node.set_dependencies(dependencies);
        ctx.memo.insert(id.clone(), Some(node));
        true
    }

    fn attach_pending(&self, ctx: &mut BuildContext<'_>) {
        for edge in std::mem::take(&mut ctx.pending) {
            let target_done = matches!(ctx.memo.get(&edge.to), Some(Some(_)));
            match ctx.memo.get_mut(&edge.from) {
                Some(Some(node)) if target_done => {
                    node.insert_dependency(edge.position, edge.to);
                }
                _ => warn!(from = %edge.from, to = %edge.to, "pending edge has no target"),
            }
        }
    }

    fn make_embedded_node(&self, id: &ContentId, ctx: &mut BuildContext<'_>) -> Option<AssetNode> {
        let mut node = self.make_node(id, ctx)?;

        let dependency_files: Vec<PathBuf> = self
            .index
            .list_dependencies(id, true)
            .into_iter()
            .filter(|dep| dep != id && !ctx.edits.is_ignored(dep))
            .filter_map(|dep| self.index.id_to_path(&dep))
            .collect();
        node.add_main_files(dependency_files);

        if ctx.settings.include_satellite_files {
            let satellites = ctx
                .satellites
                .get_or_insert_with(|| self.index.list_satellite_files())
                .clone();
            let satellites = self.without_ignored(id, satellites, ctx.edits);
            node.add_main_files(satellites);
        }

        Some(node)
    }

    fn make_node(&self, id: &ContentId, ctx: &BuildContext<'_>) -> Option<AssetNode> {
        let Some(path) = self.index.id_to_path(id) else {
            debug!(content_id = %id, "unknown content id, skipped");
            return None;
        };
        let name = self
            .index
            .display_name(id)
            .unwrap_or_else(|| id.to_string());

        let mut node = AssetNode::new(
            id.clone(),
            name,
            ctx.settings.target_project.clone(),
            self.index.project_root(),
            ctx.settings.file_path_mode,
        );
        node.add_main_files([path]);

        if ctx.edits.includes_extra_files(id) {
            let extras = self.without_ignored(id, self.index.extra_files(id), ctx.edits);
            node.add_additional_files(extras);
        }

        node.set_counterpart(self.link_counterpart(id, ctx.settings));
        Some(node)
    }

    /// Drops files belonging to manually ignored items other than `own`.
    fn without_ignored(&self, own: &ContentId, paths: Vec<PathBuf>, edits: &StagingEdits) -> Vec<PathBuf> {
        if edits.ignored.is_empty() {
            return paths;
        }
        paths
            .into_iter()
            .filter(|p| match self.index.path_to_id(p) {
                Some(owner) => &owner == own || !edits.is_ignored(&owner),
                None => true,
            })
            .collect()
    }

    fn link_counterpart(&self, id: &ContentId, settings: &StagingSettings) -> Option<RemoteLink> {
        let project = &settings.target_project;
        if let Some(info) = self.tracker.find_by_content(id, project) {
            return Some(RemoteLink {
                identifier: info.identifier,
                version_number: info.version_number,
            });
        }
        self.index
            .remote_identity(id)
            .filter(|remote| &remote.project() == project)
            .map(|identifier| RemoteLink {
                identifier,
                version_number: 0,
            })
    }
}
