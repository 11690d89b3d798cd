//! Per-item data holder of the staging graph.
//!
//! File lists are only mutated through [`AssetNode::add_main_files`],
//! [`AssetNode::add_additional_files`], [`AssetNode::remove_files`] and
//! [`AssetNode::set_path_mode`]; each of them re-runs
//! [`AssetNode::resolve_file_paths`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use assetstage_protocol::{AssetIdentifier, ContentId, FilePathMode, ProjectRef, UploadStatus};
use assetstage_transfer::{normalize_path_key, to_forward_slashes, validate_destination_path};
use tracing::warn;

/// A local file and its destination inside the remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    /// Empty until paths are resolved.
    pub destination: String,
}

impl StagedFile {
    fn new(source: PathBuf) -> Self {
        Self {
            source,
            destination: String::new(),
        }
    }

    pub fn key(&self) -> String {
        normalize_path_key(&self.source)
    }
}

/// Existing remote record this node uploads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLink {
    pub identifier: AssetIdentifier,
    /// Last known remote version number.
    pub version_number: u32,
}

/// One content item of the staging graph.
#[derive(Debug, Clone)]
pub struct AssetNode {
    content_id: ContentId,
    name: String,
    target_project: ProjectRef,
    project_root: PathBuf,
    path_mode: FilePathMode,
    main_files: Vec<StagedFile>,
    additional_files: Vec<StagedFile>,
    dependencies: Vec<ContentId>,
    counterpart: Option<RemoteLink>,
    self_status: UploadStatus,
    resolved_status: UploadStatus,
    self_diff: String,
    diff: String,
    ignored: bool,
    is_dependency: bool,
    path_warnings: Vec<String>,
}

impl AssetNode {
    pub fn new(
        content_id: ContentId,
        name: impl Into<String>,
        target_project: ProjectRef,
        project_root: impl Into<PathBuf>,
        path_mode: FilePathMode,
    ) -> Self {
        Self {
            content_id,
            name: name.into(),
            target_project,
            project_root: project_root.into(),
            path_mode,
            main_files: Vec::new(),
            additional_files: Vec::new(),
            dependencies: Vec::new(),
            counterpart: None,
            self_status: UploadStatus::Pending,
            resolved_status: UploadStatus::Pending,
            self_diff: String::new(),
            diff: String::new(),
            ignored: false,
            is_dependency: false,
            path_warnings: Vec::new(),
        }
    }

    pub fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_project(&self) -> &ProjectRef {
        &self.target_project
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn path_mode(&self) -> FilePathMode {
        self.path_mode
    }

    pub fn main_files(&self) -> &[StagedFile] {
        &self.main_files
    }

    pub fn additional_files(&self) -> &[StagedFile] {
        &self.additional_files
    }

    /// Main files followed by additional files.
    pub fn files(&self) -> impl Iterator<Item = &StagedFile> {
        self.main_files.iter().chain(self.additional_files.iter())
    }

    pub fn file_count(&self) -> usize {
        self.main_files.len() + self.additional_files.len()
    }

    pub fn dependencies(&self) -> &[ContentId] {
        &self.dependencies
    }

    pub fn counterpart(&self) -> Option<&RemoteLink> {
        self.counterpart.as_ref()
    }

    pub fn self_status(&self) -> UploadStatus {
        self.self_status
    }

    pub fn resolved_status(&self) -> UploadStatus {
        self.resolved_status
    }

    /// Reasons behind the self status, before dependency propagation.
    pub fn self_diff(&self) -> &str {
        &self.self_diff
    }

    /// Human-readable reasons behind the resolved status.
    pub fn diff(&self) -> &str {
        &self.diff
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn is_dependency(&self) -> bool {
        self.is_dependency
    }

    /// Path collisions and rejected destinations from the last resolve.
    pub fn warnings(&self) -> &[String] {
        &self.path_warnings
    }

    /// Resolved status is uploadable and the node is not ignored.
    pub fn is_ready(&self) -> bool {
        self.resolved_status.is_ready() && !self.ignored
    }

    /// `true` if any file lies outside the managed project root.
    pub fn has_files_outside_project(&self) -> bool {
        let root = normalize_path_key(&self.project_root);
        let prefix = format!("{}/", root.trim_end_matches('/'));
        self.files().any(|f| !f.key().starts_with(&prefix))
    }

    pub fn add_main_files(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.main_files.extend(paths.into_iter().map(StagedFile::new));
        self.resolve_file_paths();
    }

    pub fn add_additional_files(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        self.additional_files
            .extend(paths.into_iter().map(StagedFile::new));
        self.resolve_file_paths();
    }

    /// Removes files by source path (case-insensitive); returns how many went away.
    pub fn remove_files(&mut self, paths: &[PathBuf]) -> usize {
        let keys: HashSet<String> = paths.iter().map(|p| normalize_path_key(p)).collect();
        let before = self.file_count();
        self.main_files.retain(|f| !keys.contains(&f.key()));
        self.additional_files.retain(|f| !keys.contains(&f.key()));
        let removed = before - self.file_count();
        self.resolve_file_paths();
        removed
    }

    pub fn set_path_mode(&mut self, mode: FilePathMode) {
        self.path_mode = mode;
        self.resolve_file_paths();
    }

    /// De-duplicates both lists and recomputes every destination path.
    ///
    /// A file listed twice (compared case-insensitively) keeps its first
    /// occurrence; main files win over additional ones. Destination
    /// collisions are renamed and reported as warnings.
    pub fn resolve_file_paths(&mut self) {
        self.path_warnings.clear();

        let mut seen = HashSet::new();
        self.main_files.retain(|f| seen.insert(f.key()));
        self.additional_files.retain(|f| seen.insert(f.key()));

        let common = match self.path_mode {
            FilePathMode::Compact => {
                common_directory(self.files().map(|f| f.source.as_path()))
            }
            _ => None,
        };

        let mut taken: HashSet<String> = HashSet::new();
        let mut warnings = Vec::new();
        let mode = self.path_mode;
        let root = self.project_root.clone();

        for file in self
            .main_files
            .iter_mut()
            .chain(self.additional_files.iter_mut())
        {
            let raw = raw_destination(&file.source, mode, &root, common.as_deref());
            let unique = unique_destination(&raw, &mut taken);
            if unique != raw {
                warnings.push(format!(
                    "{} collides with another file, renamed to {unique}",
                    raw
                ));
            }
            file.destination = unique;
        }

        let mut rejected = Vec::new();
        for file in self.files() {
            if let Err(e) = validate_destination_path(&file.destination) {
                warnings.push(format!("dropped {}: {e}", file.source.display()));
                rejected.push(file.key());
            }
        }
        if !rejected.is_empty() {
            self.main_files.retain(|f| !rejected.contains(&f.key()));
            self.additional_files.retain(|f| !rejected.contains(&f.key()));
        }

        for warning in &warnings {
            warn!(content_id = %self.content_id, "{warning}");
        }
        self.path_warnings = warnings;
    }

    pub(crate) fn set_dependencies(&mut self, dependencies: Vec<ContentId>) {
        self.dependencies = dependencies;
    }

    pub(crate) fn insert_dependency(&mut self, position: usize, id: ContentId) {
        if self.dependencies.contains(&id) {
            return;
        }
        let position = position.min(self.dependencies.len());
        self.dependencies.insert(position, id);
    }

    pub(crate) fn set_counterpart(&mut self, counterpart: Option<RemoteLink>) {
        self.counterpart = counterpart;
    }

    pub(crate) fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    pub(crate) fn set_is_dependency(&mut self, is_dependency: bool) {
        self.is_dependency = is_dependency;
    }

    pub(crate) fn set_self_status(&mut self, status: UploadStatus, diff: String) {
        self.self_status = status;
        self.resolved_status = status;
        self.self_diff = diff.clone();
        self.diff = diff;
    }

    pub(crate) fn set_resolved_status(&mut self, status: UploadStatus, diff: String) {
        self.resolved_status = status;
        self.diff = diff;
    }
}

/// Deepest directory containing every path, `None` for an empty set.
fn common_directory<'a>(paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut common: Option<PathBuf> = None;
    for path in paths {
        let parent = path.parent().unwrap_or(Path::new(""));
        common = Some(match common {
            None => parent.to_path_buf(),
            Some(current) => current
                .components()
                .zip(parent.components())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    common
}

fn file_name(source: &Path) -> String {
    source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn raw_destination(
    source: &Path,
    mode: FilePathMode,
    root: &Path,
    common: Option<&Path>,
) -> String {
    let base = match mode {
        FilePathMode::Full => Some(root),
        FilePathMode::Compact => common,
        FilePathMode::Flatten => None,
    };

    base.and_then(|b| source.strip_prefix(b).ok())
        .map(to_forward_slashes)
        .filter(|rel| !rel.is_empty())
        .unwrap_or_else(|| file_name(source))
}

/// Returns `raw`, or `stem (n).ext` when the name is already taken.
fn unique_destination(raw: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(raw.to_lowercase()) {
        return raw.to_string();
    }

    let (dir, name) = match raw.rfind('/') {
        Some(idx) => (&raw[..=idx], &raw[idx + 1..]),
        None => ("", raw),
    };
    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };

    let mut n = 1;
    loop {
        let candidate = format!("{dir}{stem} ({n}){ext}");
        if taken.insert(candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}
