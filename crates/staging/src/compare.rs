//! File change detection against tracked baselines.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use assetstage_protocol::TrackedFile;
use assetstage_transfer::{FileState, read_file_state};

use crate::error::StagingError;

/// Boxed future returned by comparator calls.
pub type CompareFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StagingError>> + Send + 'a>>;

/// Outcome of comparing one file to its baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileComparison {
    pub changed: bool,
    pub state: FileState,
}

/// Decides whether a local file differs from its tracked baseline.
pub trait FileComparator: Send + Sync {
    /// Compares the current state of `path` with `baseline`.
    ///
    /// A missing baseline always reports a change.
    fn compare<'a>(
        &'a self,
        baseline: Option<&'a TrackedFile>,
        path: &'a Path,
    ) -> CompareFuture<'a, FileComparison>;

    /// Reads the full state of `path`, checksum included.
    fn snapshot<'a>(&'a self, path: &'a Path) -> CompareFuture<'a, FileState>;
}

/// Default comparator: size and timestamp first, checksum when they differ.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumComparator;

impl ChecksumComparator {
    pub fn new() -> Self {
        Self
    }
}

async fn read_state(path: &Path, with_checksum: bool) -> Result<FileState, StagingError> {
    let owned: PathBuf = path.to_path_buf();
    let display = owned.display().to_string();
    tokio::task::spawn_blocking(move || read_file_state(&owned, with_checksum))
        .await
        .map_err(|e| StagingError::Task(format!("task join error: {e}")))?
        .map_err(|e| StagingError::Comparison {
            path: display,
            message: e.to_string(),
        })
}

impl FileComparator for ChecksumComparator {
    fn compare<'a>(
        &'a self,
        baseline: Option<&'a TrackedFile>,
        path: &'a Path,
    ) -> CompareFuture<'a, FileComparison> {
        Box::pin(async move {
            let Some(baseline) = baseline else {
                let state = read_state(path, true).await?;
                return Ok(FileComparison {
                    changed: true,
                    state,
                });
            };

            let state = read_state(path, false).await?;
            if state.size == baseline.size && state.modified == baseline.modified {
                return Ok(FileComparison {
                    changed: false,
                    state,
                });
            }

            // Touched or resized: only the content decides.
            let state = read_state(path, true).await?;
            let changed = state.checksum.as_deref() != Some(baseline.checksum.as_str());
            Ok(FileComparison { changed, state })
        })
    }

    fn snapshot<'a>(&'a self, path: &'a Path) -> CompareFuture<'a, FileState> {
        Box::pin(read_state(path, true))
    }
}
