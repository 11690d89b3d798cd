use std::path::Path;

use chrono::{DateTime, Utc};

use crate::{TransferError, calculate_file_checksum};

/// Snapshot of a local file used for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Present only when the checksum was requested.
    pub checksum: Option<String>,
}

/// Reads size and modification time of `path`, hashing it if asked.
///
/// Blocking; call from `spawn_blocking` in async contexts.
pub fn read_file_state(path: &Path, with_checksum: bool) -> Result<FileState, TransferError> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(TransferError::InvalidPath(format!(
            "not a file: {}",
            path.display()
        )));
    }

    let modified: DateTime<Utc> = metadata.modified()?.into();
    let checksum = if with_checksum {
        Some(calculate_file_checksum(path)?)
    } else {
        None
    };

    Ok(FileState {
        size: metadata.len(),
        modified,
        checksum,
    })
}
