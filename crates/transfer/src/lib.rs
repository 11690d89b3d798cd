//! File state for staging: checksums, modification timestamps and
//! normalized path keys.

mod checksum;
mod paths;
mod state;

pub use checksum::{calculate_file_checksum, checksum_bytes};
pub use paths::{normalize_path_key, to_forward_slashes, validate_destination_path};
pub use state::{FileState, read_file_state};

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
