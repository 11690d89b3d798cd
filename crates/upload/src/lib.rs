//! Upload execution for staged assets.
//!
//! Takes the immutable [`UploadAsset`](assetstage_protocol::UploadAsset)
//! snapshot produced by the staging coordinator and pushes it to a
//! [`ContentRepository`](assetstage_staging::ContentRepository).
//!
//! # Stages
//!
//! 1. **Expand**: pull every local dependency of the selection into the batch
//! 2. **Create**: create records, or unfrozen versions of existing ones
//! 3. **Resolve**: map dependency references to final identifiers
//! 4. **Upload**: push metadata and files
//! 5. **Link**: store dependency links and freeze every version
//! 6. **Track**: record the uploaded state as the new import baseline
//!
//! Each stage completes before the next starts. A failure or cancellation
//! in stages 2 to 5 undoes every record the batch created or recycled,
//! except versions already frozen: those are published and reported as
//! [`ItemResult::Committed`](assetstage_protocol::ItemResult::Committed).

pub mod error;
pub mod executor;
pub mod types;

pub use error::UploadError;
pub use executor::{UploadExecutor, expand_selection};
pub use types::{UploadEvent, UploadStage};
