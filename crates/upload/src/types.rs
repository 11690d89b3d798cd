//! Data types for the upload flow.

use assetstage_protocol::{AssetIdentifier, BatchOutcome, ContentId};

/// The six stages of an upload batch, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadStage {
    /// Pull every local dependency of the selection into the batch.
    Expand,
    /// Create new records or unfrozen versions of existing ones.
    CreateRecords,
    /// Map dependency references to final remote identifiers.
    ResolveDependencies,
    /// Push metadata and files.
    UploadContent,
    /// Store dependency links, then freeze every version.
    LinkDependencies,
    /// Record uploaded assets as the new import baselines.
    TrackImports,
}

impl UploadStage {
    pub fn number(self) -> u8 {
        match self {
            Self::Expand => 1,
            Self::CreateRecords => 2,
            Self::ResolveDependencies => 3,
            Self::UploadContent => 4,
            Self::LinkDependencies => 5,
            Self::TrackImports => 6,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Expand => "expand selection",
            Self::CreateRecords => "create records",
            Self::ResolveDependencies => "resolve dependencies",
            Self::UploadContent => "upload content",
            Self::LinkDependencies => "link dependencies",
            Self::TrackImports => "track imports",
        }
    }
}

/// Progress event emitted during an upload batch.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    StageStarted { stage: UploadStage },
    /// A record or unfrozen version now exists for the asset.
    AssetStaged {
        content_id: ContentId,
        identifier: AssetIdentifier,
    },
    /// Metadata and files of the asset are uploaded.
    AssetUploaded { content_id: ContentId },
    StageCompleted { stage: UploadStage },
    /// The batch failed; this many records are being undone.
    RollingBack { records: usize },
    Finished { outcome: BatchOutcome },
}
