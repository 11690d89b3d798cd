//! Outcome of one upload batch.

use serde::{Deserialize, Serialize};

use crate::ids::{AssetIdentifier, ContentId};

/// Batch-level result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum BatchOutcome {
    Success,
    Error(String),
    Cancelled,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// What happened to one asset of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemResult {
    /// Uploaded and frozen.
    Uploaded,
    /// The asset's own remote call failed.
    Failed,
    /// Its record was created or recycled, then undone.
    RolledBack,
    /// Frozen before the batch failed. A frozen version cannot be undone,
    /// so it stays published.
    Committed,
    /// The batch ended before any remote work for it.
    NotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub content_id: ContentId,
    /// Remote version the asset was staged into, if it got that far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<AssetIdentifier>,
    /// Version number assigned on freeze.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_number: Option<u32>,
    pub result: ItemResult,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub outcome: BatchOutcome,
    pub items: Vec<ItemOutcome>,
}

impl UploadReport {
    /// Items that ended in a frozen remote version.
    pub fn uploaded(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items
            .iter()
            .filter(|item| item.result == ItemResult::Uploaded)
    }

    pub fn item(&self, content_id: &ContentId) -> Option<&ItemOutcome> {
        self.items.iter().find(|item| &item.content_id == content_id)
    }

    pub fn count(&self, result: ItemResult) -> usize {
        self.items.iter().filter(|item| item.result == result).count()
    }
}
