//! Staging flow for content uploads.
//!
//! Expands a root selection into a dependency graph, decides per node
//! whether it must be uploaded, and keeps the user's edits across rebuilds.
//! Remote and local collaborators are consumed through traits so the flow
//! is independent of any host.

pub mod compare;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod node;
pub mod project;
pub mod repository;
pub mod status;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_support;

pub use compare::{ChecksumComparator, CompareFuture, FileComparator, FileComparison};
pub use coordinator::StagingCoordinator;
pub use error::{RepositoryError, StagingError};
pub use graph::{AssetGraph, GraphBuilder};
pub use node::{AssetNode, RemoteLink, StagedFile};
pub use project::LocalProjectIndex;
pub use repository::{ContentRepository, RepoFuture};
pub use status::StatusResolver;
pub use tracker::{ImportedAssetTracker, MemoryTracker};
pub use types::{MetadataOverride, StagingEdits, StagingEvent, StagingStatus};
