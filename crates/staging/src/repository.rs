//! Remote content repository trait.
//!
//! `ContentRepository` is implemented by the host to bridge staging and
//! upload logic to the actual remote service. Using a trait keeps both
//! decoupled from transport and testable with mocks.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use assetstage_protocol::{
    AssetIdentifier, AssetRecord, AssetUpdate, CreateAssetRequest, RemoteSyncStatus, UploadFile,
};

use crate::error::RepositoryError;

/// Boxed future returned by repository calls.
pub type RepoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Abstract connection to the remote content repository.
pub trait ContentRepository: Send + Sync {
    /// Creates a new record and returns the identifier of its first, unfrozen version.
    fn create_item<'a>(&'a self, request: &'a CreateAssetRequest) -> RepoFuture<'a, AssetIdentifier>;

    /// Creates an unfrozen version on top of the latest frozen one.
    fn create_unfrozen_version<'a>(
        &'a self,
        existing: &'a AssetIdentifier,
    ) -> RepoFuture<'a, AssetIdentifier>;

    /// Updates name, tags and metadata of an unfrozen version.
    fn update_item<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        update: &'a AssetUpdate,
    ) -> RepoFuture<'a, ()>;

    /// Uploads one local file into an unfrozen version.
    fn upload_file<'a>(&'a self, id: &'a AssetIdentifier, file: &'a UploadFile) -> RepoFuture<'a, ()>;

    /// Removes one file (by destination path) from an unfrozen version.
    fn remove_file<'a>(&'a self, id: &'a AssetIdentifier, path: &'a str) -> RepoFuture<'a, ()>;

    /// Replaces the dependency links of an unfrozen version.
    fn update_dependencies<'a>(
        &'a self,
        id: &'a AssetIdentifier,
        dependencies: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, ()>;

    /// Publishes an unfrozen version; returns its version number.
    fn freeze_version<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, u32>;

    /// Deletes a whole record.
    fn remove_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, ()>;

    /// Discards an unfrozen version, restoring the previous frozen state.
    fn remove_unfrozen_version<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, ()>;

    /// Fetches one record version.
    fn fetch_item<'a>(&'a self, id: &'a AssetIdentifier) -> RepoFuture<'a, AssetRecord>;

    /// Checks a batch of imported records against their latest remote state.
    fn fetch_import_status<'a>(
        &'a self,
        ids: &'a [AssetIdentifier],
    ) -> RepoFuture<'a, HashMap<AssetIdentifier, RemoteSyncStatus>>;
}
