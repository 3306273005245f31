//! Port definitions: the trait boundary every provider adapter implements.
//!
//! Grounded on `storage.py`'s `IStorageProvider` interface. This crate defines
//! the contract only; `pcs-providers` supplies the implementations (one per
//! wire format/provider) along with the request invoker and session manager
//! machinery that doesn't belong in a provider-neutral core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{DownloadRequest, Quota, RemoteFile, RemotePath, StorageError, UploadRequest};

/// The operations every storage provider adapter must implement.
///
/// `list_folder`/`get_file` return `Ok(None)` rather than an error when
/// nothing exists at the given path — the same "missing means `None`, not an
/// error" contract the Python adapters follow.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Short, lowercase identifier such as `"dropbox"` or `"googledrive"`.
    fn provider_name(&self) -> &'static str;

    /// The signed-in user's identifier (usually their email address).
    async fn get_user_id(&self) -> Result<String, StorageError>;

    async fn get_quota(&self) -> Result<Quota, StorageError>;

    async fn list_root_folder(&self) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError> {
        self.list_folder(&RemotePath::root()).await
    }

    async fn list_folder(
        &self,
        path: &RemotePath,
    ) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError>;

    /// Creates a folder (and any missing intermediate folders). Returns
    /// `true` if it was created, `false` if it already existed.
    async fn create_folder(&self, path: &RemotePath) -> Result<bool, StorageError>;

    /// Deletes whatever exists at `path` (folder or blob). Returns `true` if
    /// something was deleted, `false` if nothing existed there.
    async fn delete(&self, path: &RemotePath) -> Result<bool, StorageError>;

    async fn get_file(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError>;

    async fn download(&self, request: DownloadRequest) -> Result<(), StorageError>;

    async fn upload(&self, request: UploadRequest) -> Result<(), StorageError>;
}

/// Type alias for the trait object adapters are registered and retrieved as.
pub type DynStorageProvider = Arc<dyn StorageProvider>;
