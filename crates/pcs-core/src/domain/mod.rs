//! Provider-neutral domain types.
//!
//! This module contains the core domain types shared by every storage provider
//! adapter: a canonical path representation, the folder/blob file model, quota
//! reporting, and the upload/download request builders.

pub mod errors;
pub mod file;
pub mod path;
pub mod quota;
pub mod request;

pub use errors::StorageError;
pub use file::{RemoteFile, RemoteFolder};
pub use path::RemotePath;
pub use quota::Quota;
pub use request::{ByteRange, DownloadRequest, UploadRequest};
