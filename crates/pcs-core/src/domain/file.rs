//! Remote file model: the folder/blob sum type every adapter parses its
//! provider-specific listing payload into.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::path::RemotePath;

/// A folder or a blob at a given remote path.
///
/// Grounded on `models.py`'s `CFile`/`CFolder`/`CBlob` hierarchy: rather than
/// a class hierarchy with `is_folder()`/`is_blob()` predicates, this is a Rust
/// sum type so callers pattern-match instead of type-testing.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteFile {
    Folder(RemoteFolder),
    Blob(RemoteBlob),
}

/// Fields common to both a folder and a blob.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFolder {
    pub path: RemotePath,
    pub file_id: Option<String>,
    pub modification_time: Option<DateTime<Utc>>,
    pub metadata: Option<HashMap<String, String>>,
}

/// A leaf object with content: length and an optional content type.
///
/// `length` is `i64`, not `u64`: a provider that doesn't publish a blob's
/// size (Google Docs/Sheets/Slides, which can only be exported, not
/// downloaded as-is) reports `-1` rather than a fabricated `0`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteBlob {
    pub path: RemotePath,
    pub file_id: Option<String>,
    pub modification_time: Option<DateTime<Utc>>,
    pub metadata: Option<HashMap<String, String>>,
    pub length: i64,
    pub content_type: Option<String>,
}

impl RemoteFile {
    pub fn path(&self) -> &RemotePath {
        match self {
            RemoteFile::Folder(f) => &f.path,
            RemoteFile::Blob(b) => &b.path,
        }
    }

    pub fn file_id(&self) -> Option<&str> {
        match self {
            RemoteFile::Folder(f) => f.file_id.as_deref(),
            RemoteFile::Blob(b) => b.file_id.as_deref(),
        }
    }

    pub fn modification_time(&self) -> Option<DateTime<Utc>> {
        match self {
            RemoteFile::Folder(f) => f.modification_time,
            RemoteFile::Blob(b) => b.modification_time,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, RemoteFile::Folder(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, RemoteFile::Blob(_))
    }

    pub fn as_blob(&self) -> Option<&RemoteBlob> {
        match self {
            RemoteFile::Blob(b) => Some(b),
            RemoteFile::Folder(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_and_blob_predicates() {
        let folder = RemoteFile::Folder(RemoteFolder {
            path: RemotePath::root(),
            file_id: None,
            modification_time: None,
            metadata: None,
        });
        assert!(folder.is_folder());
        assert!(!folder.is_blob());

        let blob = RemoteFile::Blob(RemoteBlob {
            path: RemotePath::new("/a.txt").unwrap(),
            file_id: Some("1".into()),
            modification_time: None,
            metadata: None,
            length: 42,
            content_type: Some("text/plain".into()),
        });
        assert!(blob.is_blob());
        assert_eq!(blob.as_blob().unwrap().length, 42);
    }
}
