//! The normalized error taxonomy every provider adapter maps its wire errors into.
//!
//! Grounded on `cexceptions.py`: a generic storage error, an HTTP-status wrapper,
//! an authentication-specific variant, file-not-found, invalid-file-type (folder
//! requested as blob or vice versa), and a retriable marker that the retry
//! strategy unwraps before it ever reaches a caller.

use thiserror::Error;

use super::path::RemotePath;

/// Errors surfaced by a storage provider operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Catch-all for conditions that don't fit a more specific variant.
    #[error("{0}")]
    Generic(String),

    /// A path string failed validation (forbidden characters, padded segments).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// An HTTP request completed with a non-2xx status.
    #[error("HTTP {method} {path:?} failed: {status} {reason} ({})", message.as_deref().unwrap_or(""))]
    Http {
        method: String,
        path: Option<RemotePath>,
        status: u16,
        reason: String,
        message: Option<String>,
    },

    /// The server rejected the request's credentials (HTTP 401).
    #[error("authentication failed for {path:?}: {status} {reason} ({})", message.as_deref().unwrap_or(""))]
    Authentication {
        method: String,
        path: Option<RemotePath>,
        status: u16,
        reason: String,
        message: Option<String>,
    },

    /// No object exists at the given path (HTTP 404, or provider-specific equivalent).
    #[error("file not found: {path} ({})", message.as_deref().unwrap_or(""))]
    FileNotFound {
        path: RemotePath,
        message: Option<String>,
    },

    /// The object at `path` is a folder when a blob was expected, or vice versa.
    #[error("invalid file type at {path}: expected {} ({})", if *expected_blob { "blob" } else { "folder" }, message.as_deref().unwrap_or(""))]
    InvalidFileType {
        path: RemotePath,
        expected_blob: bool,
        message: Option<String>,
    },

    /// Wraps an underlying error that the retry strategy should retry, rather
    /// than propagate to the caller. Never observed outside the retry loop:
    /// [`crate::retry::RetryStrategy::invoke_retry`] unwraps `cause` before
    /// returning or re-raising.
    #[error("retriable: {cause}")]
    Retriable {
        cause: Box<StorageError>,
        delay: Option<f64>,
    },
}

impl StorageError {
    /// Wraps `self` as a retriable error with the default backoff delay.
    pub fn retriable(self) -> StorageError {
        StorageError::Retriable {
            cause: Box::new(self),
            delay: None,
        }
    }

    /// Wraps `self` as a retriable error that should be retried after `delay`
    /// seconds rather than the retry strategy's computed backoff (a delay of
    /// `0.0` lets the retry loop proceed immediately).
    pub fn retriable_after(self, delay: f64) -> StorageError {
        StorageError::Retriable {
            cause: Box::new(self),
            delay: Some(delay),
        }
    }

    /// HTTP status code carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StorageError::Http { status, .. } => Some(*status),
            StorageError::Authentication { status, .. } => Some(*status),
            StorageError::Retriable { cause, .. } => cause.status_code(),
            _ => None,
        }
    }

    /// The server-provided error message, if one was captured.
    pub fn message(&self) -> Option<&str> {
        match self {
            StorageError::Http { message, .. } => message.as_deref(),
            StorageError::Authentication { message, .. } => message.as_deref(),
            StorageError::FileNotFound { message, .. } => message.as_deref(),
            StorageError::InvalidFileType { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_wraps_and_reports_status() {
        let inner = StorageError::FileNotFound {
            path: RemotePath::root(),
            message: None,
        };
        let wrapped = inner.retriable_after(0.0);
        match &wrapped {
            StorageError::Retriable { delay, .. } => assert_eq!(*delay, Some(0.0)),
            _ => panic!("expected Retriable"),
        }
    }

    #[test]
    fn status_code_passthrough() {
        let err = StorageError::Http {
            method: "GET".into(),
            path: None,
            status: 503,
            reason: "Service Unavailable".into(),
            message: None,
        };
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.retriable().status_code(), Some(503));
    }
}
