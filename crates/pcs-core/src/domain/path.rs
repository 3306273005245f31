//! Canonical remote pathnames.
//!
//! Mirrors the path handling found across every provider adapter: a single
//! representation normalized so each implementation doesn't have to deal with
//! double slashes, trailing slashes, or encoding quirks on its own.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use super::errors::StorageError;

/// Characters that must be percent-encoded in a path segment, beyond the
/// default control-character set. Slashes are deliberately excluded so a
/// full pathname round-trips as a single path component list.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'%');

/// Immutable remote file pathname, normalized on construction.
///
/// A path always begins with a leading slash and never ends with a trailing
/// one, except for the root path `/`. Backslashes and control characters
/// (code point < 32) are forbidden, as are leading/trailing spaces in any
/// single path segment.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    pathname: String,
}

impl RemotePath {
    /// Parses and normalizes `pathname`, rejecting invalid characters.
    pub fn new(pathname: impl AsRef<str>) -> Result<Self, StorageError> {
        let pathname = pathname.as_ref();
        Self::check(pathname)?;
        Ok(RemotePath {
            pathname: Self::normalize(pathname),
        })
    }

    /// The root folder path, `/`.
    pub fn root() -> Self {
        RemotePath {
            pathname: "/".to_string(),
        }
    }

    /// Full path as a plain string, e.g. `/a/b/c`.
    pub fn path_name(&self) -> &str {
        &self.pathname
    }

    /// Path string with each segment percent-encoded for use in a URL path
    /// (slashes themselves are left untouched).
    pub fn url_encoded(&self) -> String {
        self.pathname
            .split('/')
            .map(|seg| utf8_percent_encode(seg, PATH_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Last path segment, or an empty string if this is the root.
    pub fn base_name(&self) -> &str {
        match self.pathname.rfind('/') {
            Some(idx) => &self.pathname[idx + 1..],
            None => &self.pathname,
        }
    }

    /// True if this is the root path `/`.
    pub fn is_root(&self) -> bool {
        self.pathname == "/"
    }

    /// Parent folder path, or root if this path is already root.
    pub fn parent(&self) -> RemotePath {
        if self.is_root() {
            return self.clone();
        }
        let idx = self.pathname.rfind('/').unwrap_or(0);
        let parent = &self.pathname[..idx];
        RemotePath {
            pathname: if parent.is_empty() {
                "/".to_string()
            } else {
                parent.to_string()
            },
        }
    }

    /// Appends a path segment, returning the child path.
    pub fn add(&self, basename: impl AsRef<str>) -> Result<RemotePath, StorageError> {
        RemotePath::new(format!("{}/{}", self.pathname, basename.as_ref()))
    }

    /// Splits this path into its segments (empty for the root folder).
    pub fn split(&self) -> Vec<&str> {
        if self.is_root() {
            Vec::new()
        } else {
            self.pathname[1..].split('/').collect()
        }
    }

    fn check(pathname: &str) -> Result<(), StorageError> {
        for c in pathname.chars() {
            if (c as u32) < 32 || c == '\\' {
                return Err(StorageError::InvalidPath(format!(
                    "pathname contains invalid char {:?}: {:?}",
                    c, pathname
                )));
            }
        }
        for comp in pathname.split('/') {
            if comp.trim() != comp {
                return Err(StorageError::InvalidPath(format!(
                    "pathname contains leading or trailing spaces: {:?}",
                    pathname
                )));
            }
        }
        Ok(())
    }

    fn normalize(pathname: &str) -> String {
        let mut collapsed = String::with_capacity(pathname.len());
        let mut last_was_slash = false;
        for c in pathname.chars() {
            if c == '/' {
                if !last_was_slash {
                    collapsed.push('/');
                }
                last_was_slash = true;
            } else {
                collapsed.push(c);
                last_was_slash = false;
            }
        }
        let trimmed = collapsed.trim_matches('/');
        format!("/{}", trimmed)
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pathname)
    }
}

impl std::str::FromStr for RemotePath {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RemotePath::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_double_and_trailing_slashes() {
        let p = RemotePath::new("//a//b/c/").unwrap();
        assert_eq!(p.path_name(), "/a/b/c");
    }

    #[test]
    fn root_is_single_slash() {
        assert_eq!(RemotePath::new("").unwrap().path_name(), "/");
        assert_eq!(RemotePath::new("/").unwrap().path_name(), "/");
        assert!(RemotePath::root().is_root());
    }

    #[test]
    fn rejects_backslash_and_control_chars() {
        assert!(RemotePath::new("/a\\b").is_err());
        assert!(RemotePath::new("/a\u{0}b").is_err());
    }

    #[test]
    fn rejects_segment_padding_spaces() {
        assert!(RemotePath::new("/a/ b/c").is_err());
        assert!(RemotePath::new("/a/b /c").is_err());
    }

    #[test]
    fn parent_and_base_name() {
        let p = RemotePath::new("/a/b/c").unwrap();
        assert_eq!(p.base_name(), "c");
        assert_eq!(p.parent().path_name(), "/a/b");
        assert_eq!(p.parent().parent().path_name(), "/a");
        assert_eq!(p.parent().parent().parent().path_name(), "/");
        assert_eq!(RemotePath::root().parent().path_name(), "/");
    }

    #[test]
    fn add_appends_segment() {
        let p = RemotePath::root().add("docs").unwrap().add("a.txt").unwrap();
        assert_eq!(p.path_name(), "/docs/a.txt");
    }

    #[test]
    fn split_returns_segments() {
        assert!(RemotePath::root().split().is_empty());
        assert_eq!(RemotePath::new("/a/b").unwrap().split(), vec!["a", "b"]);
    }

    #[test]
    fn url_encoded_preserves_slashes() {
        let p = RemotePath::new("/a b/c#d").unwrap();
        assert_eq!(p.url_encoded(), "/a%20b/c%23d");
    }
}
