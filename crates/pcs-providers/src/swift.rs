//! OpenStack Swift sub-client shared by the hubiC adapter.
//!
//! Grounded on `original_source/.../providers/swift.py`'s `SwiftClient`. This
//! is not itself a [`pcs_core::ports::StorageProvider`]: hubiC is the only
//! provider in this workspace that speaks Swift, and it layers its own
//! OAuth2/retry concerns on top (see `hubic.rs`). Keeping this as a plain
//! client, rather than folding it directly into `hubic.rs`, mirrors the
//! Python original's choice to make `SwiftClient` reusable on its own.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Method, StatusCode, Url};

use pcs_core::domain::file::RemoteBlob;
use pcs_core::domain::{DownloadRequest, RemoteFile, RemoteFolder, RemotePath, UploadRequest};
use pcs_core::invoker::{build_storage_error, RequestInvoker};
use pcs_core::transfer::{body_from_source, download_to_sink};
use pcs_core::StorageError;

/// Content-type Swift uses to mark a zero-length object as standing in for a
/// directory. Only relevant when `with_directory_markers` is enabled: some
/// Swift deployments (hubiC's) don't need explicit markers because listing
/// with a `/` delimiter already reports implicit "subdir" entries.
pub const CONTENT_TYPE_DIRECTORY: &str = "application/directory";

/// A connected Swift account scoped to one container.
pub struct SwiftClient {
    invoker: RequestInvoker,
    endpoint: Url,
    container: String,
    with_directory_markers: bool,
}

impl SwiftClient {
    /// Connects to `endpoint` (the account URL returned by the auth step,
    /// e.g. `https://swift.hubic.com/v1/AUTH_xxx`) and selects the first
    /// container found, matching `use_first_container()`.
    pub async fn connect(
        invoker: RequestInvoker,
        endpoint: Url,
        with_directory_markers: bool,
    ) -> Result<Self, StorageError> {
        let mut client = SwiftClient {
            invoker,
            endpoint,
            container: String::new(),
            with_directory_markers,
        };
        let containers = client.list_containers().await?;
        let first = containers
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Generic("swift account has no containers".into()))?;
        client.container = first;
        Ok(client)
    }

    async fn list_containers(&self) -> Result<Vec<String>, StorageError> {
        let response = self
            .invoker
            .invoke(Method::GET, self.endpoint.clone(), Default::default(), None, None)
            .await?;
        validate(&response, None)?;
        let text = response
            .text()
            .await
            .map_err(|e| StorageError::Generic(format!("reading container list: {e}")))?;
        Ok(text.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
    }

    fn container_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().expect("base url cannot be a cannot-be-a-base url");
            segments.push(&self.container);
        }
        url
    }

    fn object_url(&self, path: &RemotePath) -> Url {
        let mut url = self.container_url();
        {
            let mut segments = url.path_segments_mut().expect("swift container url has segments");
            for segment in path.split() {
                segments.push(segment);
            }
        }
        url
    }

    /// HEAD on an object, translating the response into a [`RemoteFile`] or
    /// `None` on a 404. Grounded on `_head_or_none`.
    pub async fn head_or_none(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
        let url = self.object_url(path);
        let response = self
            .invoker
            .invoke(Method::HEAD, url, Default::default(), None, Some(path))
            .await;
        let response = match response {
            Ok(response) => response,
            Err(StorageError::FileNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(parse_head(path, &response)))
    }

    /// Lists the immediate children of `path` using `delimiter=/`. Grounded
    /// on `list_folder`.
    pub async fn list_folder(&self, path: &RemotePath) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError> {
        let prefix = folder_prefix(path);
        let mut url = self.container_url();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            pairs.append_pair("delimiter", "/");
            if !prefix.is_empty() {
                pairs.append_pair("prefix", &prefix);
            }
        }
        let response = self
            .invoker
            .invoke(Method::GET, url, Default::default(), None, Some(path))
            .await?;
        validate(&response, Some(path))?;
        let entries: Vec<SwiftListEntry> = response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("parsing swift listing: {e}")))?;

        if entries.is_empty() {
            // Swift returns an empty list both for "empty folder" and "not a
            // folder at all"; disambiguate with a HEAD, like the original.
            return match self.head_or_none(path).await? {
                Some(RemoteFile::Folder(_)) => Ok(Some(HashMap::new())),
                Some(RemoteFile::Blob(_)) | None => Ok(None),
            };
        }

        let mut children = HashMap::new();
        for entry in entries {
            if let Some(subdir) = entry.subdir {
                let child_path = RemotePath::new(format!("/{}", subdir.trim_end_matches('/')))?;
                children.insert(
                    child_path.clone(),
                    RemoteFile::Folder(RemoteFolder {
                        path: child_path,
                        file_id: None,
                        modification_time: None,
                        metadata: None,
                    }),
                );
                continue;
            }
            let name = match &entry.name {
                Some(n) => n,
                None => continue,
            };
            let child_path = RemotePath::new(format!("/{name}"))?;
            let is_dir = entry.content_type.as_deref() == Some(CONTENT_TYPE_DIRECTORY);
            let file = if is_dir {
                RemoteFile::Folder(RemoteFolder {
                    path: child_path.clone(),
                    file_id: None,
                    modification_time: entry.last_modified.as_deref().and_then(parse_last_modified),
                    metadata: None,
                })
            } else {
                RemoteFile::Blob(RemoteBlob {
                    path: child_path.clone(),
                    file_id: None,
                    modification_time: entry.last_modified.as_deref().and_then(parse_last_modified),
                    metadata: None,
                    length: entry.bytes.map(|b| b as i64).unwrap_or(-1),
                    content_type: entry.content_type.clone(),
                })
            };
            children.insert(child_path, file);
        }
        Ok(Some(children))
    }

    /// Creates `path` and any missing ancestor directory markers. Grounded on
    /// `create_intermediary_folders_objects`: walks up from `path` looking
    /// for the deepest existing ancestor, then creates markers back down.
    pub async fn create_folder(&self, path: &RemotePath) -> Result<bool, StorageError> {
        if path.is_root() {
            return Ok(false);
        }
        if !self.with_directory_markers {
            // No explicit markers: folders only exist implicitly, as the
            // common prefix of the objects placed under them.
            return Ok(self.head_or_none(path).await?.is_none());
        }
        let mut to_create = Vec::new();
        let mut cursor = path.clone();
        loop {
            match self.head_or_none(&cursor).await? {
                Some(RemoteFile::Folder(_)) => break,
                Some(RemoteFile::Blob(_)) => {
                    return Err(StorageError::InvalidFileType {
                        path: cursor,
                        expected_blob: false,
                        message: Some("a file exists where a folder is needed".into()),
                    })
                }
                None => {
                    to_create.push(cursor.clone());
                    if cursor.is_root() {
                        break;
                    }
                    cursor = cursor.parent();
                }
            }
        }
        let already_existed = to_create.is_empty() || !to_create.contains(path);
        for folder_path in to_create.into_iter().rev() {
            self.put_directory_marker(&folder_path).await?;
        }
        Ok(!already_existed)
    }

    async fn put_directory_marker(&self, path: &RemotePath) -> Result<(), StorageError> {
        let url = self.object_url(path);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            CONTENT_TYPE_DIRECTORY.parse().unwrap(),
        );
        let response = self
            .invoker
            .invoke_with_body(Method::PUT, url, headers, Some(path), || Ok(Some(reqwest::Body::from(Vec::new()))))
            .await?;
        validate(&response, Some(path))
    }

    /// Deletes `path`, recursively if it is a folder. Grounded on `delete`:
    /// lists everything under the prefix (no delimiter), sorts deepest-first,
    /// and deletes one object at a time, tolerating objects that vanish
    /// mid-walk.
    pub async fn delete(&self, path: &RemotePath) -> Result<bool, StorageError> {
        if self.head_or_none(path).await?.is_none() {
            return Ok(false);
        }
        let mut victims = vec![path.clone()];
        let prefix = folder_prefix(path);
        let mut url = self.container_url();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("format", "json");
            if !prefix.is_empty() {
                pairs.append_pair("prefix", &prefix);
            }
        }
        let response = self
            .invoker
            .invoke(Method::GET, url, Default::default(), None, Some(path))
            .await?;
        if response.status() != StatusCode::NOT_FOUND {
            validate(&response, Some(path))?;
            let entries: Vec<SwiftListEntry> = response
                .json()
                .await
                .map_err(|e| StorageError::Generic(format!("parsing swift listing: {e}")))?;
            for entry in entries {
                if let Some(name) = entry.name {
                    if let Ok(child_path) = RemotePath::new(format!("/{name}")) {
                        if child_path != *path {
                            victims.push(child_path);
                        }
                    }
                }
            }
        }
        victims.sort_by(|a, b| b.path_name().len().cmp(&a.path_name().len()));
        for victim in victims {
            let url = self.object_url(&victim);
            let response = self
                .invoker
                .invoke(Method::DELETE, url, Default::default(), None, Some(&victim))
                .await;
            match response {
                Ok(_) => {}
                Err(StorageError::FileNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub async fn get_file(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
        self.head_or_none(path).await
    }

    /// Downloads `request.path`'s content. Grounded on `download`/`_do_download`.
    pub async fn download(&self, request: DownloadRequest) -> Result<(), StorageError> {
        let url = self.object_url(&request.path);
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in request.http_headers() {
            if let Ok(name) = reqwest::header::HeaderName::from_bytes(key.as_bytes()) {
                if let Ok(v) = value.parse() {
                    headers.insert(name, v);
                }
            }
        }
        let response = self
            .invoker
            .invoke(Method::GET, url, headers, None, Some(&request.path))
            .await?;
        let sink = request.byte_sink();
        download_to_sink(response, &sink).await
    }

    /// Uploads `request.path`'s content, creating any missing parent folder
    /// markers first. Grounded on `upload`/`_do_upload`.
    pub async fn upload(&self, request: UploadRequest) -> Result<(), StorageError> {
        let parent = request.path.parent();
        if !parent.is_root() {
            self.create_folder(&parent).await?;
        }
        let url = self.object_url(&request.path);
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(content_type) = request.content_type_ref() {
            headers.insert(reqwest::header::CONTENT_TYPE, content_type.parse().unwrap());
        }
        if let Some(metadata) = request.metadata_ref() {
            add_metadata_headers(&mut headers, metadata);
        }
        let byte_source = request.byte_source();
        let path = request.path.clone();
        let response = self
            .invoker
            .invoke_with_body(Method::PUT, url, headers, Some(&path), move || {
                Ok(Some(body_from_source(byte_source.clone())))
            })
            .await?;
        validate(&response, Some(&path))
    }
}

fn folder_prefix(path: &RemotePath) -> String {
    if path.is_root() {
        String::new()
    } else {
        format!("{}/", &path.path_name()[1..])
    }
}

fn parse_head(path: &RemotePath, response: &reqwest::Response) -> RemoteFile {
    let headers = response.headers();
    let content_type = headers
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let modification_time = headers
        .get(reqwest::header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_last_modified);
    let metadata = parse_x_meta_headers(headers);
    if content_type.as_deref() == Some(CONTENT_TYPE_DIRECTORY) {
        RemoteFile::Folder(RemoteFolder {
            path: path.clone(),
            file_id: None,
            modification_time,
            metadata: Some(metadata),
        })
    } else {
        let length = response.content_length().map(|n| n as i64).unwrap_or(-1);
        RemoteFile::Blob(RemoteBlob {
            path: path.clone(),
            file_id: None,
            modification_time,
            metadata: Some(metadata),
            length,
            content_type,
        })
    }
}

/// Parses a Swift `Last-Modified`/`x-object-meta-mtime` timestamp, adding a
/// `+0000` timezone suffix the way the original does when the value lacks one.
fn parse_last_modified(value: &str) -> Option<DateTime<Utc>> {
    let with_tz = if value.ends_with('Z') || value.contains('+') {
        value.to_string()
    } else {
        format!("{value} +0000")
    };
    DateTime::parse_from_rfc2822(&with_tz)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

/// Reads `x-object-meta-*` headers into a plain metadata map. Grounded on
/// `parse_x_meta_headers`.
fn parse_x_meta_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (name, value) in headers.iter() {
        if let Some(key) = name.as_str().strip_prefix("x-object-meta-") {
            if let Ok(value) = value.to_str() {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }
    metadata
}

/// Writes `metadata` as `x-object-meta-*` headers, escaping characters HTTP
/// headers can't carry raw. Grounded on `add_metadata_headers`.
fn add_metadata_headers(headers: &mut reqwest::header::HeaderMap, metadata: &HashMap<String, String>) {
    for (key, value) in metadata {
        let header_name = format!("x-object-meta-{key}");
        let escaped = value.replace('\r', "").replace('\n', "");
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(header_name.as_bytes()),
            escaped.parse(),
        ) {
            headers.insert(name, value);
        }
    }
}

fn validate(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let err = build_storage_error(response, path, None);
    // Swift servers answer overload/timeouts with 498/429/408 in addition to
    // the usual 5xx range; all are worth retrying.
    if status.is_server_error() || matches!(status.as_u16(), 498 | 429 | 408) {
        Err(err.retriable())
    } else if status == StatusCode::NOT_FOUND {
        Err(err)
    } else {
        Err(err)
    }
}

#[derive(serde::Deserialize)]
struct SwiftListEntry {
    name: Option<String>,
    subdir: Option<String>,
    bytes: Option<u64>,
    content_type: Option<String>,
    last_modified: Option<String>,
}

/// Builds a [`SwiftClient`] plus whatever the caller passed as the account
/// endpoint URL; kept separate from the struct's own constructor so callers
/// (hubiC) can retain the `Arc` they build the invoker with.
pub async fn connect_with_invoker(
    invoker: RequestInvoker,
    endpoint: Url,
    with_directory_markers: bool,
) -> Result<Arc<SwiftClient>, StorageError> {
    Ok(Arc::new(SwiftClient::connect(invoker, endpoint, with_directory_markers).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_prefix_strips_leading_slash_and_appends_trailing() {
        let path = RemotePath::new("/a/b").unwrap();
        assert_eq!(folder_prefix(&path), "a/b/");
        assert_eq!(folder_prefix(&RemotePath::root()), "");
    }

    #[test]
    fn parses_rfc2822_and_naive_timestamps() {
        assert!(parse_last_modified("Wed, 01 Mar 2023 10:00:00").is_some());
        assert!(parse_last_modified("2023-03-01T10:00:00.123456").is_some());
    }
}
