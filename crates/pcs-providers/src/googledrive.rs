//! Google Drive adapter (Drive API v2).
//!
//! Grounded on `original_source/.../providers/googledrive.py`'s
//! `GoogleDriveStorage`. Drive addresses objects by opaque id, not path, and
//! offers no "resolve this path" endpoint: every path-based operation here
//! first runs a single `title='a' or title='b' or ...` query across every
//! segment of the path and walks the returned items' parent/child links back
//! into an ordered chain (see [`resolve_path`](GoogleDriveProvider::resolve_path)),
//! exactly like the Python original's `_find_remote_path`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use pcs_core::bytes::ByteSource;
use pcs_core::domain::file::RemoteBlob;
use pcs_core::domain::{DownloadRequest, Quota, RemoteFile, RemoteFolder, RemotePath, UploadRequest};
use pcs_core::invoker::{build_storage_error, ensure_content_type_is_json, RequestInvoker, Validator};
use pcs_core::ports::{DynStorageProvider, StorageProvider};
use pcs_core::registry::{register_provider, StorageBuilderContext};
use pcs_core::retry::RetryStrategy;
use pcs_core::transfer::download_to_sink;
use pcs_core::StorageError;
use pcs_oauth::{OAuth2ProviderParameters, OAuth2SessionManager};

const ENDPOINT: &str = "https://www.googleapis.com/drive/v2";
const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v2/files";
const FILES_UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v2/files";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v1/userinfo";
const MIME_TYPE_DIRECTORY: &str = "application/vnd.google-apps.folder";
const MULTIPART_BOUNDARY: &str = "pcs_api_drive_boundary";

pub fn provider_parameters() -> OAuth2ProviderParameters {
    OAuth2ProviderParameters::new(
        "https://accounts.google.com/o/oauth2/auth?access_type=offline&approval_prompt=force",
        "https://accounts.google.com/o/oauth2/token",
    )
    .with_refresh_token_url("https://accounts.google.com/o/oauth2/token")
    .with_scope_in_authorization(Some(" "))
}

pub fn register() {
    register_provider(
        "googledrive",
        Arc::new(|ctx: StorageBuilderContext| -> Result<DynStorageProvider, StorageError> {
            Ok(Arc::new(GoogleDriveProvider::new(ctx)?))
        }),
    );
}

pub struct GoogleDriveProvider {
    invoker: RequestInvoker,
    /// A raw file download isn't JSON, so it goes through a separate invoker
    /// sharing the same session but without the content-type check.
    download_invoker: RequestInvoker,
    retry_strategy: RetryStrategy,
}

impl GoogleDriveProvider {
    pub fn new(ctx: StorageBuilderContext) -> Result<Self, StorageError> {
        let user_credentials = ctx
            .user_credentials
            .ok_or_else(|| StorageError::Generic("googledrive provider requires saved user credentials".into()))?;
        let session_manager = Arc::new(OAuth2SessionManager::new(
            provider_parameters(),
            ctx.app_info,
            user_credentials,
            ctx.user_credentials_repository,
        ));
        let api_validator: Validator = Arc::new(validate_drive_api_response);
        let download_validator: Validator = Arc::new(validate_drive_response);
        Ok(GoogleDriveProvider {
            invoker: RequestInvoker::new(reqwest::Client::new(), session_manager.clone(), api_validator),
            download_invoker: RequestInvoker::new(reqwest::Client::new(), session_manager, download_validator),
            retry_strategy: ctx.retry_strategy,
        })
    }

    /// Resolves `path` into a chain of Drive items, one per path segment,
    /// truncated at the first segment that doesn't exist. `detailed` also
    /// requests `downloadUrl`/`modifiedDate`/`fileSize`, needed for listing
    /// and downloading but wasted on existence checks before a write.
    async fn resolve_path(&self, path: &RemotePath, detailed: bool) -> Result<ResolvedPath, StorageError> {
        let segments: Vec<String> = path.split().iter().map(|s| s.to_string()).collect();
        if segments.is_empty() {
            return Ok(ResolvedPath {
                segments,
                files_chain: Vec::new(),
            });
        }

        let mut query = String::from("(");
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                query.push_str(" or ");
            }
            query.push_str(&format!("(title='{}')", segment.replace('\'', "\\'")));
        }
        query.push_str(") and trashed = false");

        let mut fields = "id,title,mimeType,parents/id,parents/isRoot".to_string();
        if detailed {
            fields.push_str(",downloadUrl,modifiedDate,fileSize");
        }
        let fields_filter = format!("nextPageToken,items({fields})");

        let mut items: Vec<DriveItem> = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = Url::parse(FILES_ENDPOINT).unwrap();
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("q", &query);
                pairs.append_pair("fields", &fields_filter);
                pairs.append_pair("maxResults", "100");
                if let Some(token) = &page_token {
                    pairs.append_pair("pageToken", token);
                }
            }
            let response = self
                .invoker
                .invoke(Method::GET, url, Default::default(), None, Some(path))
                .await?;
            let page: DrivePage = response
                .json()
                .await
                .map_err(|e| StorageError::Generic(format!("parsing drive file search: {e}")))?;
            items.extend(page.items);
            page_token = page.next_page_token;
            // Drive occasionally answers with an empty page and a
            // nextPageToken anyway; only an absent token means "done".
            if page_token.is_none() {
                break;
            }
        }

        let mut files_chain: Vec<DriveItem> = Vec::new();
        for (i, wanted) in segments.iter().enumerate() {
            let first = i == 0;
            let mut next: Option<DriveItem> = None;
            for item in &items {
                if &item.title != wanted {
                    continue;
                }
                let matches_parent = if first {
                    item.parents.is_empty() || item.parents.iter().any(|p| p.is_root)
                } else {
                    let parent_id = files_chain.last().map(|f: &DriveItem| f.id.as_str()).unwrap_or("");
                    item.parents.iter().any(|p| p.id == parent_id)
                };
                if matches_parent {
                    next = Some(item.clone());
                    break;
                }
            }
            match next {
                Some(item) => files_chain.push(item),
                None => break,
            }
        }
        Ok(ResolvedPath { segments, files_chain })
    }

    /// Creates a single folder with `parent_id`, without creating any
    /// intermediary folders of its own.
    async fn raw_create_folder(&self, path: &RemotePath, parent_id: &str) -> Result<String, StorageError> {
        let mut url = Url::parse(FILES_ENDPOINT).unwrap();
        url.query_pairs_mut().append_pair("fields", "id");
        let body = json!({
            "title": path.base_name(),
            "mimeType": MIME_TYPE_DIRECTORY,
            "parents": [{ "id": parent_id }],
        });
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().unwrap());
        let response = self
            .invoker
            .invoke(
                Method::POST,
                url,
                headers,
                Some(serde_json::to_vec(&body).unwrap()),
                Some(path),
            )
            .await?;
        let created: CreatedId = response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("parsing created folder id: {e}")))?;
        Ok(created.id)
    }
}

#[async_trait]
impl StorageProvider for GoogleDriveProvider {
    fn provider_name(&self) -> &'static str {
        "googledrive"
    }

    async fn get_user_id(&self) -> Result<String, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(USERINFO_ENDPOINT).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, None)
                    .await?;
                let info: UserInfo = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing drive userinfo: {e}")))?;
                Ok(info.email)
            })
            .await
    }

    async fn get_quota(&self) -> Result<Quota, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&format!("{ENDPOINT}/about")).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, None)
                    .await?;
                let about: DriveAbout = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing drive about: {e}")))?;
                let used: i64 = about.quota_bytes_used.parse().unwrap_or(0);
                let total: i64 = about.quota_bytes_total.parse().unwrap_or(0);
                Ok(Quota::new(used, total))
            })
            .await
    }

    async fn list_folder(&self, path: &RemotePath) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let resolved = self.resolve_path(path, true).await?;
                if !resolved.exists() {
                    return Ok(None);
                }
                if resolved.last_is_blob() {
                    return Err(StorageError::InvalidFileType {
                        path: path.clone(),
                        expected_blob: false,
                        message: Some("path is a file, not a folder".into()),
                    });
                }
                let folder_id = resolved.deepest_folder_id();
                let mut query = format!("('{folder_id}' in parents");
                if path.is_root() {
                    // Shared-with-me files only appear here, not nested under
                    // a regular folder id.
                    query.push_str(" or sharedWithMe");
                }
                query.push_str(") and trashed=false");
                let mut url = Url::parse(FILES_ENDPOINT).unwrap();
                {
                    let mut pairs = url.query_pairs_mut();
                    pairs.append_pair("q", &query);
                    pairs.append_pair("fields", "nextPageToken,items(id,title,mimeType,fileSize,modifiedDate)");
                }
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, Some(path))
                    .await?;
                let page: DrivePage = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing drive listing: {e}")))?;
                let mut children = HashMap::new();
                for item in &page.items {
                    let file = parse_drive_item(path, item);
                    children.insert(file.path().clone(), file);
                }
                Ok(Some(children))
            })
            .await
    }

    async fn create_folder(&self, path: &RemotePath) -> Result<bool, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let resolved = self.resolve_path(path, false).await?;
                if resolved.last_is_blob() {
                    return Err(StorageError::InvalidFileType {
                        path: resolved.last_path(),
                        expected_blob: false,
                        message: Some("a file already exists at this path".into()),
                    });
                }
                if resolved.exists() {
                    return Ok(false);
                }
                let mut parent_id = resolved.deepest_folder_id().to_string();
                for depth in resolved.files_chain.len() + 1..=resolved.segments.len() {
                    let current_path = resolved.first_segments_path(depth);
                    parent_id = self.raw_create_folder(&current_path, &parent_id).await?;
                }
                Ok(true)
            })
            .await
    }

    async fn delete(&self, path: &RemotePath) -> Result<bool, StorageError> {
        if path.is_root() {
            return Err(StorageError::Generic("cannot delete root folder".into()));
        }
        self.retry_strategy
            .invoke_retry(|| async {
                let resolved = self.resolve_path(path, false).await?;
                if !resolved.exists() {
                    return Ok(false);
                }
                let file_id = &resolved.files_chain.last().unwrap().id;
                let url = Url::parse(&format!("{ENDPOINT}/files/{file_id}/trash")).unwrap();
                self.invoker
                    .invoke(Method::POST, url, Default::default(), None, Some(path))
                    .await?;
                Ok(true)
            })
            .await
    }

    async fn get_file(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
        if path.is_root() {
            return Ok(Some(RemoteFile::Folder(RemoteFolder {
                path: RemotePath::root(),
                file_id: None,
                modification_time: None,
                metadata: None,
            })));
        }
        self.retry_strategy
            .invoke_retry(|| async {
                let resolved = self.resolve_path(path, true).await?;
                if !resolved.exists() {
                    return Ok(None);
                }
                let item = resolved.files_chain.last().unwrap();
                Ok(Some(parse_drive_item(&path.parent(), item)))
            })
            .await
    }

    async fn download(&self, request: DownloadRequest) -> Result<(), StorageError> {
        let path = request.path.clone();
        let sink = request.byte_sink();
        let headers = request.http_headers();
        self.retry_strategy
            .invoke_retry(|| async {
                let resolved = self.resolve_path(&path, true).await?;
                if !resolved.exists() {
                    return Err(StorageError::FileNotFound {
                        path: path.clone(),
                        message: None,
                    });
                }
                if !resolved.last_is_blob() {
                    return Err(StorageError::InvalidFileType {
                        path: path.clone(),
                        expected_blob: true,
                        message: None,
                    });
                }
                let blob = resolved.files_chain.last().unwrap();
                let download_url = match &blob.download_url {
                    Some(url) => url.clone(),
                    None if blob.mime_type.starts_with("application/vnd.google-apps.") => {
                        return Err(StorageError::InvalidFileType {
                            path: path.clone(),
                            expected_blob: true,
                            message: Some("google docs are not downloadable".into()),
                        });
                    }
                    None => {
                        return Err(StorageError::Generic(format!(
                            "no downloadUrl defined for blob at {path}"
                        )));
                    }
                };
                let url = Url::parse(&download_url)
                    .map_err(|e| StorageError::Generic(format!("invalid drive downloadUrl: {e}")))?;
                let mut header_map = reqwest::header::HeaderMap::new();
                for (key, value) in &headers {
                    if let (Ok(name), Ok(v)) = (reqwest::header::HeaderName::from_bytes(key.as_bytes()), value.parse()) {
                        header_map.insert(name, v);
                    }
                }
                let response = self
                    .download_invoker
                    .invoke(Method::GET, url, header_map, None, Some(&path))
                    .await?;
                download_to_sink(response, &sink).await
            })
            .await
    }

    async fn upload(&self, request: UploadRequest) -> Result<(), StorageError> {
        let path = request.path.clone();
        let content_type = request
            .content_type_ref()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let byte_source = request.byte_source();
        self.retry_strategy
            .invoke_retry(|| async {
                let resolved = self.resolve_path(&path, false).await?;
                if resolved.exists() && !resolved.last_is_blob() {
                    return Err(StorageError::InvalidFileType {
                        path: path.clone(),
                        expected_blob: true,
                        message: Some("a folder already exists at this path".into()),
                    });
                }
                if !resolved.exists() && resolved.last_is_blob() {
                    return Err(StorageError::InvalidFileType {
                        path: resolved.last_path(),
                        expected_blob: false,
                        message: Some("a file exists along this path".into()),
                    });
                }

                let (file_id, parent_id) = if resolved.exists() {
                    (Some(resolved.files_chain.last().unwrap().id.clone()), None)
                } else {
                    let mut parent_id = resolved.deepest_folder_id().to_string();
                    for depth in resolved.files_chain.len() + 1..resolved.segments.len() {
                        let current_path = resolved.first_segments_path(depth);
                        parent_id = self.raw_create_folder(&current_path, &parent_id).await?;
                    }
                    (None, Some(parent_id))
                };

                let mut meta = serde_json::Map::new();
                if let Some(parent_id) = &parent_id {
                    meta.insert("title".into(), json!(path.base_name()));
                    meta.insert("parents".into(), json!([{ "id": parent_id }]));
                }
                // Drive appears to ignore mimeType set here and guesses its
                // own, but the original sets it anyway.
                meta.insert("mimeType".into(), json!(content_type));

                let content = read_all(byte_source.clone()).await?;
                let body = build_multipart_related(&Value::Object(meta), &content_type, &content);

                let mut url = match &file_id {
                    Some(id) => Url::parse(&format!("{FILES_UPLOAD_ENDPOINT}/{id}")).unwrap(),
                    None => Url::parse(FILES_UPLOAD_ENDPOINT).unwrap(),
                };
                url.query_pairs_mut().append_pair("uploadType", "multipart");
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::CONTENT_TYPE,
                    format!("multipart/related; boundary={MULTIPART_BOUNDARY}").parse().unwrap(),
                );
                let method = if file_id.is_some() { Method::PUT } else { Method::POST };
                self.invoker.invoke(method, url, headers, Some(body), Some(&path)).await?;
                Ok(())
            })
            .await
    }
}

/// Reads a byte source to completion off the async runtime. The multipart
/// envelope needs the whole file framed between two boundary lines before
/// the request can be sent, so there is no way to stream it the way a plain
/// PUT body can.
async fn read_all(byte_source: Arc<dyn ByteSource>) -> Result<Vec<u8>, StorageError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
        let mut stream = byte_source.open_stream()?;
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut buf)?;
        Ok(buf)
    })
    .await
    .map_err(|e| StorageError::Generic(format!("reading upload content: {e}")))?
    .map_err(|e| StorageError::Generic(format!("reading upload content: {e}")))
}

fn build_multipart_related(metadata: &Value, content_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
    body
}

/// One step of resolving a [`RemotePath`] into Drive items: a path's segments
/// paired with however much of the matching item chain actually exists.
struct ResolvedPath {
    segments: Vec<String>,
    files_chain: Vec<DriveItem>,
}

impl ResolvedPath {
    fn exists(&self) -> bool {
        self.files_chain.len() == self.segments.len()
    }

    fn last_is_blob(&self) -> bool {
        self.files_chain.last().map(|f| !f.is_folder()).unwrap_or(false)
    }

    /// Id of the deepest existing folder in the chain, or `"root"`.
    fn deepest_folder_id(&self) -> &str {
        match self.files_chain.last() {
            None => "root",
            Some(last) if last.is_folder() => &last.id,
            Some(_) if self.files_chain.len() == 1 => "root",
            Some(_) => &self.files_chain[self.files_chain.len() - 2].id,
        }
    }

    fn first_segments_path(&self, depth: usize) -> RemotePath {
        let joined = self.segments[..depth].join("/");
        RemotePath::new(format!("/{joined}")).expect("segments were already validated by RemotePath::split")
    }

    /// Path of the last item actually found, which may be shorter than the
    /// requested path.
    fn last_path(&self) -> RemotePath {
        self.first_segments_path(self.files_chain.len())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DriveParent {
    id: String,
    #[serde(default, rename = "isRoot")]
    is_root: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct DriveItem {
    id: String,
    title: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(default)]
    parents: Vec<DriveParent>,
    #[serde(default, rename = "fileSize")]
    file_size: Option<String>,
    #[serde(default, rename = "modifiedDate")]
    modified_date: Option<String>,
    #[serde(default, rename = "downloadUrl")]
    download_url: Option<String>,
}

impl DriveItem {
    fn is_folder(&self) -> bool {
        self.mime_type == MIME_TYPE_DIRECTORY
    }
}

#[derive(Deserialize)]
struct DrivePage {
    #[serde(default)]
    items: Vec<DriveItem>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct CreatedId {
    id: String,
}

#[derive(Deserialize)]
struct UserInfo {
    email: String,
}

#[derive(Deserialize)]
struct DriveAbout {
    #[serde(rename = "quotaBytesUsed")]
    quota_bytes_used: String,
    #[serde(rename = "quotaBytesTotal")]
    quota_bytes_total: String,
}

fn parse_drive_item(parent_path: &RemotePath, item: &DriveItem) -> RemoteFile {
    let path = parent_path
        .add(&item.title)
        .unwrap_or_else(|_| parent_path.clone());
    let modification_time = item.modified_date.as_deref().and_then(parse_date_time);
    if item.is_folder() {
        RemoteFile::Folder(RemoteFolder {
            path,
            file_id: Some(item.id.clone()),
            modification_time,
            metadata: None,
        })
    } else {
        // Google-apps documents (docs/sheets/slides) publish no fileSize:
        // they can only be exported, not downloaded as-is, so their length is
        // unknown rather than zero.
        let length = item.file_size.as_deref().and_then(|s| s.parse::<i64>().ok()).unwrap_or(-1);
        RemoteFile::Blob(RemoteBlob {
            path,
            file_id: Some(item.id.clone()),
            modification_time,
            metadata: None,
            length,
            content_type: Some(item.mime_type.clone()),
        })
    }
}

fn parse_date_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).ok()
}

/// Validates a response for a file download or a plain API request: only the
/// status code is checked, content-type is ignored (raw file bytes aren't
/// JSON). Grounded on `_validate_drive_response`.
fn validate_drive_response(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let err = build_storage_error(response, path, None);
    if status.is_server_error() {
        return Err(err.retriable());
    }
    // The original also retries 403s whose JSON error body names
    // rateLimitExceeded/userRateLimitExceeded. Telling those apart from a
    // plain permission-denied 403 means reading the response body, which
    // would consume it before the caller gets a chance to; every other 403
    // here is treated as fatal instead of peeking at the body to decide.
    Err(err)
}

/// Validates an API response: status code, then JSON content-type. Grounded
/// on `_validate_drive_api_response`.
fn validate_drive_api_response(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    validate_drive_response(response, path)?;
    ensure_content_type_is_json(response, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str, mime_type: &str, parent_id: Option<&str>) -> DriveItem {
        DriveItem {
            id: id.to_string(),
            title: title.to_string(),
            mime_type: mime_type.to_string(),
            parents: parent_id
                .map(|p| {
                    vec![DriveParent {
                        id: p.to_string(),
                        is_root: p == "root",
                    }]
                })
                .unwrap_or_default(),
            file_size: None,
            modified_date: None,
            download_url: None,
        }
    }

    #[test]
    fn resolved_path_reports_existence_and_deepest_folder() {
        let chain = vec![item("id_a", "a", MIME_TYPE_DIRECTORY, Some("root"))];
        let resolved = ResolvedPath {
            segments: vec!["a".into(), "b".into()],
            files_chain: chain,
        };
        assert!(!resolved.exists());
        assert_eq!(resolved.deepest_folder_id(), "id_a");
        assert_eq!(resolved.last_path().path_name(), "/a");
    }

    #[test]
    fn resolved_path_empty_chain_is_root() {
        let resolved = ResolvedPath {
            segments: vec!["a".into()],
            files_chain: Vec::new(),
        };
        assert_eq!(resolved.deepest_folder_id(), "root");
        assert!(!resolved.exists());
    }

    #[test]
    fn last_is_blob_when_leaf_is_a_file() {
        let chain = vec![
            item("id_a", "a", MIME_TYPE_DIRECTORY, Some("root")),
            item("id_b", "b.txt", "text/plain", Some("id_a")),
        ];
        let resolved = ResolvedPath {
            segments: vec!["a".into(), "b.txt".into()],
            files_chain: chain,
        };
        assert!(resolved.exists());
        assert!(resolved.last_is_blob());
        assert_eq!(resolved.deepest_folder_id(), "id_a");
    }

    #[test]
    fn parses_folder_and_blob_items() {
        let parent = RemotePath::root();
        let folder = parse_drive_item(&parent, &item("id_a", "docs", MIME_TYPE_DIRECTORY, None));
        assert!(folder.is_folder());

        let mut blob_item = item("id_b", "a.txt", "text/plain", None);
        blob_item.file_size = Some("42".into());
        let blob = parse_drive_item(&parent, &blob_item);
        assert_eq!(blob.as_blob().unwrap().length, 42);
    }

    #[test]
    fn multipart_related_body_contains_both_parts() {
        let body = build_multipart_related(&json!({"title": "a.txt"}), "text/plain", b"hello");
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("Content-Type: application/json; charset=UTF-8"));
        assert!(text.contains("Content-Type: text/plain"));
        assert!(text.contains("hello"));
        assert!(text.starts_with(&format!("--{MULTIPART_BOUNDARY}")));
        assert!(text.trim_end().ends_with(&format!("--{MULTIPART_BOUNDARY}--")));
    }
}
