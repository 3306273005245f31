//! OneDrive adapter (api.onedrive.com v1.0).
//!
//! Grounded on `original_source/.../providers/onedrive.py`'s `OneDriveStorage`.
//! Unlike Google Drive, OneDrive addresses objects by path directly
//! (`/drive/root:/a/b:/children`), so there is no id-resolution chain to walk
//! here. Two quirks carried over verbatim from the original: OneDrive has no
//! notion of content-type on a blob, and a 403/409 response on a write can
//! mean "a blob is shadowing part of this path", which is only distinguishable
//! by walking back up the path and looking.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use pcs_core::domain::file::RemoteBlob;
use pcs_core::domain::{DownloadRequest, Quota, RemoteFile, RemoteFolder, RemotePath, UploadRequest};
use pcs_core::invoker::{build_storage_error, ensure_content_type_is_json, get_content_length, RequestInvoker, Validator};
use pcs_core::ports::{DynStorageProvider, StorageProvider};
use pcs_core::registry::{register_provider, StorageBuilderContext};
use pcs_core::retry::RetryStrategy;
use pcs_core::transfer::{body_from_source, download_to_sink};
use pcs_core::StorageError;
use pcs_oauth::{OAuth2ProviderParameters, OAuth2SessionManager};

const ENDPOINT_DRIVE: &str = "https://api.onedrive.com/v1.0/drive";
const ENDPOINT_DRIVE_ROOT: &str = "https://api.onedrive.com/v1.0/drive/root";
const ENDPOINT_ME: &str = "https://apis.live.net/v5.0/me";

pub fn provider_parameters() -> OAuth2ProviderParameters {
    OAuth2ProviderParameters::new(
        "https://login.live.com/oauth20_authorize.srf",
        "https://login.live.com/oauth20_token.srf",
    )
    .with_refresh_token_url("https://login.live.com/oauth20_token.srf")
    .with_scope_in_authorization(Some(" "))
}

pub fn register() {
    register_provider(
        "onedrive",
        Arc::new(|ctx: StorageBuilderContext| -> Result<DynStorageProvider, StorageError> {
            Ok(Arc::new(OneDriveProvider::new(ctx)?))
        }),
    );
}

pub struct OneDriveProvider {
    invoker: RequestInvoker,
    download_invoker: RequestInvoker,
    retry_strategy: RetryStrategy,
}

impl OneDriveProvider {
    pub fn new(ctx: StorageBuilderContext) -> Result<Self, StorageError> {
        let user_credentials = ctx
            .user_credentials
            .ok_or_else(|| StorageError::Generic("onedrive provider requires saved user credentials".into()))?;
        let session_manager = Arc::new(OAuth2SessionManager::new(
            provider_parameters(),
            ctx.app_info,
            user_credentials,
            ctx.user_credentials_repository,
        ));
        let api_validator: Validator = Arc::new(validate_onedrive_api_response);
        let download_validator: Validator = Arc::new(validate_onedrive_response);
        Ok(OneDriveProvider {
            invoker: RequestInvoker::new(reqwest::Client::new(), session_manager.clone(), api_validator),
            download_invoker: RequestInvoker::new(reqwest::Client::new(), session_manager, download_validator),
            retry_strategy: ctx.retry_strategy,
        })
    }

    /// Fetches the item at `path` directly, or `None` on a 404.
    async fn fetch_item(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
        let url = Url::parse(&drive_item_url(path)).unwrap();
        let response = self
            .invoker
            .invoke(Method::GET, url, Default::default(), None, Some(path))
            .await;
        let response = match response {
            Ok(r) => r,
            Err(StorageError::FileNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let item: OneDriveItem = response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("parsing onedrive item: {e}")))?;
        Ok(Some(parse_item(path, &item)))
    }

    /// Climbs from `path` up to the root, raising [`StorageError::InvalidFileType`]
    /// as soon as a blob is found standing in for a folder. Grounded on
    /// `_raise_if_blob_in_path`, called after a 403 that's otherwise opaque
    /// about which ancestor segment is the culprit.
    async fn raise_if_blob_in_path(&self, path: &RemotePath) -> Result<(), StorageError> {
        let mut cursor = path.clone();
        while !cursor.is_root() {
            if let Some(RemoteFile::Blob(_)) = self.fetch_item(&cursor).await? {
                return Err(StorageError::InvalidFileType {
                    path: cursor,
                    expected_blob: false,
                    message: Some("a file is shadowing part of this path".into()),
                });
            }
            cursor = cursor.parent();
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for OneDriveProvider {
    fn provider_name(&self) -> &'static str {
        "onedrive"
    }

    async fn get_user_id(&self) -> Result<String, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(ENDPOINT_ME).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, None)
                    .await?;
                let me: MeResponse = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing onedrive /me: {e}")))?;
                Ok(me.emails.account)
            })
            .await
    }

    async fn get_quota(&self) -> Result<Quota, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(ENDPOINT_DRIVE).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, None)
                    .await?;
                let drive: DriveRoot = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing onedrive drive info: {e}")))?;
                Ok(Quota::new(drive.quota.used, drive.quota.total))
            })
            .await
    }

    async fn list_folder(&self, path: &RemotePath) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&children_url(path)).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, Some(path))
                    .await;
                let response = match response {
                    Ok(r) => r,
                    Err(StorageError::FileNotFound { .. }) => return Ok(None),
                    Err(e) => return Err(e),
                };
                let page: OneDriveChildren = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing onedrive children: {e}")))?;
                let mut children = HashMap::new();
                for value in &page.value {
                    let name = value.name.as_deref().unwrap_or_default();
                    let child_path = path.add(name)?;
                    children.insert(child_path.clone(), parse_item(&child_path, value));
                }
                if children.is_empty() {
                    // Nothing found: check whether this is an empty folder
                    // or actually a blob before claiming it's a folder.
                    if let Some(RemoteFile::Blob(_)) = self.fetch_item(path).await? {
                        return Err(StorageError::InvalidFileType {
                            path: path.clone(),
                            expected_blob: false,
                            message: Some("path is a file, not a folder".into()),
                        });
                    }
                }
                Ok(Some(children))
            })
            .await
    }

    async fn create_folder(&self, path: &RemotePath) -> Result<bool, StorageError> {
        if path.is_root() {
            return Ok(false);
        }
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&children_url(&path.parent())).unwrap();
                let body = json!({ "name": path.base_name(), "folder": {} });
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
                    .await;
                match response {
                    Ok(_) => Ok(true),
                    Err(e) if e.status_code() == Some(409) => match self.fetch_item(path).await? {
                        Some(RemoteFile::Folder(_)) => Ok(false),
                        Some(RemoteFile::Blob(_)) => Err(StorageError::InvalidFileType {
                            path: path.clone(),
                            expected_blob: false,
                            message: Some("a file already exists at this path".into()),
                        }),
                        None => Err(e),
                    },
                    Err(e) if e.status_code() == Some(403) => {
                        self.raise_if_blob_in_path(path).await?;
                        Err(e)
                    }
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn delete(&self, path: &RemotePath) -> Result<bool, StorageError> {
        if path.is_root() {
            return Err(StorageError::Generic("cannot delete root folder".into()));
        }
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&drive_item_url(path)).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::DELETE, url, Default::default(), None, Some(path))
                    .await;
                match response {
                    Ok(_) => Ok(true),
                    Err(StorageError::FileNotFound { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
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
        self.retry_strategy.invoke_retry(|| self.fetch_item(path)).await
    }

    async fn download(&self, request: DownloadRequest) -> Result<(), StorageError> {
        let path = request.path.clone();
        let sink = request.byte_sink();
        let headers = request.http_headers();
        let result = self
            .retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&content_url(&path)).unwrap();
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
            .await;
        match result {
            Err(StorageError::FileNotFound { .. }) => match self.fetch_item(&path).await? {
                None => Err(StorageError::FileNotFound { path, message: None }),
                Some(RemoteFile::Folder(_)) => Err(StorageError::InvalidFileType {
                    path,
                    expected_blob: true,
                    message: None,
                }),
                Some(RemoteFile::Blob(_)) => Err(StorageError::Generic(format!("not downloadable file: {path}"))),
            },
            other => other,
        }
    }

    async fn upload(&self, request: UploadRequest) -> Result<(), StorageError> {
        let path = request.path.clone();
        let byte_source = request.byte_source();
        self.create_folder(&path.parent()).await?;
        let result = self
            .retry_strategy
            .invoke_retry(|| {
                let byte_source = byte_source.clone();
                async {
                    let url = Url::parse(&content_url(&path)).unwrap();
                    self.invoker
                        .invoke_with_body(Method::PUT, url, Default::default(), Some(&path), move || {
                            Ok(Some(body_from_source(byte_source.clone())))
                        })
                        .await?;
                    Ok(())
                }
            })
            .await;
        match result {
            Err(e) if e.status_code() == Some(409) => match self.fetch_item(&path).await? {
                Some(RemoteFile::Folder(_)) => Err(StorageError::InvalidFileType {
                    path,
                    expected_blob: true,
                    message: Some("a folder already exists at this path".into()),
                }),
                _ => Err(e),
            },
            Err(e) if e.status_code() == Some(403) => {
                self.raise_if_blob_in_path(&path).await?;
                Err(e)
            }
            other => other,
        }
    }
}

fn drive_item_url(path: &RemotePath) -> String {
    if path.is_root() {
        ENDPOINT_DRIVE_ROOT.to_string()
    } else {
        format!("{ENDPOINT_DRIVE_ROOT}:{}", path.url_encoded())
    }
}

fn children_url(path: &RemotePath) -> String {
    if path.is_root() {
        format!("{ENDPOINT_DRIVE_ROOT}/children")
    } else {
        format!("{}:/children", drive_item_url(path))
    }
}

fn content_url(path: &RemotePath) -> String {
    format!("{}:/content", drive_item_url(path))
}

#[derive(Debug, Deserialize)]
struct OneDriveItem {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "lastModifiedDateTime")]
    last_modified: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    folder: Option<Value>,
    #[serde(default)]
    file: Option<Value>,
    #[serde(default)]
    photo: Option<Value>,
    #[serde(default)]
    audio: Option<Value>,
    #[serde(default)]
    video: Option<Value>,
    #[serde(default)]
    album: Option<Value>,
}

impl OneDriveItem {
    /// Grounded on `_is_folder_type`: presence of a `folder`/`album` facet,
    /// not absence of a `file` facet, decides the type.
    fn is_folder(&self) -> bool {
        self.folder.is_some() || self.album.is_some()
    }
}

#[derive(Deserialize)]
struct OneDriveChildren {
    value: Vec<OneDriveItem>,
}

#[derive(Deserialize)]
struct DriveRoot {
    quota: OneDriveQuota,
}

#[derive(Deserialize)]
struct OneDriveQuota {
    total: i64,
    used: i64,
}

#[derive(Deserialize)]
struct MeResponse {
    emails: MeEmails,
}

#[derive(Deserialize)]
struct MeEmails {
    account: String,
}

fn parse_item(path: &RemotePath, item: &OneDriveItem) -> RemoteFile {
    let modification_time = parse_date_time(&item.last_modified);
    if item.is_folder() {
        RemoteFile::Folder(RemoteFolder {
            path: path.clone(),
            file_id: Some(item.id.clone()),
            modification_time,
            metadata: None,
        })
    } else {
        RemoteFile::Blob(RemoteBlob {
            path: path.clone(),
            file_id: Some(item.id.clone()),
            modification_time,
            // OneDrive has no notion of content-type on a blob.
            content_type: None,
            metadata: None,
            length: item.size as i64,
        })
    }
}

fn parse_date_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc)).ok()
}

/// Validates a response for a download or plain API request: status only.
/// Grounded on `_validate_onedrive_response`.
fn validate_onedrive_response(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let err = build_storage_error(response, path, None);
    let code = status.as_u16();
    if code == 429 || (status.is_server_error() && code != 501 && code != 507) {
        Err(err.retriable())
    } else {
        Err(err)
    }
}

/// Validates an API response: status, then JSON content-type when the body
/// is non-empty (a successful DELETE has no body at all). Grounded on
/// `_validate_onedrive_api_response`.
fn validate_onedrive_api_response(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    validate_onedrive_response(response, path)?;
    if matches!(get_content_length(response), Some(len) if len > 0) {
        ensure_content_type_is_json(response, path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_item_url_handles_root_and_nested_paths() {
        assert_eq!(drive_item_url(&RemotePath::root()), ENDPOINT_DRIVE_ROOT);
        assert_eq!(
            drive_item_url(&RemotePath::new("/a/b").unwrap()),
            format!("{ENDPOINT_DRIVE_ROOT}:/a/b")
        );
    }

    #[test]
    fn children_url_differs_for_root() {
        assert_eq!(children_url(&RemotePath::root()), format!("{ENDPOINT_DRIVE_ROOT}/children"));
        assert_eq!(
            children_url(&RemotePath::new("/a").unwrap()),
            format!("{ENDPOINT_DRIVE_ROOT}:/a:/children")
        );
    }

    #[test]
    fn folder_detected_via_facet_presence() {
        let mut item = OneDriveItem {
            id: "1".into(),
            name: Some("docs".into()),
            last_modified: "2020-01-01T00:00:00Z".into(),
            size: 0,
            folder: Some(json!({})),
            file: None,
            photo: None,
            audio: None,
            video: None,
            album: None,
        };
        assert!(item.is_folder());
        item.folder = None;
        item.file = Some(json!({}));
        assert!(!item.is_folder());
    }

    #[test]
    fn parse_item_has_no_content_type() {
        let item = OneDriveItem {
            id: "1".into(),
            name: Some("a.txt".into()),
            last_modified: "2020-01-01T00:00:00Z".into(),
            size: 10,
            folder: None,
            file: Some(json!({})),
            photo: None,
            audio: None,
            video: None,
            album: None,
        };
        let file = parse_item(&RemotePath::new("/a.txt").unwrap(), &item);
        assert_eq!(file.as_blob().unwrap().content_type, None);
    }
}
