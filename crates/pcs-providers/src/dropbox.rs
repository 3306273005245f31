//! Dropbox adapter (classic v1 HTTP API).
//!
//! Grounded on `original_source/.../providers/dropbox.py`. Two endpoints are
//! involved: the JSON metadata/fileops API at `api.dropbox.com`, and the
//! separate content host `api-content.dropbox.com` for the actual
//! download/upload byte streams.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;

use pcs_core::domain::file::RemoteBlob;
use pcs_core::domain::{DownloadRequest, Quota, RemoteFile, RemoteFolder, RemotePath, UploadRequest};
use pcs_core::invoker::{build_storage_error, ensure_content_type_is_json, RequestInvoker, Validator};
use pcs_core::ports::{DynStorageProvider, StorageProvider};
use pcs_core::registry::{register_provider, StorageBuilderContext};
use pcs_core::retry::RetryStrategy;
use pcs_core::transfer::{body_from_source, download_to_sink};
use pcs_core::StorageError;
use pcs_oauth::{OAuth2ProviderParameters, OAuth2SessionManager};

const API_ROOT: &str = "https://api.dropbox.com/1";
const CONTENT_ROOT: &str = "https://api-content.dropbox.com/1";

pub fn provider_parameters() -> OAuth2ProviderParameters {
    OAuth2ProviderParameters::new(
        "https://www.dropbox.com/1/oauth2/authorize",
        "https://api.dropbox.com/1/oauth2/token",
    )
}

/// Registers the `dropbox` provider factory. Called once by the application
/// startup code (see `pcs-cli`).
pub fn register() {
    register_provider(
        "dropbox",
        Arc::new(|ctx: StorageBuilderContext| -> Result<DynStorageProvider, StorageError> {
            Ok(Arc::new(DropboxProvider::new(ctx)?))
        }),
    );
}

pub struct DropboxProvider {
    invoker: RequestInvoker,
    retry_strategy: RetryStrategy,
}

impl DropboxProvider {
    pub fn new(ctx: StorageBuilderContext) -> Result<Self, StorageError> {
        let user_credentials = ctx
            .user_credentials
            .ok_or_else(|| StorageError::Generic("dropbox provider requires saved user credentials".into()))?;
        let session_manager = Arc::new(OAuth2SessionManager::new(
            provider_parameters(),
            ctx.app_info,
            user_credentials,
            ctx.user_credentials_repository,
        ));
        let validator: Validator = Arc::new(validate_dropbox_api_response);
        Ok(DropboxProvider {
            invoker: RequestInvoker::new(reqwest::Client::new(), session_manager, validator),
            retry_strategy: ctx.retry_strategy,
        })
    }

    fn metadata_url(&self, path: &RemotePath) -> Url {
        Url::parse(&format!("{API_ROOT}/metadata/dropbox{}", path.url_encoded())).unwrap()
    }

    fn content_url(&self, action: &str, path: &RemotePath) -> Url {
        Url::parse(&format!("{CONTENT_ROOT}/{action}/dropbox{}", path.url_encoded())).unwrap()
    }

    async fn get_metadata(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
        let response = self
            .invoker
            .invoke(Method::GET, self.metadata_url(path), Default::default(), None, Some(path))
            .await;
        let response = match response {
            Ok(r) => r,
            Err(StorageError::FileNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let body: DbxMetadata = response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("parsing dropbox metadata: {e}")))?;
        if body.is_deleted.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(parse_metadata(path, &body)))
    }
}

#[async_trait]
impl StorageProvider for DropboxProvider {
    fn provider_name(&self) -> &'static str {
        "dropbox"
    }

    async fn get_user_id(&self) -> Result<String, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async { Ok(self.account_info().await?.uid.to_string()) })
            .await
    }

    async fn get_quota(&self) -> Result<Quota, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let account = self.account_info().await?;
                let used = account.quota_info.normal + account.quota_info.shared;
                Ok(Quota::new(used, account.quota_info.quota))
            })
            .await
    }

    async fn list_folder(&self, path: &RemotePath) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let response = self
                    .invoker
                    .invoke(Method::GET, self.metadata_url(path), Default::default(), None, Some(path))
                    .await;
                let response = match response {
                    Ok(r) => r,
                    Err(StorageError::FileNotFound { .. }) => return Ok(None),
                    Err(e) => return Err(e),
                };
                let body: DbxMetadata = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing dropbox metadata: {e}")))?;
                if body.is_deleted.unwrap_or(false) {
                    return Ok(None);
                }
                if !body.is_dir {
                    return Err(StorageError::InvalidFileType {
                        path: path.clone(),
                        expected_blob: false,
                        message: Some("path is a file, not a folder".into()),
                    });
                }
                let mut children = HashMap::new();
                for entry in body.contents.clone().unwrap_or_default() {
                    if entry.is_deleted.unwrap_or(false) {
                        continue;
                    }
                    let child_path = RemotePath::new(&entry.path)?;
                    children.insert(child_path.clone(), parse_metadata(&child_path, &entry));
                }
                Ok(Some(children))
            })
            .await
    }

    async fn create_folder(&self, path: &RemotePath) -> Result<bool, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&format!("{API_ROOT}/fileops/create_folder")).unwrap();
                let mut form = HashMap::new();
                form.insert("root", "dropbox");
                form.insert("path", path.path_name());
                let body = serde_urlencoded_form(&form);
                let response = self
                    .invoker
                    .invoke(Method::POST, url, form_headers(), Some(body), Some(path))
                    .await;
                match response {
                    Ok(_) => Ok(true),
                    Err(StorageError::Http { status: 403, .. }) => match self.get_metadata(path).await? {
                        Some(RemoteFile::Folder(_)) => Ok(false),
                        Some(RemoteFile::Blob(_)) => Err(StorageError::InvalidFileType {
                            path: path.clone(),
                            expected_blob: false,
                            message: Some("a file already exists at this path".into()),
                        }),
                        None => Ok(false),
                    },
                    Err(e) => Err(e),
                }
            })
            .await
    }

    async fn delete(&self, path: &RemotePath) -> Result<bool, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&format!("{API_ROOT}/fileops/delete")).unwrap();
                let mut form = HashMap::new();
                form.insert("root", "dropbox");
                form.insert("path", path.path_name());
                let body = serde_urlencoded_form(&form);
                let response = self
                    .invoker
                    .invoke(Method::POST, url, form_headers(), Some(body), Some(path))
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
        self.retry_strategy.invoke_retry(|| self.get_metadata(path)).await
    }

    async fn download(&self, request: DownloadRequest) -> Result<(), StorageError> {
        let url = self.content_url("files", &request.path);
        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in request.http_headers() {
            if let (Ok(name), Ok(v)) = (reqwest::header::HeaderName::from_bytes(key.as_bytes()), value.parse()) {
                headers.insert(name, v);
            }
        }
        let sink = request.byte_sink();
        self.retry_strategy
            .invoke_retry(|| async {
                let response = self
                    .invoker
                    .invoke(Method::GET, url.clone(), headers.clone(), None, Some(&request.path))
                    .await?;
                download_to_sink(response, &sink).await
            })
            .await
    }

    async fn upload(&self, request: UploadRequest) -> Result<(), StorageError> {
        if let Some(RemoteFile::Folder(_)) = self.get_metadata(&request.path).await? {
            return Err(StorageError::InvalidFileType {
                path: request.path.clone(),
                expected_blob: true,
                message: Some("a folder already exists at this path".into()),
            });
        }
        let url = self.content_url("files_put", &request.path);
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(content_type) = request.content_type_ref() {
            headers.insert(reqwest::header::CONTENT_TYPE, content_type.parse().unwrap());
        }
        let byte_source = request.byte_source();
        let path = request.path.clone();
        self.retry_strategy
            .invoke_retry(|| {
                let byte_source = byte_source.clone();
                async {
                    self.invoker
                        .invoke_with_body(Method::PUT, url.clone(), headers.clone(), Some(&path), move || {
                            Ok(Some(body_from_source(byte_source.clone())))
                        })
                        .await?;
                    Ok(())
                }
            })
            .await
    }
}

impl DropboxProvider {
    async fn account_info(&self) -> Result<DbxAccountInfo, StorageError> {
        let url = Url::parse(&format!("{API_ROOT}/account/info")).unwrap();
        let response = self
            .invoker
            .invoke(Method::GET, url, Default::default(), None, None)
            .await?;
        response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("parsing dropbox account info: {e}")))
    }
}

fn form_headers() -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::CONTENT_TYPE,
        "application/x-www-form-urlencoded".parse().unwrap(),
    );
    headers
}

fn serde_urlencoded_form(form: &HashMap<&str, &str>) -> Vec<u8> {
    let encoded: String = form
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    encoded.into_bytes()
}

fn parse_metadata(path: &RemotePath, entry: &DbxMetadata) -> RemoteFile {
    let modification_time = entry.modified.as_deref().and_then(parse_http_date);
    if entry.is_dir {
        RemoteFile::Folder(RemoteFolder {
            path: path.clone(),
            file_id: None,
            modification_time,
            metadata: None,
        })
    } else {
        RemoteFile::Blob(RemoteBlob {
            path: path.clone(),
            file_id: None,
            modification_time,
            metadata: None,
            length: entry.bytes.map(|b| b as i64).unwrap_or(0),
            content_type: entry.mime_type.clone(),
        })
    }
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value).map(|dt| dt.with_timezone(&Utc)).ok()
}

fn validate_dropbox_api_response(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    // A 507 means the user's Dropbox is full: never worth retrying.
    if status.as_u16() == 507 {
        return Err(build_storage_error(response, path, Some("dropbox quota exceeded".into())));
    }
    if status.is_server_error() {
        return Err(build_storage_error(response, path, None).retriable());
    }
    if status == StatusCode::NOT_FOUND {
        return Err(build_storage_error(response, path, None));
    }
    if status == StatusCode::FORBIDDEN {
        // create_folder/403 is handled by the caller; don't demand a JSON
        // content-type on an error body that might be anything.
        return Err(build_storage_error(response, path, None));
    }
    ensure_content_type_is_json(response, path)?;
    Err(build_storage_error(response, path, None))
}

#[derive(Debug, Deserialize)]
struct DbxAccountInfo {
    uid: i64,
    quota_info: DbxQuotaInfo,
}

#[derive(Debug, Deserialize)]
struct DbxQuotaInfo {
    shared: i64,
    quota: i64,
    normal: i64,
}

#[derive(Debug, Deserialize, Default)]
struct DbxMetadata {
    path: String,
    is_dir: bool,
    #[serde(default)]
    is_deleted: Option<bool>,
    #[serde(default)]
    bytes: Option<u64>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    contents: Option<Vec<DbxMetadata>>,
}

mod urlencoding {
    pub fn encode(value: &str) -> String {
        percent_encoding::utf8_percent_encode(value, percent_encoding::NON_ALPHANUMERIC).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_folder_metadata() {
        let entry = DbxMetadata {
            path: "/docs".into(),
            is_dir: true,
            ..Default::default()
        };
        let file = parse_metadata(&RemotePath::new("/docs").unwrap(), &entry);
        assert!(file.is_folder());
    }

    #[test]
    fn parses_blob_metadata_with_length() {
        let entry = DbxMetadata {
            path: "/a.txt".into(),
            is_dir: false,
            bytes: Some(42),
            mime_type: Some("text/plain".into()),
            ..Default::default()
        };
        let file = parse_metadata(&RemotePath::new("/a.txt").unwrap(), &entry);
        assert_eq!(file.as_blob().unwrap().length, 42);
    }
}
