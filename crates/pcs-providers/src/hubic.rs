//! hubiC adapter: OAuth2 against hubiC's own API, with the actual file
//! traffic delegated to an OpenStack Swift account hubiC hands out a
//! short-lived token for.
//!
//! Grounded on `original_source/.../providers/hubic.py`'s `HubicStorage`.
//! The Swift token is unrelated to the OAuth2 access token used against the
//! hubiC API: it is fetched lazily from `/account/credentials` and cached in
//! a [`SwiftClient`], matching `_get_swift_client`'s double-checked-lock
//! cache. [`swift::SwiftClient`] never retries on its own (it is built with
//! no outer retry loop of its own); this adapter retries every Swift call
//! itself via [`_swift_caller`](HubicStorage::swift_caller), so that a stale
//! Swift token triggers a fresh `/account/credentials` fetch rather than a
//! plain retry of the same doomed request — matching the Python original's
//! `_swift_caller` wrapper.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Url};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;

use pcs_core::domain::{DownloadRequest, Quota, RemoteFile, RemotePath, UploadRequest};
use pcs_core::invoker::{build_storage_error, ensure_content_type_is_json, RequestInvoker, Validator};
use pcs_core::ports::{DynStorageProvider, StorageProvider};
use pcs_core::registry::{register_provider, StorageBuilderContext};
use pcs_core::retry::RetryStrategy;
use pcs_core::session::SessionManager;
use pcs_core::StorageError;
use pcs_oauth::{OAuth2ProviderParameters, OAuth2SessionManager};

use crate::swift::SwiftClient;

const ROOT: &str = "https://api.hubic.com";
const ENDPOINT: &str = "https://api.hubic.com/1.0";

pub fn provider_parameters() -> OAuth2ProviderParameters {
    OAuth2ProviderParameters::new(format!("{ROOT}/oauth/auth/"), format!("{ROOT}/oauth/token/"))
        .with_refresh_token_url(format!("{ROOT}/oauth/token/"))
        .with_scope_in_authorization(Some(","))
}

pub fn register() {
    register_provider(
        "hubic",
        Arc::new(|ctx: StorageBuilderContext| -> Result<DynStorageProvider, StorageError> {
            Ok(Arc::new(HubicStorage::new(ctx)?))
        }),
    );
}

pub struct HubicStorage {
    invoker: RequestInvoker,
    retry_strategy: RetryStrategy,
    swift_client: AsyncMutex<Option<Arc<SwiftClient>>>,
}

impl HubicStorage {
    pub fn new(ctx: StorageBuilderContext) -> Result<Self, StorageError> {
        let user_credentials = ctx
            .user_credentials
            .ok_or_else(|| StorageError::Generic("hubic provider requires saved user credentials".into()))?;
        let session_manager = Arc::new(OAuth2SessionManager::new(
            provider_parameters(),
            ctx.app_info,
            user_credentials,
            ctx.user_credentials_repository,
        ));
        let validator: Validator = Arc::new(validate_hubic_api_response);
        Ok(HubicStorage {
            invoker: RequestInvoker::new(reqwest::Client::new(), session_manager, validator),
            retry_strategy: ctx.retry_strategy,
            swift_client: AsyncMutex::new(None),
        })
    }

    /// Returns the cached Swift client, fetching fresh Swift credentials and
    /// building a new one if none is cached yet. Mirrors `_get_swift_client`'s
    /// lock-checked-twice pattern, adapted to `tokio::sync::Mutex` (the lock
    /// guards the `Option` itself, so there is nothing to double-check).
    async fn swift_client(&self) -> Result<Arc<SwiftClient>, StorageError> {
        let mut slot = self.swift_client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let url = Url::parse(&format!("{ENDPOINT}/account/credentials")).unwrap();
        let response = self
            .invoker
            .invoke(Method::GET, url, Default::default(), None, None)
            .await?;
        let info: SwiftCredentials = response
            .json()
            .await
            .map_err(|e| StorageError::Generic(format!("parsing swift credentials: {e}")))?;
        let endpoint = Url::parse(&info.endpoint)
            .map_err(|e| StorageError::Generic(format!("invalid swift endpoint url: {e}")))?;
        let swift_session: Arc<dyn SessionManager> = Arc::new(SwiftTokenSessionManager { token: info.token });
        let swift_invoker = RequestInvoker::new(reqwest::Client::new(), swift_session, Arc::new(swift_validate));
        let client = Arc::new(SwiftClient::connect(swift_invoker, endpoint, true).await?);
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn invalidate_swift_client(&self) {
        *self.swift_client.lock().await = None;
    }

    /// Runs `op` against the cached Swift client, invalidating the client and
    /// reporting a zero-delay retriable error if it turns out the cached
    /// Swift token had expired, so the outer [`RetryStrategy`] fetches fresh
    /// credentials on the next attempt instead of repeating the same failed
    /// request. Grounded on `_swift_caller`.
    async fn swift_caller<T, F, Fut>(&self, op: F) -> Result<T, StorageError>
    where
        F: Fn(Arc<SwiftClient>) -> Fut,
        Fut: std::future::Future<Output = Result<T, StorageError>>,
    {
        self.retry_strategy
            .invoke_retry(|| async {
                let client = self.swift_client().await?;
                match op(client).await {
                    Err(StorageError::Authentication { .. }) => {
                        self.invalidate_swift_client().await;
                        Err(StorageError::Generic("swift authentication error".into()).retriable_after(0.0))
                    }
                    other => other,
                }
            })
            .await
    }
}

#[async_trait]
impl StorageProvider for HubicStorage {
    fn provider_name(&self) -> &'static str {
        "hubic"
    }

    async fn get_user_id(&self) -> Result<String, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&format!("{ENDPOINT}/account")).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, None)
                    .await?;
                let account: HubicAccount = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing hubic account: {e}")))?;
                Ok(account.email)
            })
            .await
    }

    async fn get_quota(&self) -> Result<Quota, StorageError> {
        self.retry_strategy
            .invoke_retry(|| async {
                let url = Url::parse(&format!("{ENDPOINT}/account/usage")).unwrap();
                let response = self
                    .invoker
                    .invoke(Method::GET, url, Default::default(), None, None)
                    .await?;
                let usage: HubicUsage = response
                    .json()
                    .await
                    .map_err(|e| StorageError::Generic(format!("parsing hubic usage: {e}")))?;
                Ok(Quota::new(usage.used as i64, usage.quota as i64))
            })
            .await
    }

    async fn list_folder(&self, path: &RemotePath) -> Result<Option<HashMap<RemotePath, RemoteFile>>, StorageError> {
        let path = path.clone();
        self.swift_caller(move |client| {
            let path = path.clone();
            async move { client.list_folder(&path).await }
        })
        .await
    }

    async fn create_folder(&self, path: &RemotePath) -> Result<bool, StorageError> {
        let path = path.clone();
        self.swift_caller(move |client| {
            let path = path.clone();
            async move { client.create_folder(&path).await }
        })
        .await
    }

    async fn delete(&self, path: &RemotePath) -> Result<bool, StorageError> {
        let path = path.clone();
        self.swift_caller(move |client| {
            let path = path.clone();
            async move { client.delete(&path).await }
        })
        .await
    }

    async fn get_file(&self, path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
        let path = path.clone();
        self.swift_caller(move |client| {
            let path = path.clone();
            async move { client.get_file(&path).await }
        })
        .await
    }

    async fn download(&self, request: DownloadRequest) -> Result<(), StorageError> {
        let path = request.path.clone();
        let sink = request.byte_sink();
        let byte_range = request.byte_range();
        self.swift_caller(move |client| {
            let mut fresh = DownloadRequest::new(path.clone(), sink.clone());
            if let Some(range) = byte_range {
                fresh = fresh.range(range.offset, range.length);
            }
            async move { client.download(fresh).await }
        })
        .await
    }

    async fn upload(&self, request: UploadRequest) -> Result<(), StorageError> {
        let path = request.path.clone();
        let byte_source = request.byte_source();
        let content_type = request.content_type_ref().map(str::to_string);
        let metadata = request.metadata_ref().cloned();
        self.swift_caller(move |client| {
            let mut fresh = UploadRequest::new(path.clone(), byte_source.clone());
            if let Some(content_type) = content_type.clone() {
                fresh = fresh.content_type(content_type);
            }
            if let Some(metadata) = metadata.clone() {
                fresh = fresh.metadata(metadata);
            }
            async move { client.upload(fresh).await }
        })
        .await
    }
}

/// Authorizes Swift requests with the short-lived bearer token hubiC handed
/// out through its own API; never attempts to refresh itself (a 401 here
/// means the token has to be re-fetched from hubiC, which is
/// [`HubicStorage::swift_caller`]'s job, not this session manager's).
struct SwiftTokenSessionManager {
    token: String,
}

#[async_trait]
impl SessionManager for SwiftTokenSessionManager {
    async fn authorize(
        &self,
        _method: &Method,
        _url: &Url,
        builder: RequestBuilder,
    ) -> Result<RequestBuilder, StorageError> {
        Ok(builder.header("X-Auth-Token", &self.token))
    }
}

fn swift_validate(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let err = build_storage_error(response, path, None);
    if status.is_server_error() || matches!(status.as_u16(), 498 | 429 | 408) {
        Err(err.retriable())
    } else {
        Err(err)
    }
}

fn validate_hubic_api_response(response: &reqwest::Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(build_storage_error(response, path, None).retriable());
    }
    if !status.is_success() {
        return Err(build_storage_error(response, path, None));
    }
    // hubiC sometimes spuriously redirects to an html error page even on 2xx.
    ensure_content_type_is_json(response, path)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct HubicAccount {
    email: String,
}

#[derive(Debug, Deserialize)]
struct HubicUsage {
    used: u64,
    quota: u64,
}

#[derive(Debug, Deserialize)]
struct SwiftCredentials {
    endpoint: String,
    token: String,
}
