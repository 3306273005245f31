//! OAuth2 bearer-token session manager with pre-emptive and reactive refresh.
//!
//! Grounded on `oauth/session_managers.py`'s `OAuth2SessionManager`: `authorize`
//! checks the stored `expires_at` before attaching the current access token,
//! refreshing first if it has already passed (mirroring oauthlib raising
//! `TokenExpiredError` from `expires_at` before the request goes out), and
//! `on_unauthorized` is the invoker's one chance to refresh reactively, for
//! the case where the token expired without `expires_at` predicting it. The
//! refresh itself follows the Python original's snapshot-compare pattern:
//! read the access token before taking the lock, read it again after, and
//! skip the network round trip entirely if some other task already refreshed
//! while we were waiting.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RefreshToken, TokenResponse, TokenUrl,
};
use pcs_core::credentials::{AppInfo, UserCredentials, UserCredentialsFileRepository};
use pcs_core::session::SessionManager;
use pcs_core::StorageError;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Url};
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;

use crate::params::OAuth2ProviderParameters;

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Decorates requests with a Bearer access token, refreshing it once if the
/// server answers with a 401.
pub struct OAuth2SessionManager {
    provider_params: OAuth2ProviderParameters,
    app_info: AppInfo,
    user_credentials_repository: Option<Arc<UserCredentialsFileRepository>>,
    credentials: StdMutex<UserCredentials>,
    refresh_lock: AsyncMutex<()>,
}

impl OAuth2SessionManager {
    pub fn new(
        provider_params: OAuth2ProviderParameters,
        app_info: AppInfo,
        user_credentials: UserCredentials,
        user_credentials_repository: Option<Arc<UserCredentialsFileRepository>>,
    ) -> Self {
        OAuth2SessionManager {
            provider_params,
            app_info,
            user_credentials_repository,
            credentials: StdMutex::new(user_credentials),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    fn access_token(&self) -> Option<String> {
        self.credentials
            .lock()
            .unwrap()
            .get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    fn refresh_token(&self) -> Option<String> {
        self.credentials
            .lock()
            .unwrap()
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// The stored access-token expiry, if the credentials bag has one.
    /// Absent for providers that never returned `expires_in`, or before the
    /// first refresh.
    fn expires_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.credentials
            .lock()
            .unwrap()
            .get("expires_at")
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn build_client(&self) -> Result<OAuthClient, StorageError> {
        let app_id = self
            .app_info
            .app_id
            .clone()
            .ok_or_else(|| StorageError::Generic("oauth2 session manager requires an app_id".into()))?;
        let auth_url = AuthUrl::new(self.provider_params.authorize_url.clone())
            .map_err(|e| StorageError::Generic(format!("invalid authorize url: {e}")))?;
        let token_url = TokenUrl::new(self.provider_params.access_token_url.clone())
            .map_err(|e| StorageError::Generic(format!("invalid access token url: {e}")))?;
        let mut client = BasicClient::new(ClientId::new(app_id))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);
        if let Some(secret) = &self.app_info.app_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }
        Ok(client)
    }

    /// Refreshes the access token, unless another caller already did so while
    /// this one was waiting for the lock.
    async fn do_refresh(&self) -> Result<(), StorageError> {
        let refresh_token_url = self.provider_params.refresh_token_url.clone().ok_or_else(|| {
            StorageError::Generic("invalid or expired token; provider does not support token refresh".into())
        })?;
        let refresh_token = self
            .refresh_token()
            .ok_or_else(|| StorageError::Generic("no refresh token available".into()))?;

        let before = self.access_token();
        let _guard = self.refresh_lock.lock().await;
        let after = self.access_token();
        if before != after {
            // Another task refreshed while we waited for the lock.
            return Ok(());
        }

        let client = self.build_client()?;
        let http_client = reqwest::Client::new();
        let token_result = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.clone()))
            .request_async(&http_client)
            .await
            .map_err(|e| StorageError::Generic(format!("token refresh failed against {refresh_token_url}: {e}")))?;

        let new_access_token = token_result.access_token().secret().clone();
        let new_refresh_token = token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .unwrap_or(refresh_token);
        let expires_at = token_result
            .expires_in()
            .map(|d| Utc::now() + ChronoDuration::seconds(d.as_secs() as i64));

        let snapshot = {
            let mut creds = self.credentials.lock().unwrap();
            creds.set("access_token", json!(new_access_token));
            creds.set("refresh_token", json!(new_refresh_token));
            if let Some(expires_at) = expires_at {
                creds.set("expires_at", json!(expires_at.to_rfc3339()));
            }
            creds.clone()
        };
        if let Some(repo) = &self.user_credentials_repository {
            repo.save(&snapshot).map_err(|e| StorageError::Generic(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl SessionManager for OAuth2SessionManager {
    async fn authorize(
        &self,
        _method: &Method,
        _url: &Url,
        builder: RequestBuilder,
    ) -> Result<RequestBuilder, StorageError> {
        // Pre-emptive refresh: if the stored expiry has already passed,
        // refresh before sending the request at all rather than waiting for
        // the server to answer 401.
        if let Some(expires_at) = self.expires_at() {
            if expires_at <= Utc::now() {
                self.do_refresh().await?;
            }
        }
        let token = self
            .access_token()
            .ok_or_else(|| StorageError::Generic("no access token available".into()))?;
        Ok(builder.bearer_auth(token))
    }

    async fn on_unauthorized(&self, _response_headers: &HeaderMap) -> Result<bool, StorageError> {
        self.do_refresh().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn manager_with_credentials(token_url: String, credentials: HashMap<String, serde_json::Value>) -> OAuth2SessionManager {
        let params = OAuth2ProviderParameters::new("https://example.test/auth", token_url.clone())
            .with_refresh_token_url(token_url);
        let app_info = AppInfo::new("example", "myapp").with_oauth("client-id", "client-secret", vec!["read".into()], None);
        let user_credentials = UserCredentials::new(app_info.clone(), "user1", credentials);
        OAuth2SessionManager::new(params, app_info, user_credentials, None)
    }

    #[tokio::test]
    async fn authorize_refreshes_pre_emptively_when_expired() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-token",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "refresh-2",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut credentials = HashMap::new();
        credentials.insert("access_token".to_string(), json!("stale-token"));
        credentials.insert("refresh_token".to_string(), json!("refresh-1"));
        credentials.insert("expires_at".to_string(), json!((Utc::now() - ChronoDuration::seconds(60)).to_rfc3339()));
        let manager = manager_with_credentials(format!("{}/token", server.uri()), credentials);

        let client = reqwest::Client::new();
        let url = Url::parse("https://example.test/x").unwrap();
        let builder = client.get(url.clone());
        let builder = manager.authorize(&Method::GET, &url, builder).await.unwrap();
        let request = builder.build().unwrap();
        let header = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(header, "Bearer fresh-token");
        assert_eq!(manager.refresh_token().as_deref(), Some("refresh-2"));
        server.verify().await;
    }

    #[tokio::test]
    async fn authorize_does_not_refresh_when_token_still_valid() {
        let server = MockServer::start().await;
        // No mock registered for /token: any request to it fails the test.
        let mut credentials = HashMap::new();
        credentials.insert("access_token".to_string(), json!("still-good"));
        credentials.insert("refresh_token".to_string(), json!("refresh-1"));
        credentials.insert(
            "expires_at".to_string(),
            json!((Utc::now() + ChronoDuration::seconds(3600)).to_rfc3339()),
        );
        let manager = manager_with_credentials(format!("{}/token", server.uri()), credentials);

        let client = reqwest::Client::new();
        let url = Url::parse("https://example.test/x").unwrap();
        let builder = client.get(url.clone());
        let builder = manager.authorize(&Method::GET, &url, builder).await.unwrap();
        let request = builder.build().unwrap();
        let header = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert_eq!(header, "Bearer still-good");
    }
}
