//! The one-time OAuth2 "bootstrap" exchange: turn an app registration into a
//! saved [`UserCredentials`] for one user.
//!
//! Grounded on `session_managers.py`'s `OAuth2SessionManager.get_authorize_url`
//! and `fetch_user_credentials`. The original always drives this from a CLI: it
//! prints an authorization URL, and a human pastes back either the bare
//! authorization code or the full callback URL the provider redirected them
//! to (detected by an `http://`/`https://` prefix). [`LocalCallbackServer`]
//! offers an alternative for providers registered with a loopback redirect
//! URI: it captures the callback automatically instead of asking for a paste.

use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet, Scope, TokenResponse,
    TokenUrl,
};
use pcs_core::credentials::{AppInfo, UserCredentials};
use pcs_core::StorageError;
use serde_json::json;
use url::Url;

use crate::params::OAuth2ProviderParameters;

type OAuthClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

fn build_client(provider_params: &OAuth2ProviderParameters, app_info: &AppInfo) -> Result<OAuthClient, StorageError> {
    let app_id = app_info
        .app_id
        .clone()
        .ok_or_else(|| StorageError::Generic("app is not registered for oauth2".into()))?;
    let auth_url = AuthUrl::new(provider_params.authorize_url.clone())
        .map_err(|e| StorageError::Generic(format!("invalid authorize url: {e}")))?;
    let token_url = TokenUrl::new(provider_params.access_token_url.clone())
        .map_err(|e| StorageError::Generic(format!("invalid access token url: {e}")))?;
    let mut client = BasicClient::new(ClientId::new(app_id))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url);
    if let Some(secret) = &app_info.app_secret {
        client = client.set_client_secret(ClientSecret::new(secret.clone()));
    }
    Ok(client)
}

/// An authorization URL a user must visit, plus the CSRF state to check the
/// callback against once they paste it (or a local server captures it) back.
pub struct PendingAuthorization {
    pub authorize_url: String,
    pub csrf_state: String,
}

/// Builds the URL to send a user's browser to, starting the 3-legged OAuth2
/// dance for `app_info` against `provider_params`.
pub fn authorize_url(
    provider_params: &OAuth2ProviderParameters,
    app_info: &AppInfo,
) -> Result<PendingAuthorization, StorageError> {
    let client = build_client(provider_params, app_info)?;
    let mut request = client.authorize_url(CsrfToken::new_random);
    if provider_params.scope_in_authorization {
        for scope in &app_info.scope {
            request = request.add_scope(Scope::new(scope.clone()));
        }
    }
    let (url, csrf_token) = request.url();
    Ok(PendingAuthorization {
        authorize_url: url.to_string(),
        csrf_state: csrf_token.secret().clone(),
    })
}

struct ParsedCallback {
    code: String,
    state: Option<String>,
    granted_scope: Option<String>,
}

/// Accepts either a bare authorization code or the full URL the provider
/// redirected the browser to, exactly like the original's paste-back flow.
fn parse_code_input(input: &str) -> Result<ParsedCallback, StorageError> {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        let url = Url::parse(input).map_err(|e| StorageError::Generic(format!("invalid callback url: {e}")))?;
        let mut code = None;
        let mut state = None;
        let mut scope = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.to_string()),
                "state" => state = Some(value.to_string()),
                "scope" => scope = Some(value.to_string()),
                _ => {}
            }
        }
        let code = code.ok_or_else(|| StorageError::Generic("callback url carries no code parameter".into()))?;
        Ok(ParsedCallback {
            code,
            state,
            granted_scope: scope,
        })
    } else {
        Ok(ParsedCallback {
            code: input.to_string(),
            state: None,
            granted_scope: None,
        })
    }
}

/// Exchanges the authorization code (or callback URL) for tokens and returns
/// credentials ready to be saved via a
/// [`pcs_core::credentials::UserCredentialsFileRepository`].
///
/// `expected_state` should be the [`PendingAuthorization::csrf_state`] from
/// the matching [`authorize_url`] call; it is only checked when the input is
/// a full callback URL carrying its own `state` parameter.
pub async fn exchange_code(
    provider_params: &OAuth2ProviderParameters,
    app_info: &AppInfo,
    user_id: impl Into<String>,
    code_or_callback_url: &str,
    expected_state: &str,
) -> Result<UserCredentials, StorageError> {
    let parsed = parse_code_input(code_or_callback_url)?;
    if let Some(state) = &parsed.state {
        if state != expected_state {
            return Err(StorageError::Generic(
                "csrf state mismatch: this callback does not match the authorization request".into(),
            ));
        }
    }

    let client = build_client(provider_params, app_info)?;
    let http_client = reqwest::Client::new();
    let token_result = client
        .exchange_code(AuthorizationCode::new(parsed.code))
        .request_async(&http_client)
        .await
        .map_err(|e| StorageError::Generic(format!("token exchange failed: {e}")))?;

    let mut creds = HashMap::new();
    creds.insert(
        "access_token".to_string(),
        json!(token_result.access_token().secret()),
    );
    if let Some(refresh_token) = token_result.refresh_token() {
        creds.insert("refresh_token".to_string(), json!(refresh_token.secret()));
    }
    if let Some(expires_in) = token_result.expires_in() {
        let expires_at = Utc::now() + ChronoDuration::seconds(expires_in.as_secs() as i64);
        creds.insert("expires_at".to_string(), json!(expires_at.to_rfc3339()));
    }
    if let Some(granted) = parsed.granted_scope {
        creds.insert(
            "granted_scope".to_string(),
            json!(provider_params.granted_scope(&granted)),
        );
    }

    Ok(UserCredentials::new(app_info.clone(), user_id, creds))
}

/// Minimal single-shot HTTP server for providers registered with a loopback
/// redirect URI (`http://127.0.0.1:PORT/...`). An opt-in alternative to the
/// default copy-paste flow: start it before opening the authorize URL in a
/// browser, and it resolves with the callback's code and state once the
/// provider redirects back.
pub struct LocalCallbackServer;

/// The code and state extracted from a captured OAuth2 redirect.
#[derive(Debug)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

impl LocalCallbackServer {
    /// Binds `addr` (e.g. `"127.0.0.1:8400"`), accepts exactly one
    /// connection, and returns the callback parameters extracted from it.
    pub async fn listen_once(addr: &str) -> Result<CallbackParams, StorageError> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::net::TcpListener;
        use tokio::sync::oneshot;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StorageError::Generic(format!("failed to bind callback server on {addr}: {e}")))?;

        let (tx, rx) = oneshot::channel::<CallbackParams>();
        let tx = std::sync::Arc::new(tokio::sync::Mutex::new(Some(tx)));

        let (stream, _addr) = listener
            .accept()
            .await
            .map_err(|e| StorageError::Generic(format!("failed to accept callback connection: {e}")))?;
        let io = TokioIo::new(stream);
        let tx_clone = tx.clone();

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            let tx_inner = tx_clone.clone();
            async move {
                let params = parse_callback_uri(&req.uri().to_string());
                match params {
                    Some(callback_params) => {
                        if let Some(sender) = tx_inner.lock().await.take() {
                            let _ = sender.send(callback_params);
                        }
                        Ok::<_, hyper::Error>(
                            Response::builder()
                                .status(StatusCode::OK)
                                .header("Content-Type", "text/html; charset=utf-8")
                                .body(Full::new(Bytes::from(CALLBACK_SUCCESS_HTML)))
                                .unwrap(),
                        )
                    }
                    None => Ok(Response::builder()
                        .status(StatusCode::BAD_REQUEST)
                        .header("Content-Type", "text/html; charset=utf-8")
                        .body(Full::new(Bytes::from("missing authorization code in callback")))
                        .unwrap()),
                }
            }
        });

        tokio::spawn(async move {
            let _ = http1::Builder::new().serve_connection(io, service).await;
        });

        rx.await
            .map_err(|_| StorageError::Generic("callback server closed without receiving a callback".into()))
    }
}

const CALLBACK_SUCCESS_HTML: &str =
    "<html><body><h1>Authorization received</h1><p>You can close this window.</p></body></html>";

fn parse_callback_uri(uri: &str) -> Option<CallbackParams> {
    let url = Url::parse(&format!("http://localhost{uri}")).ok()?;
    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            _ => {}
        }
    }
    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

/// Opens `authorize_url` in the user's default browser.
pub fn open_in_browser(authorize_url: &str) -> Result<(), StorageError> {
    webbrowser::open(authorize_url).map_err(|e| StorageError::Generic(format!("failed to open browser: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> OAuth2ProviderParameters {
        OAuth2ProviderParameters::new("https://example.test/auth", "https://example.test/token")
            .with_refresh_token_url("https://example.test/token")
            .with_scope_in_authorization(None)
    }

    fn app() -> AppInfo {
        AppInfo::new("example", "myapp").with_oauth("client-id", "client-secret", vec!["read".into()], None)
    }

    #[test]
    fn authorize_url_embeds_client_id_and_scope() {
        let pending = authorize_url(&params(), &app()).unwrap();
        assert!(pending.authorize_url.contains("client-id"));
        assert!(pending.authorize_url.contains("scope=read"));
        assert!(!pending.csrf_state.is_empty());
    }

    #[test]
    fn parse_code_input_accepts_bare_code() {
        let parsed = parse_code_input("abc123").unwrap();
        assert_eq!(parsed.code, "abc123");
        assert!(parsed.state.is_none());
    }

    #[test]
    fn parse_code_input_extracts_from_callback_url() {
        let parsed = parse_code_input("https://app.test/cb?code=xyz&state=s1&scope=read%2Cwrite").unwrap();
        assert_eq!(parsed.code, "xyz");
        assert_eq!(parsed.state.as_deref(), Some("s1"));
        assert_eq!(parsed.granted_scope.as_deref(), Some("read,write"));
    }

    #[test]
    fn parse_code_input_rejects_callback_url_without_code() {
        assert!(parse_code_input("https://app.test/cb?state=s1").is_err());
    }

    #[test]
    fn parse_callback_uri_parses_path_and_query() {
        let params = parse_callback_uri("/callback?code=abc&state=xyz").unwrap();
        assert_eq!(params.code, "abc");
        assert_eq!(params.state, "xyz");
    }
}
