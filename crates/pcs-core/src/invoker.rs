//! The request invoker: sends one logical HTTP request through a
//! [`SessionManager`], classifies the response via a provider-supplied
//! [`Validator`], and wraps low-level transport failures so the retry
//! strategy above it knows which errors are worth retrying.
//!
//! Grounded on `models.py`'s `RequestInvoker` (`invoke`/`on_request_error`)
//! and `utils.py`'s response-validation helpers (`buildCStorageError`,
//! `ensure_content_type_is_json/xml`, `shorten_url`). Where the Python
//! version is a base class each provider subclasses to override
//! `do_request`/`validate_response`, this collapses to one struct configured
//! with a validator closure, since Rust doesn't need inheritance to vary
//! that one piece of behavior per provider.

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};

use crate::domain::errors::StorageError;
use crate::domain::path::RemotePath;
use crate::session::SessionManager;

/// Classifies a response that already came back with a status line and
/// headers (the body has not been read yet). Returns `Ok(())` when the
/// response should be handed back to the caller as-is; otherwise builds the
/// exact [`StorageError`] (wrapped `Retriable` where appropriate) the
/// provider wants raised instead.
pub type Validator =
    Arc<dyn Fn(&Response, Option<&RemotePath>) -> Result<(), StorageError> + Send + Sync>;

/// Sends one logical request (with up to one retry after a recoverable
/// `401`) and classifies the result.
pub struct RequestInvoker {
    client: reqwest::Client,
    session_manager: Arc<dyn SessionManager>,
    validator: Validator,
}

impl RequestInvoker {
    pub fn new(
        client: reqwest::Client,
        session_manager: Arc<dyn SessionManager>,
        validator: Validator,
    ) -> Self {
        RequestInvoker {
            client,
            session_manager,
            validator,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Sends a request with a body that can be rebuilt from scratch, which
    /// every caller here can do cheaply: `Vec<u8>` bodies (API calls) just
    /// clone, and streamed upload bodies re-open their [`crate::bytes::ByteSource`].
    /// `make_body` may be invoked twice: once for the initial attempt, and
    /// once more if that attempt fails with a `401` the session manager can
    /// recover from (a Digest challenge, an OAuth2 refresh).
    pub async fn invoke_with_body<B>(
        &self,
        method: Method,
        url: Url,
        headers: reqwest::header::HeaderMap,
        path: Option<&RemotePath>,
        mut make_body: B,
    ) -> Result<Response, StorageError>
    where
        B: FnMut() -> Result<Option<reqwest::Body>, StorageError>,
    {
        let mut retried_auth = false;
        loop {
            let body = make_body()?;
            let mut builder: RequestBuilder =
                self.client.request(method.clone(), url.clone()).headers(headers.clone());
            if let Some(body) = body {
                builder = builder.body(body);
            }
            builder = self.session_manager.authorize(&method, &url, builder).await?;

            let response = builder
                .send()
                .await
                .map_err(|e| Self::map_transport_error(&method, path, &e))?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried_auth {
                retried_auth = true;
                if self
                    .session_manager
                    .on_unauthorized(response.headers())
                    .await?
                {
                    continue;
                }
            }

            (self.validator)(&response, path)?;
            return Ok(response);
        }
    }

    /// Convenience wrapper for requests with a plain in-memory body (JSON,
    /// form-encoded, or none at all) — the overwhelming majority of calls
    /// other than upload.
    pub async fn invoke(
        &self,
        method: Method,
        url: Url,
        headers: reqwest::header::HeaderMap,
        body: Option<Vec<u8>>,
        path: Option<&RemotePath>,
    ) -> Result<Response, StorageError> {
        self.invoke_with_body(method, url, headers, path, move || {
            Ok(body.clone().map(reqwest::Body::from))
        })
        .await
    }

    /// Wraps a transport-level failure (timeout, connection refused/reset)
    /// as retriable, matching `on_request_error`'s
    /// `Timeout`/`ConnectionError`/`ChunkedEncodingError` catch list. Any
    /// other `reqwest::Error` (e.g. a build-time error from a malformed
    /// request) is not retried.
    fn map_transport_error(method: &Method, path: Option<&RemotePath>, error: &reqwest::Error) -> StorageError {
        let message = error.to_string();
        let base = StorageError::Http {
            method: method.to_string(),
            path: path.cloned(),
            status: 0,
            reason: "transport error".to_string(),
            message: Some(message),
        };
        if error.is_timeout() || error.is_connect() || error.is_body() {
            base.retriable()
        } else {
            base
        }
    }
}

/// Strips the query string before a URL is logged or embedded in an error
/// message, so credentials/tokens passed as query params never end up in
/// logs. Grounded on `utils.py`'s `shorten_url`.
pub fn shorten_url(url: &Url) -> String {
    let mut shortened = url.clone();
    shortened.set_query(None);
    shortened.to_string()
}

/// `Content-Length` from a response's headers, if present and well-formed.
pub fn get_content_length(response: &Response) -> Option<u64> {
    response.content_length()
}

/// `Content-Type` from a response's headers, stripped of any `; charset=...`
/// parameters.
pub fn get_content_type(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim())
}

/// Raises (a retriable, since a misbehaving proxy is often transient) error
/// unless the response's content type matches one of `expected`.
pub fn ensure_content_type_in(
    response: &Response,
    path: Option<&RemotePath>,
    expected: &[&str],
) -> Result<(), StorageError> {
    match get_content_type(response) {
        Some(ct) if expected.iter().any(|e| ct.eq_ignore_ascii_case(e)) => Ok(()),
        other => Err(build_storage_error(
            response,
            path,
            Some(format!(
                "expected content-type in {expected:?}, got {:?}",
                other
            )),
        )
        .retriable()),
    }
}

pub fn ensure_content_type_is_json(response: &Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    ensure_content_type_in(response, path, &["application/json", "text/javascript"])
}

pub fn ensure_content_type_is_xml(response: &Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    ensure_content_type_in(response, path, &["application/xml", "text/xml"])
}

/// Builds the normalized [`StorageError`] for a non-2xx response, the
/// central factory every provider's validator delegates to for the generic
/// status codes. Grounded on `utils.py`'s `buildCStorageError`: `401` maps
/// to [`StorageError::Authentication`], `404` to
/// [`StorageError::FileNotFound`], anything else to [`StorageError::Http`].
pub fn build_storage_error(
    response: &Response,
    path: Option<&RemotePath>,
    message: Option<String>,
) -> StorageError {
    let status = response.status();
    // reqwest::Response doesn't retain the request method.
    let method = String::new();
    let reason = status
        .canonical_reason()
        .unwrap_or("unknown status")
        .to_string();
    match status {
        StatusCode::UNAUTHORIZED => StorageError::Authentication {
            method,
            path: path.cloned(),
            status: status.as_u16(),
            reason,
            message,
        },
        StatusCode::NOT_FOUND => StorageError::FileNotFound {
            path: path.cloned().unwrap_or_else(RemotePath::root),
            message,
        },
        _ => StorageError::Http {
            method,
            path: path.cloned(),
            status: status.as_u16(),
            reason,
            message,
        },
    }
}

/// Default status-code classification used by providers whose wire format
/// has no quirks of its own: `2xx` passes, `401`/`404` map to their specific
/// variants, `5xx` is retriable, everything else is fatal. Grounded on the
/// status-to-error-kind mapping shared by every Python `_validate_*_response`
/// that doesn't need special casing.
pub fn default_validate(response: &Response, path: Option<&RemotePath>) -> Result<(), StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let err = build_storage_error(response, path, None);
    if status.is_server_error() {
        Err(err.retriable())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{BasicAuthSessionManager, DigestAuthSessionManager};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn invoker() -> RequestInvoker {
        let session_manager: Arc<dyn SessionManager> =
            Arc::new(BasicAuthSessionManager::new("u", "p").unwrap());
        let validator: Validator = Arc::new(default_validate);
        RequestInvoker::new(reqwest::Client::new(), session_manager, validator)
    }

    #[tokio::test]
    async fn success_response_passes_validator() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&server)
            .await;
        let invoker = invoker();
        let url = Url::parse(&format!("{}/ok", server.uri())).unwrap();
        let response = invoker
            .invoke(Method::GET, url, Default::default(), None, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn server_error_is_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/boom"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let invoker = invoker();
        let url = Url::parse(&format!("{}/boom", server.uri())).unwrap();
        let result = invoker.invoke(Method::GET, url, Default::default(), None, None).await;
        assert!(matches!(result, Err(StorageError::Retriable { .. })));
    }

    #[tokio::test]
    async fn not_found_maps_to_file_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let invoker = invoker();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let result = invoker.invoke(Method::GET, url, Default::default(), None, None).await;
        assert!(matches!(result, Err(StorageError::FileNotFound { .. })));
    }

    #[tokio::test]
    async fn recovers_from_one_unauthorized_via_session_manager() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", r#"Digest realm="r", qop="auth", nonce="n1""#),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let session_manager: Arc<dyn SessionManager> =
            Arc::new(DigestAuthSessionManager::new("bob", "pw").unwrap());
        let validator: Validator = Arc::new(default_validate);
        let invoker = RequestInvoker::new(reqwest::Client::new(), session_manager, validator);
        let url = Url::parse(&format!("{}/doc", server.uri())).unwrap();
        let response = invoker
            .invoke(Method::GET, url, Default::default(), None, None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn second_unauthorized_is_not_retried_again() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/doc"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header("WWW-Authenticate", r#"Digest realm="r", qop="auth", nonce="n1""#),
            )
            .mount(&server)
            .await;

        let session_manager: Arc<dyn SessionManager> =
            Arc::new(DigestAuthSessionManager::new("bob", "pw").unwrap());
        let validator: Validator = Arc::new(default_validate);
        let invoker = RequestInvoker::new(reqwest::Client::new(), session_manager, validator);
        let url = Url::parse(&format!("{}/doc", server.uri())).unwrap();
        let result = invoker.invoke(Method::GET, url, Default::default(), None, None).await;
        assert!(matches!(result, Err(StorageError::Authentication { .. })));
    }

    #[test]
    fn shorten_url_strips_query() {
        let url = Url::parse("https://example.test/a?token=secret").unwrap();
        assert_eq!(shorten_url(&url), "https://example.test/a");
    }
}
