//! Session managers: the part of a provider adapter that decorates outgoing
//! requests with credentials and knows how to recover from a single `401`.
//!
//! Grounded on `oauth/session_managers.py`'s `AbstractSessionManager`
//! hierarchy. `BasicAuthSessionManager` and `DigestAuthSessionManager` are
//! complete here; the OAuth2 variant lives in `pcs-oauth` since it needs the
//! `oauth2` crate and a credentials repository to persist refreshed tokens.
//!
//! Unlike the Python version (one `do_request`/`get_session` pair per
//! subclass), every manager implements the same two-method contract so
//! [`crate::invoker::RequestInvoker`] can treat them uniformly: `authorize`
//! decorates a request builder before it is sent, and `on_unauthorized` is
//! given one chance to update internal state (a refreshed token, a newly
//! solved Digest challenge) after a `401`, telling the invoker whether
//! retrying once more is worth it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::RngCore;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Url};

use crate::domain::errors::StorageError;

/// Decorates outgoing requests with credentials for one provider session.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Adds whatever headers/auth this session needs to `builder`.
    async fn authorize(
        &self,
        method: &Method,
        url: &Url,
        builder: RequestBuilder,
    ) -> Result<RequestBuilder, StorageError>;

    /// Called at most once per logical request, right after a `401`. An
    /// implementation that can recover (refresh an OAuth2 token, solve a
    /// Digest challenge) updates its internal state and returns `Ok(true)`
    /// to ask the invoker to rebuild and resend the request via `authorize`.
    /// The default means "this session cannot recover from a 401".
    async fn on_unauthorized(&self, _response_headers: &HeaderMap) -> Result<bool, StorageError> {
        Ok(false)
    }
}

/// HTTP Basic auth: a fixed user id/password pair, never refreshed.
pub struct BasicAuthSessionManager {
    user_id: String,
    password: String,
}

impl BasicAuthSessionManager {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Result<Self, StorageError> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(StorageError::Generic(
                "basic auth session manager requires a user id".into(),
            ));
        }
        Ok(BasicAuthSessionManager {
            user_id,
            password: password.into(),
        })
    }
}

#[async_trait]
impl SessionManager for BasicAuthSessionManager {
    async fn authorize(
        &self,
        _method: &Method,
        _url: &Url,
        builder: RequestBuilder,
    ) -> Result<RequestBuilder, StorageError> {
        Ok(builder.basic_auth(&self.user_id, Some(&self.password)))
    }
}

#[derive(Clone)]
struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    qop: Option<String>,
    algorithm: String,
    nonce_count: u32,
}

/// HTTP Digest auth (RFC 2617). Caches the server's challenge so every
/// request after the first can compute its `Authorization` header directly
/// instead of round-tripping a bare request just to receive the `401` again.
///
/// The Python original caches this per `threading.local()`; a `tokio` task
/// isn't pinned to an OS thread, so the cache here is a single `Mutex`
/// shared by every task that uses this session manager instead.
pub struct DigestAuthSessionManager {
    user_id: String,
    password: String,
    challenge: Mutex<Option<DigestChallenge>>,
}

impl DigestAuthSessionManager {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Result<Self, StorageError> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(StorageError::Generic(
                "digest auth session manager requires a user id".into(),
            ));
        }
        Ok(DigestAuthSessionManager {
            user_id,
            password: password.into(),
            challenge: Mutex::new(None),
        })
    }

    fn digest_header(&self, method: &Method, url: &Url, challenge: &mut DigestChallenge) -> String {
        challenge.nonce_count += 1;
        let nc = format!("{:08x}", challenge.nonce_count);
        let cnonce = format!("{:016x}", rand::thread_rng().next_u64());
        let uri = Self::request_uri(url);
        let ha1 = md5_hex(&format!("{}:{}:{}", self.user_id, challenge.realm, self.password));
        let ha2 = md5_hex(&format!("{}:{}", method.as_str(), uri));
        let qop = challenge.qop.as_deref().unwrap_or("");
        let response = if qop.is_empty() {
            md5_hex(&format!("{}:{}:{}", ha1, challenge.nonce, ha2))
        } else {
            md5_hex(&format!(
                "{}:{}:{}:{}:{}:{}",
                ha1, challenge.nonce, nc, cnonce, qop, ha2
            ))
        };
        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            self.user_id, challenge.realm, challenge.nonce, uri, response, challenge.algorithm
        );
        if !qop.is_empty() {
            header.push_str(&format!(", qop={qop}, nc={nc}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        header
    }

    fn request_uri(url: &Url) -> String {
        match url.query() {
            Some(q) => format!("{}?{}", url.path(), q),
            None => url.path().to_string(),
        }
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

#[async_trait]
impl SessionManager for DigestAuthSessionManager {
    async fn authorize(
        &self,
        method: &Method,
        url: &Url,
        builder: RequestBuilder,
    ) -> Result<RequestBuilder, StorageError> {
        let mut guard = self.challenge.lock().unwrap();
        match guard.as_mut() {
            // No challenge yet: send unauthenticated and let `on_unauthorized`
            // learn the realm/nonce from the 401 that comes back.
            None => Ok(builder),
            Some(challenge) => {
                let header = self.digest_header(method, url, challenge);
                Ok(builder.header(reqwest::header::AUTHORIZATION, header))
            }
        }
    }

    async fn on_unauthorized(&self, response_headers: &HeaderMap) -> Result<bool, StorageError> {
        let header_value = response_headers
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                StorageError::Generic("401 response carried no WWW-Authenticate header".into())
            })?;
        let challenge = parse_digest_challenge(header_value)?;
        *self.challenge.lock().unwrap() = Some(challenge);
        Ok(true)
    }
}

fn parse_digest_challenge(header_value: &str) -> Result<DigestChallenge, StorageError> {
    let rest = header_value.trim().strip_prefix("Digest ").ok_or_else(|| {
        StorageError::Generic(format!("not a Digest challenge: {header_value}"))
    })?;
    let mut params: HashMap<String, String> = HashMap::new();
    for part in split_digest_params(rest) {
        if let Some((key, value)) = part.split_once('=') {
            let value = value.trim().trim_matches('"').to_string();
            params.insert(key.trim().to_ascii_lowercase(), value);
        }
    }
    let realm = params
        .remove("realm")
        .ok_or_else(|| StorageError::Generic("digest challenge missing realm".into()))?;
    let nonce = params
        .remove("nonce")
        .ok_or_else(|| StorageError::Generic("digest challenge missing nonce".into()))?;
    Ok(DigestChallenge {
        realm,
        nonce,
        opaque: params.remove("opaque"),
        qop: params
            .remove("qop")
            .map(|q| q.split(',').next().unwrap_or("auth").trim().to_string()),
        algorithm: params.remove("algorithm").unwrap_or_else(|| "MD5".to_string()),
        nonce_count: 0,
    })
}

/// Splits comma-separated Digest challenge params while respecting commas
/// that appear inside quoted values (none of the standard params need one,
/// but `domain` can list several space-separated URIs inside its quotes).
fn split_digest_params(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_auth_rejects_empty_user_id() {
        assert!(BasicAuthSessionManager::new("", "pw").is_err());
    }

    #[tokio::test]
    async fn basic_auth_sets_header() {
        let manager = BasicAuthSessionManager::new("alice", "secret").unwrap();
        let client = reqwest::Client::new();
        let url = Url::parse("https://example.test/x").unwrap();
        let builder = client.get(url.clone());
        let builder = manager.authorize(&Method::GET, &url, builder).await.unwrap();
        let request = builder.build().unwrap();
        assert!(request.headers().contains_key(reqwest::header::AUTHORIZATION));
    }

    #[test]
    fn parses_digest_challenge_with_qop() {
        let header = r#"Digest realm="cloudme", qop="auth", nonce="abc123", opaque="xyz""#;
        let challenge = parse_digest_challenge(header).unwrap();
        assert_eq!(challenge.realm, "cloudme");
        assert_eq!(challenge.nonce, "abc123");
        assert_eq!(challenge.qop.as_deref(), Some("auth"));
        assert_eq!(challenge.opaque.as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn digest_auth_sends_unauthenticated_until_challenged() {
        let manager = DigestAuthSessionManager::new("bob", "pw").unwrap();
        let client = reqwest::Client::new();
        let url = Url::parse("https://example.test/doc").unwrap();
        let builder = client.get(url.clone());
        let builder = manager.authorize(&Method::GET, &url, builder).await.unwrap();
        let request = builder.build().unwrap();
        assert!(!request.headers().contains_key(reqwest::header::AUTHORIZATION));
    }

    #[tokio::test]
    async fn digest_auth_computes_header_after_challenge() {
        let manager = DigestAuthSessionManager::new("bob", "pw").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::WWW_AUTHENTICATE,
            r#"Digest realm="cloudme", qop="auth", nonce="n1""#.parse().unwrap(),
        );
        assert!(manager.on_unauthorized(&headers).await.unwrap());

        let client = reqwest::Client::new();
        let url = Url::parse("https://example.test/doc").unwrap();
        let builder = client.get(url.clone());
        let builder = manager.authorize(&Method::GET, &url, builder).await.unwrap();
        let request = builder.build().unwrap();
        let header = request
            .headers()
            .get(reqwest::header::AUTHORIZATION)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(header.starts_with("Digest username=\"bob\""));
        assert!(header.contains("nc=00000001"));
    }
}
