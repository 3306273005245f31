//! User credential bag: opaque key/value pairs whose shape is
//! provider-dependent (password hash, OAuth2 tokens, Digest realm state...).

use std::collections::HashMap;

use serde_json::Value;

use super::app_info::AppInfo;

/// A user's credentials for a given application.
///
/// The credential bag is a loosely-typed JSON object so each provider/session
/// manager can store whatever it needs (access/refresh tokens and expiry for
/// OAuth2, a password for Basic/Digest auth) without this type knowing the
/// shape. It is mutated in place after a token refresh and then handed back
/// to [`super::UserCredentialsFileRepository::save`].
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub app_info: AppInfo,
    pub user_id: String,
    credentials: HashMap<String, Value>,
}

impl UserCredentials {
    pub fn new(app_info: AppInfo, user_id: impl Into<String>, credentials: HashMap<String, Value>) -> Self {
        UserCredentials {
            app_info,
            user_id: user_id.into(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &HashMap<String, Value> {
        &self.credentials
    }

    pub fn set_new_credentials(&mut self, new_credentials: HashMap<String, Value>) {
        self.credentials = new_credentials;
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.credentials.insert(key.into(), value);
    }
}
