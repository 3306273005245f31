//! Static OAuth2 endpoint/scope configuration for one provider.
//!
//! Grounded on `oauth/oauth2_params.py`'s `OAuth2ProviderParameters`: a plain
//! data holder plus two small helpers for providers that pack their scope
//! into the authorization URL rather than relying on the provider echoing it
//! back in the callback (Dropbox does not; RapidShare has no OAuth2 surface
//! at all so never constructs one of these).

/// Per-provider OAuth2 endpoints and scope-formatting rules.
#[derive(Debug, Clone)]
pub struct OAuth2ProviderParameters {
    pub authorize_url: String,
    pub access_token_url: String,
    /// `None` for providers that never issue a refresh token (the session
    /// manager then fails fast instead of attempting a refresh).
    pub refresh_token_url: Option<String>,
    /// Whether `scope` must be appended to the authorization URL as a query
    /// parameter (Google Drive, OneDrive) rather than only sent at token
    /// exchange time.
    pub scope_in_authorization: bool,
    /// Separator joining multiple scope values into one string. `None` means
    /// the provider only ever has a single scope value.
    pub scope_perms_separator: Option<String>,
}

impl OAuth2ProviderParameters {
    pub fn new(authorize_url: impl Into<String>, access_token_url: impl Into<String>) -> Self {
        OAuth2ProviderParameters {
            authorize_url: authorize_url.into(),
            access_token_url: access_token_url.into(),
            refresh_token_url: None,
            scope_in_authorization: false,
            scope_perms_separator: None,
        }
    }

    pub fn with_refresh_token_url(mut self, url: impl Into<String>) -> Self {
        self.refresh_token_url = Some(url.into());
        self
    }

    pub fn with_scope_in_authorization(mut self, separator: Option<&str>) -> Self {
        self.scope_in_authorization = true;
        self.scope_perms_separator = separator.map(str::to_string);
        self
    }

    /// Builds the scope string to tack onto the authorization URL, or `None`
    /// if this provider doesn't want one there.
    pub fn scope_for_authorization(&self, scope: &[String]) -> Option<String> {
        if !self.scope_in_authorization || scope.is_empty() {
            return None;
        }
        match &self.scope_perms_separator {
            Some(sep) => Some(scope.join(sep)),
            None => Some(scope.join(" ")),
        }
    }

    /// Splits a provider's granted-scope response back into individual
    /// permission strings, using the same separator.
    pub fn granted_scope(&self, permissions: &str) -> Vec<String> {
        if permissions.is_empty() {
            return Vec::new();
        }
        let sep = self.scope_perms_separator.as_deref().unwrap_or(" ");
        permissions.split(sep).map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_for_authorization_respects_opt_in() {
        let params = OAuth2ProviderParameters::new("https://auth", "https://token");
        assert_eq!(params.scope_for_authorization(&["a".into(), "b".into()]), None);

        let params = params.with_scope_in_authorization(Some(","));
        assert_eq!(
            params.scope_for_authorization(&["a".into(), "b".into()]),
            Some("a,b".into())
        );
    }

    #[test]
    fn granted_scope_round_trips() {
        let params =
            OAuth2ProviderParameters::new("https://auth", "https://token").with_scope_in_authorization(Some(","));
        assert_eq!(params.granted_scope("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(params.granted_scope(""), Vec::<String>::new());
    }
}
