//! Static registration data for an application on a given provider.

/// Registration data for an application with a storage provider.
///
/// `app_id`/`app_secret` are only present for OAuth2 providers; login/password
/// providers (RapidShare) use `app_name = "login"` and leave them unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub provider_name: String,
    pub app_name: String,
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub scope: Vec<String>,
    pub redirect_url: Option<String>,
}

impl AppInfo {
    pub fn new(provider_name: impl Into<String>, app_name: impl Into<String>) -> Self {
        AppInfo {
            provider_name: provider_name.into(),
            app_name: app_name.into(),
            app_id: None,
            app_secret: None,
            scope: Vec::new(),
            redirect_url: None,
        }
    }

    pub fn with_oauth(
        mut self,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
        scope: Vec<String>,
        redirect_url: Option<String>,
    ) -> Self {
        self.app_id = Some(app_id.into());
        self.app_secret = Some(app_secret.into());
        self.scope = scope;
        self.redirect_url = redirect_url;
        self
    }

    /// True for OAuth2-registered applications (those with an `app_id`).
    pub fn is_oauth(&self) -> bool {
        self.app_id.is_some()
    }
}
