//! Provider registration and the builder that assembles a configured
//! [`StorageProvider`] from an application/user credential pair.
//!
//! Grounded on `storage.py`'s `StorageFacade`/`StorageBuilder`: each
//! provider crate registers a constructor function under its provider name
//! at startup (the Python decorator `@register_provider` becomes a plain
//! call to [`register_provider`]), and callers go through [`StorageBuilder`]
//! rather than naming a concrete adapter type directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::credentials::{AppInfo, AppInfoFileRepository, UserCredentials, UserCredentialsFileRepository};
use crate::domain::errors::StorageError;
use crate::ports::DynStorageProvider;
use crate::retry::RetryStrategy;

/// Inputs a registered provider constructor needs to build itself.
pub struct StorageBuilderContext {
    pub app_info: AppInfo,
    /// `None` only when `for_bootstrapping` is set: bootstrapping needs a
    /// provider instance before any user credentials exist, just to drive
    /// the OAuth2 authorization-code exchange.
    pub user_credentials: Option<UserCredentials>,
    pub user_credentials_repository: Option<Arc<UserCredentialsFileRepository>>,
    pub retry_strategy: RetryStrategy,
    pub for_bootstrapping: bool,
}

pub type ProviderFactory =
    Arc<dyn Fn(StorageBuilderContext) -> Result<DynStorageProvider, StorageError> + Send + Sync>;

fn registry() -> &'static Mutex<HashMap<String, ProviderFactory>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, ProviderFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Registers `factory` under `provider_name`. Called once per provider,
/// typically from that provider crate's own initialization code.
pub fn register_provider(provider_name: impl Into<String>, factory: ProviderFactory) {
    registry().lock().unwrap().insert(provider_name.into(), factory);
}

/// Names of every provider registered so far.
pub fn registered_providers() -> Vec<String> {
    registry().lock().unwrap().keys().cloned().collect()
}

/// Fluent assembly of a [`DynStorageProvider`] for one provider/application/user.
///
/// Mirrors `StorageBuilder`'s field-by-field construction: `app_info` is
/// resolved by provider+optional app name, `user_credentials` by
/// app_info+optional user id, and `for_bootstrap()` skips the latter
/// resolution since bootstrapping runs before any credentials are saved.
pub struct StorageBuilder {
    provider_name: String,
    app_info_repository: Option<Arc<AppInfoFileRepository>>,
    app_name: Option<String>,
    user_credentials_repository: Option<Arc<UserCredentialsFileRepository>>,
    user_id: Option<String>,
    direct_user_credentials: Option<UserCredentials>,
    for_bootstrapping: bool,
    retry_strategy: RetryStrategy,
}

impl StorageBuilder {
    pub fn for_provider(provider_name: impl Into<String>) -> Self {
        StorageBuilder {
            provider_name: provider_name.into(),
            app_info_repository: None,
            app_name: None,
            user_credentials_repository: None,
            user_id: None,
            direct_user_credentials: None,
            for_bootstrapping: false,
            retry_strategy: RetryStrategy::default(),
        }
    }

    pub fn app_info_repository(mut self, repo: Arc<AppInfoFileRepository>) -> Self {
        self.app_info_repository = Some(repo);
        self
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    pub fn user_credentials_repository(mut self, repo: Arc<UserCredentialsFileRepository>) -> Self {
        self.user_credentials_repository = Some(repo);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Skips resolving user credentials: the provider is being constructed
    /// only to run the OAuth2 bootstrap flow, before any are saved.
    pub fn for_bootstrap(mut self) -> Self {
        self.for_bootstrapping = true;
        self
    }

    /// Supplies freshly-obtained credentials directly instead of looking
    /// them up through the user-credentials repository. Used by the
    /// bootstrap flow: the adapter is built with the just-exchanged tokens
    /// (to call `get_user_id()` and learn the id they should be saved
    /// under) before anything has been persisted.
    pub fn user_credentials(mut self, user_credentials: UserCredentials) -> Self {
        self.direct_user_credentials = Some(user_credentials);
        self
    }

    pub fn retry_strategy(mut self, retry_strategy: RetryStrategy) -> Self {
        self.retry_strategy = retry_strategy;
        self
    }

    pub fn build(self) -> Result<DynStorageProvider, StorageError> {
        let factory = {
            let registry = registry().lock().unwrap();
            registry
                .get(&self.provider_name)
                .cloned()
                .ok_or_else(|| StorageError::Generic(format!("no provider registered: {}", self.provider_name)))?
        };

        let app_info_repository = self
            .app_info_repository
            .ok_or_else(|| StorageError::Generic("app_info_repository is required".into()))?;
        let app_info = app_info_repository
            .get(&self.provider_name, self.app_name.as_deref())
            .map_err(|e| StorageError::Generic(e.to_string()))?
            .clone();

        let user_credentials = if let Some(creds) = self.direct_user_credentials {
            Some(creds)
        } else if self.for_bootstrapping {
            None
        } else {
            let repo = self
                .user_credentials_repository
                .clone()
                .ok_or_else(|| StorageError::Generic("user_credentials_repository is required".into()))?;
            Some(
                repo.get(&app_info, self.user_id.as_deref())
                    .map_err(|e| StorageError::Generic(e.to_string()))?,
            )
        };

        factory(StorageBuilderContext {
            app_info,
            user_credentials,
            user_credentials_repository: self.user_credentials_repository,
            retry_strategy: self.retry_strategy,
            for_bootstrapping: self.for_bootstrapping,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DownloadRequest, Quota, RemoteFile, RemotePath, UploadRequest};
    use crate::ports::StorageProvider;
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    struct StubProvider;

    #[async_trait]
    impl StorageProvider for StubProvider {
        fn provider_name(&self) -> &'static str {
            "stub"
        }
        async fn get_user_id(&self) -> Result<String, StorageError> {
            Ok("stub-user".into())
        }
        async fn get_quota(&self) -> Result<Quota, StorageError> {
            Ok(Quota::new(0, 0))
        }
        async fn list_folder(
            &self,
            _path: &RemotePath,
        ) -> Result<Option<Map<RemotePath, RemoteFile>>, StorageError> {
            Ok(None)
        }
        async fn create_folder(&self, _path: &RemotePath) -> Result<bool, StorageError> {
            Ok(true)
        }
        async fn delete(&self, _path: &RemotePath) -> Result<bool, StorageError> {
            Ok(true)
        }
        async fn get_file(&self, _path: &RemotePath) -> Result<Option<RemoteFile>, StorageError> {
            Ok(None)
        }
        async fn download(&self, _request: DownloadRequest) -> Result<(), StorageError> {
            Ok(())
        }
        async fn upload(&self, _request: UploadRequest) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn sample_app_info_file() -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "stub.myapp = {{}}").unwrap();
        tmp
    }

    #[test]
    fn build_fails_for_unregistered_provider() {
        let app_info_file = sample_app_info_file();
        let builder = StorageBuilder::for_provider("nonexistent-provider-for-test")
            .app_info_repository(Arc::new(AppInfoFileRepository::load(app_info_file.path()).unwrap()))
            .for_bootstrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn build_succeeds_for_bootstrap_without_user_credentials() {
        register_provider(
            "registry-test-stub",
            Arc::new(|_ctx| Ok(Arc::new(StubProvider) as DynStorageProvider)),
        );
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "registry-test-stub.myapp = {{}}").unwrap();
        let builder = StorageBuilder::for_provider("registry-test-stub")
            .app_info_repository(Arc::new(AppInfoFileRepository::load(tmp.path()).unwrap()))
            .for_bootstrap();
        assert!(builder.build().is_ok());
    }
}
