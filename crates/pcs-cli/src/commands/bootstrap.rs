//! Drives the OAuth2 bootstrap flow (C7) end to end for one provider/app/user
//! and saves the resulting credentials.
//!
//! Grounded on the original `OAuth2BootStrapper` utility: print an
//! authorization URL, read back a pasted code or full callback URL from
//! stdin, exchange it for tokens, ask the freshly-authenticated adapter who
//! the user is, and persist the credentials under that id.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use pcs_core::config::Config;
use pcs_core::credentials::{AppInfoFileRepository, UserCredentialsFileRepository};
use pcs_core::registry::StorageBuilder;

use crate::commands::repository_dir;
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct BootstrapCommand {
    /// Provider name, e.g. "dropbox", "googledrive", "onedrive", "hubic"
    pub provider: String,

    /// Application name as registered in the app-info file, when a provider
    /// has more than one application registered
    #[arg(long)]
    pub app_name: Option<String>,

    /// Directory holding app_info.txt/user_credentials.txt
    #[arg(long)]
    pub repository_dir: Option<String>,
}

/// Endpoint parameters for each OAuth2 provider this workspace registers.
/// Kept here (rather than exposed generically by `pcs-providers`) since only
/// the bootstrap flow needs a provider's `OAuth2ProviderParameters` ahead of
/// building a full adapter.
fn oauth2_params(provider: &str) -> Result<pcs_oauth::OAuth2ProviderParameters> {
    Ok(match provider {
        "dropbox" => pcs_providers::dropbox::provider_parameters(),
        "googledrive" => pcs_providers::googledrive::provider_parameters(),
        "onedrive" => pcs_providers::onedrive::provider_parameters(),
        "hubic" => pcs_providers::hubic::provider_parameters(),
        other => bail!("'{other}' has no OAuth2 bootstrap flow; use `login` instead"),
    })
}

impl BootstrapCommand {
    pub async fn execute(&self, fmt: &dyn OutputFormatter, config: &Config) -> Result<()> {
        pcs_providers::register_all();

        let repo_dir = repository_dir(self.repository_dir.as_deref(), config);
        let app_info_repo = AppInfoFileRepository::load(repo_dir.join("app_info.txt"))
            .context("loading app info repository")?;
        let app_info = app_info_repo
            .get(&self.provider, self.app_name.as_deref())
            .with_context(|| format!("no app registered for provider '{}'", self.provider))?
            .clone();
        if !app_info.is_oauth() {
            bail!("'{}' is not an OAuth2 application; use `login` instead", self.provider);
        }

        let params = oauth2_params(&self.provider)?;
        let pending = pcs_oauth::authorize_url(&params, &app_info)?;

        fmt.info("Open this URL in a browser and authorize the application:");
        println!("\n{}\n", pending.authorize_url);
        print!("Paste the authorization code, or the full callback URL: ");
        io::stdout().flush().ok();

        let mut input = String::new();
        io::stdin().read_line(&mut input).context("reading authorization code")?;

        // user_id is filled in properly once we can call get_user_id() below;
        // the placeholder is only used to build a bootstrapping adapter.
        let user_credentials =
            pcs_oauth::exchange_code(&params, &app_info, "pending", input.trim(), &pending.csrf_state).await?;

        let user_credentials_repo = Arc::new(
            UserCredentialsFileRepository::open(repo_dir.join("user_credentials.txt"))
                .context("opening user credentials repository")?,
        );

        let mut builder = StorageBuilder::for_provider(&self.provider)
            .app_info_repository(Arc::new(app_info_repo))
            .user_credentials(user_credentials.clone())
            .user_credentials_repository(user_credentials_repo.clone())
            .retry_strategy(config.to_retry_strategy());
        if let Some(app_name) = &self.app_name {
            builder = builder.app_name(app_name.clone());
        }
        let provider = builder.build()?;

        let user_id = provider.get_user_id().await.context("fetching user id after bootstrap")?;
        let mut user_credentials = user_credentials;
        user_credentials.user_id = user_id.clone();

        user_credentials_repo.save(&user_credentials).context("saving user credentials")?;

        fmt.success(&format!("Authenticated as '{user_id}' for provider '{}'", self.provider));
        Ok(())
    }
}
