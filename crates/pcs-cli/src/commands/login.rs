//! Saves user credentials directly for providers with no OAuth2 dance:
//! RapidShare and CloudMe authenticate with a plain login/password, so there
//! is no authorize-URL/code exchange to drive, just a password to store.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use pcs_core::config::Config;
use pcs_core::credentials::{AppInfoFileRepository, UserCredentials, UserCredentialsFileRepository};

use crate::commands::repository_dir;
use crate::output::OutputFormatter;

#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Provider name, e.g. "rapidshare" or "cloudme"
    pub provider: String,

    /// Login / username
    pub login: String,

    /// Password (prompted interactively if omitted)
    #[arg(long)]
    pub password: Option<String>,

    /// Application name as registered in the app-info file
    #[arg(long)]
    pub app_name: Option<String>,

    /// Directory holding app_info.txt/user_credentials.txt
    #[arg(long)]
    pub repository_dir: Option<String>,
}

impl LoginCommand {
    pub async fn execute(&self, fmt: &dyn OutputFormatter, config: &Config) -> Result<()> {
        if !matches!(self.provider.as_str(), "rapidshare" | "cloudme") {
            bail!("'{}' does not use a login/password scheme; use `bootstrap` instead", self.provider);
        }

        let repo_dir = repository_dir(self.repository_dir.as_deref(), config);
        let app_info_repo = AppInfoFileRepository::load(repo_dir.join("app_info.txt"))
            .context("loading app info repository")?;
        let app_info = app_info_repo
            .get(&self.provider, self.app_name.as_deref())
            .with_context(|| format!("no app registered for provider '{}'", self.provider))?
            .clone();

        let password = match &self.password {
            Some(p) => p.clone(),
            None => rpassword_prompt()?,
        };

        let mut credentials = HashMap::new();
        credentials.insert("password".to_string(), serde_json::json!(password));
        let user_credentials = UserCredentials::new(app_info, &self.login, credentials);

        let user_credentials_repo = Arc::new(
            UserCredentialsFileRepository::open(repo_dir.join("user_credentials.txt"))
                .context("opening user credentials repository")?,
        );
        user_credentials_repo.save(&user_credentials).context("saving user credentials")?;

        fmt.success(&format!("Saved credentials for '{}' on provider '{}'", self.login, self.provider));
        Ok(())
    }
}

/// Reads a password from stdin without a terminal-echo dependency: this
/// workspace has no `rpassword`-style crate, so the prompt simply reads a
/// line (acceptable for the sample-grade credential flow this CLI drives).
fn rpassword_prompt() -> Result<String> {
    use std::io::{self, Write};
    print!("Password: ");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input).context("reading password")?;
    Ok(input.trim().to_string())
}
