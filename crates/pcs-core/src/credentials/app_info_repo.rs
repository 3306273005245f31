use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use super::app_info::AppInfo;

fn app_key(provider_name: &str, app_name: &str) -> String {
    format!("{provider_name}.{app_name}")
}

/// Reads application registration info from a plain-text file with the
/// format `provider_name.app_name = {json}` (one entry per line).
///
/// Sample-grade: read once at construction, never rewritten.
pub struct AppInfoFileRepository {
    apps: HashMap<String, AppInfo>,
}

#[derive(serde::Deserialize)]
struct AppInfoJson {
    #[serde(rename = "appId")]
    app_id: Option<String>,
    #[serde(rename = "appSecret")]
    app_secret: Option<String>,
    #[serde(default)]
    scope: Vec<String>,
    #[serde(rename = "redirectUrl")]
    redirect_url: Option<String>,
}

impl AppInfoFileRepository {
    pub fn load(data_filename: impl AsRef<Path>) -> Result<Self> {
        let path = data_filename.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading app info file {}", path.display()))?;
        let mut apps = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, json_str) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("not parsable line: {line}"))?;
            let (provider_name, app_name) = key
                .trim()
                .split_once('.')
                .ok_or_else(|| anyhow!("key is not provider.app: {key}"))?;
            let parsed: AppInfoJson = serde_json::from_str(json_str.trim())
                .with_context(|| format!("parsing app info JSON for {key}"))?;
            let app_info = if let (Some(id), Some(secret)) = (parsed.app_id, parsed.app_secret) {
                AppInfo::new(provider_name, app_name).with_oauth(
                    id,
                    secret,
                    parsed.scope,
                    parsed.redirect_url,
                )
            } else {
                AppInfo::new(provider_name, app_name)
            };
            apps.insert(app_key(provider_name, app_name), app_info);
        }
        Ok(AppInfoFileRepository { apps })
    }

    /// Looks up the registration for `provider_name`/`app_name`. If
    /// `app_name` is omitted, succeeds only when the repository holds exactly
    /// one application for that provider.
    pub fn get(&self, provider_name: &str, app_name: Option<&str>) -> Result<&AppInfo> {
        if let Some(app_name) = app_name {
            return self
                .apps
                .get(&app_key(provider_name, app_name))
                .ok_or_else(|| {
                    anyhow!("no application found for provider '{provider_name}' and name '{app_name}'")
                });
        }
        let prefix = format!("{provider_name}.");
        let mut found: Option<&AppInfo> = None;
        for (k, v) in &self.apps {
            if k.starts_with(&prefix) {
                if found.is_some() {
                    return Err(anyhow!("several applications found for provider: {provider_name}"));
                }
                found = Some(v);
            }
        }
        found.ok_or_else(|| anyhow!("no application found for provider: {provider_name}"))
    }
}

#[allow(dead_code)]
fn default_repository_path(filename: &str) -> PathBuf {
    std::env::var(super::REPOSITORY_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_oauth_and_plain_entries() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"dropbox.myapp = {{"appId": "id1", "appSecret": "secret1", "scope": ["dropbox"]}}"#
        )
        .unwrap();
        writeln!(tmp, "rapidshare.login = {{}}").unwrap();
        let repo = AppInfoFileRepository::load(tmp.path()).unwrap();

        let dropbox = repo.get("dropbox", Some("myapp")).unwrap();
        assert!(dropbox.is_oauth());
        assert_eq!(dropbox.app_id.as_deref(), Some("id1"));

        let rapidshare = repo.get("rapidshare", None).unwrap();
        assert!(!rapidshare.is_oauth());
    }

    #[test]
    fn errors_when_app_name_ambiguous() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "dropbox.app1 = {{}}").unwrap();
        writeln!(tmp, "dropbox.app2 = {{}}").unwrap();
        let repo = AppInfoFileRepository::load(tmp.path()).unwrap();
        assert!(repo.get("dropbox", None).is_err());
    }
}
