use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use super::app_info::AppInfo;
use super::user_credentials::UserCredentials;

fn app_prefix(app_info: &AppInfo) -> String {
    format!("{}.{}.", app_info.provider_name, app_info.app_name)
}

fn user_key(app_info: &AppInfo, user_id: &str) -> String {
    format!("{}{}", app_prefix(app_info), user_id)
}

/// Reads and writes user credentials from/to a plain-text file with the
/// format `provider.app_name.user_id = {json}` (one entry per line).
///
/// Thread-safe (guarded by an internal mutex) but not safe for concurrent
/// writers across processes. Sample-grade: data is stored unencrypted.
pub struct UserCredentialsFileRepository {
    data_filename: PathBuf,
    entries: Mutex<HashMap<String, HashMap<String, Value>>>,
}

impl UserCredentialsFileRepository {
    pub fn open(data_filename: impl Into<PathBuf>) -> Result<Self> {
        let data_filename = data_filename.into();
        let entries = if data_filename.exists() {
            Self::read_file(&data_filename)?
        } else {
            HashMap::new()
        };
        Ok(UserCredentialsFileRepository {
            data_filename,
            entries: Mutex::new(entries),
        })
    }

    /// Looks up credentials for `app_info`/`user_id`. If `user_id` is
    /// omitted, succeeds only when the repository holds exactly one entry
    /// for that application.
    pub fn get(&self, app_info: &AppInfo, user_id: Option<&str>) -> Result<UserCredentials> {
        let entries = self.entries.lock().unwrap();
        if let Some(user_id) = user_id {
            let key = user_key(app_info, user_id);
            let creds = entries
                .get(&key)
                .ok_or_else(|| anyhow!("no user credentials found for application {app_info:?}"))?;
            return Ok(UserCredentials::new(app_info.clone(), user_id, creds.clone()));
        }
        let prefix = app_prefix(app_info);
        let mut found: Option<(&str, &HashMap<String, Value>)> = None;
        for (k, v) in entries.iter() {
            if let Some(uid) = k.strip_prefix(&prefix) {
                if found.is_some() {
                    return Err(anyhow!("several user credentials found for application {app_info:?}"));
                }
                found = Some((uid, v));
            }
        }
        let (uid, creds) = found
            .ok_or_else(|| anyhow!("no user credentials found for application {app_info:?}"))?;
        Ok(UserCredentials::new(app_info.clone(), uid, creds.clone()))
    }

    /// Persists `user_credentials`, overwriting any prior entry for the same
    /// application/user. Writes to a temp file and renames into place so a
    /// crash mid-write can't corrupt the existing file.
    pub fn save(&self, user_credentials: &UserCredentials) -> Result<()> {
        let key = user_key(&user_credentials.app_info, &user_credentials.user_id);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, user_credentials.credentials().clone());
        Self::write_file(&self.data_filename, &entries)
    }

    fn read_file(path: &Path) -> Result<HashMap<String, HashMap<String, Value>>> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading user credentials file {}", path.display()))?;
        let mut entries = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, json_str) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("not parsable line: {line}"))?;
            let creds: HashMap<String, Value> = serde_json::from_str(json_str.trim())
                .with_context(|| format!("parsing credentials JSON for {key}"))?;
            entries.insert(key.trim().to_string(), creds);
        }
        Ok(entries)
    }

    fn write_file(path: &Path, entries: &HashMap<String, HashMap<String, Value>>) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        let mut out = String::new();
        out.push_str("# Lines format is key = value\n");
        out.push_str("# key is composed of providerName.appName.userId\n");
        out.push_str("# value is a json object containing tokens for this (user, application) couple.\n");
        out.push_str("# Note that token content is provider dependent.\n");
        out.push_str("# do NOT modify this file by hand: your modifications would be erased by next write.\n");
        for (key, creds) in entries {
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(&serde_json::to_string(creds)?);
            out.push('\n');
        }
        fs::write(&tmp_path, out)
            .with_context(|| format!("writing temp credentials file {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("renaming {} to {}", tmp_path.display(), path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_app() -> AppInfo {
        AppInfo::new("dropbox", "myapp").with_oauth("id", "secret", vec!["dropbox".into()], None)
    }

    #[test]
    fn round_trips_through_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.txt");

        let repo = UserCredentialsFileRepository::open(&path).unwrap();
        let mut creds = HashMap::new();
        creds.insert("access_token".to_string(), json!("tok-1"));
        let user_creds = UserCredentials::new(sample_app(), "alice", creds);
        repo.save(&user_creds).unwrap();

        let reloaded = UserCredentialsFileRepository::open(&path).unwrap();
        let fetched = reloaded.get(&sample_app(), Some("alice")).unwrap();
        assert_eq!(fetched.get("access_token").unwrap(), "tok-1");
    }

    #[test]
    fn lookup_without_user_id_requires_single_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.txt");
        let repo = UserCredentialsFileRepository::open(&path).unwrap();
        repo.save(&UserCredentials::new(sample_app(), "alice", HashMap::new()))
            .unwrap();

        let fetched = repo.get(&sample_app(), None).unwrap();
        assert_eq!(fetched.user_id, "alice");

        repo.save(&UserCredentials::new(sample_app(), "bob", HashMap::new()))
            .unwrap();
        assert!(repo.get(&sample_app(), None).is_err());
    }
}
