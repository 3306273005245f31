pub mod bootstrap;
pub mod completions;
pub mod fs;
pub mod login;

use pcs_core::config::Config;

/// Where the two credential repository files live: a `--repository-dir`
/// flag takes precedence over the loaded [`Config`], which itself honors
/// `PCS_API_REPOSITORY_DIR` (see `pcs_core::config::RepositoryConfig`).
pub fn repository_dir(flag: Option<&str>, config: &Config) -> std::path::PathBuf {
    match flag {
        Some(dir) => std::path::PathBuf::from(dir),
        None => config.repository.dir.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_configured_repository_dir() {
        let config = Config::default();
        let dir = repository_dir(Some("/tmp/from-flag"), &config);
        assert_eq!(dir, std::path::PathBuf::from("/tmp/from-flag"));
    }

    #[test]
    fn falls_back_to_configured_repository_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.repository.dir = dir.path().to_path_buf();
        assert_eq!(repository_dir(None, &config), dir.path());
    }
}
