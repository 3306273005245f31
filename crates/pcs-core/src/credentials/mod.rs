//! Application and user credential types, plus the default plain-text
//! file-backed repositories for them.
//!
//! Grounded on `credentials/app_info.py`, `credentials/user_credentials.py`,
//! and the matching `*_file_repo.py` modules. These default repositories are
//! explicitly sample-grade: unencrypted, single-process, fine for a CLI or
//! for tests, not a production secrets store.

mod app_info;
mod app_info_repo;
mod user_credentials;
mod user_credentials_repo;

pub use app_info::AppInfo;
pub use app_info_repo::AppInfoFileRepository;
pub use user_credentials::UserCredentials;
pub use user_credentials_repo::UserCredentialsFileRepository;

/// Name of the environment variable that selects a default directory for the
/// two credential repository files, consulted by the CLI/bootstrap binaries
/// (the core itself never reads the environment).
pub const REPOSITORY_DIR_ENV: &str = "PCS_API_REPOSITORY_DIR";
