//! File/folder operations (C8/C9 exercised end to end): list, upload,
//! download, delete, and quota, against any registered provider.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use pcs_core::bytes::{FileByteSink, FileByteSource};
use pcs_core::credentials::{AppInfoFileRepository, UserCredentialsFileRepository};
use pcs_core::domain::{DownloadRequest, RemotePath, UploadRequest};
use pcs_core::ports::StorageProvider;
use pcs_core::registry::StorageBuilder;

use crate::commands::repository_dir;
use crate::output::{OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct ProviderArgs {
    /// Provider name, e.g. "dropbox", "googledrive", "onedrive", "hubic",
    /// "rapidshare", "cloudme"
    pub provider: String,

    /// Application name as registered in the app-info file
    #[arg(long)]
    pub app_name: Option<String>,

    /// User id the saved credentials were persisted under
    #[arg(long)]
    pub user_id: Option<String>,

    /// Directory holding app_info.txt/user_credentials.txt
    #[arg(long)]
    pub repository_dir: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum FsCommand {
    /// List the direct children of a remote folder
    List {
        #[command(flatten)]
        provider: ProviderArgs,
        /// Remote path to list; defaults to the root
        #[arg(default_value = "/")]
        path: String,
    },
    /// Upload a local file to a remote path
    Upload {
        #[command(flatten)]
        provider: ProviderArgs,
        local_path: String,
        remote_path: String,
    },
    /// Download a remote blob to a local file
    Download {
        #[command(flatten)]
        provider: ProviderArgs,
        remote_path: String,
        local_path: String,
    },
    /// Delete whatever exists at a remote path (recursively, for folders)
    Delete {
        #[command(flatten)]
        provider: ProviderArgs,
        path: String,
    },
    /// Show quota usage
    Quota {
        #[command(flatten)]
        provider: ProviderArgs,
    },
}

async fn build_provider(args: &ProviderArgs, config: &pcs_core::config::Config) -> Result<pcs_core::ports::DynStorageProvider> {
    pcs_providers::register_all();
    let repo_dir = repository_dir(args.repository_dir.as_deref(), config);
    let app_info_repo = Arc::new(
        AppInfoFileRepository::load(repo_dir.join("app_info.txt")).context("loading app info repository")?,
    );
    let user_credentials_repo = Arc::new(
        UserCredentialsFileRepository::open(repo_dir.join("user_credentials.txt"))
            .context("opening user credentials repository")?,
    );
    let mut builder = StorageBuilder::for_provider(&args.provider)
        .app_info_repository(app_info_repo)
        .user_credentials_repository(user_credentials_repo)
        .retry_strategy(config.to_retry_strategy());
    if let Some(app_name) = &args.app_name {
        builder = builder.app_name(app_name.clone());
    }
    if let Some(user_id) = &args.user_id {
        builder = builder.user_id(user_id.clone());
    }
    Ok(builder.build()?)
}

impl FsCommand {
    pub async fn execute(&self, fmt: &dyn OutputFormatter, format: OutputFormat, config: &pcs_core::config::Config) -> Result<()> {
        match self {
            FsCommand::List { provider, path } => {
                let storage = build_provider(provider, config).await?;
                let remote_path = RemotePath::new(path)?;
                match storage.list_folder(&remote_path).await? {
                    None => fmt.info(&format!("{path} does not exist")),
                    Some(children) => {
                        if matches!(format, OutputFormat::Json) {
                            let entries: Vec<_> = children
                                .iter()
                                .map(|(p, f)| {
                                    serde_json::json!({
                                        "path": p.path_name(),
                                        "kind": if f.is_folder() { "folder" } else { "blob" },
                                        "length": f.as_blob().map(|b| b.length),
                                    })
                                })
                                .collect();
                            fmt.print_json(&serde_json::json!({ "children": entries }));
                        } else if children.is_empty() {
                            fmt.info("(empty folder)");
                        } else {
                            let mut names: Vec<_> = children.keys().map(RemotePath::path_name).collect();
                            names.sort();
                            for name in names {
                                fmt.info(name);
                            }
                        }
                    }
                }
            }
            FsCommand::Upload {
                provider,
                local_path,
                remote_path,
            } => {
                let storage = build_provider(provider, config).await?;
                let remote_path = RemotePath::new(remote_path)?;
                let source = Arc::new(FileByteSource::new(local_path));
                storage.upload(UploadRequest::new(remote_path.clone(), source)).await?;
                fmt.success(&format!("Uploaded {local_path} to {}", remote_path.path_name()));
            }
            FsCommand::Download {
                provider,
                remote_path,
                local_path,
            } => {
                let storage = build_provider(provider, config).await?;
                let remote_path = RemotePath::new(remote_path)?;
                let sink = Arc::new(FileByteSink::new(local_path).with_temp_name_during_writes(true));
                storage
                    .download(DownloadRequest::new(remote_path.clone(), sink))
                    .await?;
                fmt.success(&format!("Downloaded {} to {local_path}", remote_path.path_name()));
            }
            FsCommand::Delete { provider, path } => {
                let storage = build_provider(provider, config).await?;
                let remote_path = RemotePath::new(path)?;
                let deleted = storage.delete(&remote_path).await?;
                if deleted {
                    fmt.success(&format!("Deleted {path}"));
                } else {
                    fmt.info(&format!("Nothing existed at {path}"));
                }
            }
            FsCommand::Quota { provider } => {
                let storage = build_provider(provider, config).await?;
                let quota = storage.get_quota().await?;
                if matches!(format, OutputFormat::Json) {
                    fmt.print_json(&serde_json::json!({
                        "used_bytes": quota.used_bytes,
                        "allowed_bytes": quota.allowed_bytes,
                        "percent_used": quota.percent_used(),
                    }));
                } else {
                    fmt.info(&format!(
                        "{} / {} bytes used ({:.1}%)",
                        quota.used_bytes,
                        quota.allowed_bytes,
                        quota.percent_used()
                    ));
                }
            }
        }
        Ok(())
    }
}
