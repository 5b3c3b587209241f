pub mod archive;
pub mod explore;
pub mod logic;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::storage::s3::parse_s3_uri;
use logic::BackupDestination;

pub use archive::build_archive;
pub use logic::{BackupOutcome, backup_mediafiles};

/// Public entry point for the backup process.
/// Builds the storages on the runtime, then runs the archive pipeline on a blocking thread.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<BackupOutcome> {
    let backup_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Backup(cfg)) => cfg.clone(),
        _ => anyhow::bail!("Backup operation selected but no backup configuration found."),
    };

    let locations = app_config.build_locations().await?;
    let backup_storage = app_config.build_backup_storage().await?;

    let destination = match backup_config.output_path.as_deref() {
        Some(uri) if uri.starts_with("s3://") => {
            let (bucket, key) = parse_s3_uri(uri)?;
            BackupDestination::Object {
                storage: app_config.build_bucket_storage(&bucket).await?,
                key,
            }
        }
        Some(path) => BackupDestination::Path(PathBuf::from(path)),
        None => BackupDestination::Storage(
            backup_storage
                .clone()
                .context("backup_storage must be configured when no output_path is given")?,
        ),
    };
    let spool_max_size = app_config.tmp_file_max_size;

    tokio::task::spawn_blocking(move || -> Result<BackupOutcome> {
        let outcome =
            logic::backup_mediafiles(&locations, &destination, &backup_config, spool_max_size)?;
        if backup_config.clean {
            match &backup_storage {
                Some(storage) => {
                    logic::clean_old_backups(storage.as_ref(), &backup_config)?;
                }
                None => tracing::warn!("clean requested but no backup_storage is configured"),
            }
        }
        Ok(outcome)
    })
    .await
    .context("Backup task failed to complete")?
}
