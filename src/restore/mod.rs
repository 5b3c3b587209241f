pub mod archive;
pub mod logic;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::storage::s3::parse_s3_uri;
use crate::utils::ask_confirmation;
use logic::BackupSource;

pub use archive::{RestoreSummary, restore_archive};
pub use logic::restore_mediafiles;

/// Public entry point for the restore process.
/// Builds the storages on the runtime, then extracts on a blocking thread.
pub async fn run_restore_flow(app_config: &AppConfig) -> Result<RestoreSummary> {
    let restore_config = match &app_config.operation {
        Some(crate::config::OperationConfig::Restore(cfg)) => cfg.clone(),
        _ => anyhow::bail!("Restore operation selected but no restore configuration found."),
    };

    let locations = app_config.build_locations().await?;

    let source = match restore_config.input_path.as_deref() {
        Some(uri) if uri.starts_with("s3://") => {
            let (bucket, key) = parse_s3_uri(uri)?;
            BackupSource::Object {
                storage: app_config.build_bucket_storage(&bucket).await?,
                key,
            }
        }
        Some(path) => BackupSource::Path(PathBuf::from(path)),
        None => BackupSource::Storage {
            storage: app_config
                .build_backup_storage()
                .await?
                .context("backup_storage must be configured when no input_path is given")?,
            filename: restore_config.input_filename.clone(),
        },
    };
    let spool_max_size = app_config.tmp_file_max_size;

    tokio::task::spawn_blocking(move || {
        logic::restore_mediafiles(
            &locations,
            &source,
            &restore_config,
            spool_max_size,
            ask_confirmation,
        )
    })
    .await
    .context("Restore task failed to complete")?
}
