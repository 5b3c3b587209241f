// mediabackup/src/backup/logic.rs
use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::SpooledTempFile;
use tracing::{debug, info};

use super::archive::build_archive;
use crate::config::BackupConfig;
use crate::storage::{Storage, StorageLocations};
use crate::transform::{self, WriteTransforms};
use crate::utils::{archive_extension, filename_generate, human_size, locator};

/// Where the finished backup goes.
#[derive(Debug, Clone)]
pub enum BackupDestination {
    /// Backup storage, under the generated or configured file name.
    Storage(Arc<dyn Storage>),
    /// A fixed object in a storage, e.g. from an `s3://bucket/key` output path.
    Object { storage: Arc<dyn Storage>, key: String },
    /// A file on the local filesystem.
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    pub filename: String,
    pub size: u64,
}

/// Name of the backup before the encryption suffix is appended.
pub fn backup_filename(backup_config: &BackupConfig) -> String {
    match &backup_config.output_filename {
        Some(filename) => filename.clone(),
        None => filename_generate(
            archive_extension(backup_config.compress),
            backup_config.servername.as_deref(),
            Local::now().naive_local(),
        ),
    }
}

/// Writes a stream to a local file, creating the parent directory if needed.
pub fn write_local_file(content: &mut dyn Read, path: &Path) -> Result<u64> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory for backup: {}", parent.display())
            })?;
        }
    }
    let mut output = File::create(path)
        .with_context(|| format!("Failed to create backup file: {}", path.display()))?;
    io::copy(content, &mut output)
        .with_context(|| format!("Failed to write backup file: {}", path.display()))
}

/// Builds the media archive, applies the configured transforms, and stores it.
///
/// Blocking: call from a blocking context.
pub fn backup_mediafiles(
    locations: &StorageLocations,
    destination: &BackupDestination,
    backup_config: &BackupConfig,
    spool_max_size: usize,
) -> Result<BackupOutcome> {
    let filename = backup_filename(backup_config);
    info!("Backing up media files from {}", locations.labels().join(", "));

    let tarball = build_archive(
        locations,
        SpooledTempFile::new(spool_max_size),
        backup_config.compress,
    )
    .context("Failed to build media archive")?;

    let (mut tarball, filename) = if backup_config.encrypt {
        let mut tarball = tarball;
        tarball.seek(SeekFrom::Start(0))?;
        let encrypted = transform::apply(
            tarball,
            &filename,
            &WriteTransforms {
                compress: false, // already gzipped while building
                encrypt: true,
                passphrase: backup_config.passphrase.clone(),
            },
            spool_max_size,
        )
        .context("Failed to encrypt media archive")?;
        (encrypted.content, encrypted.name)
    } else {
        (tarball, filename)
    };

    let size = tarball.seek(SeekFrom::End(0))?;
    debug!("Backup size: {}", human_size(size));
    tarball.seek(SeekFrom::Start(0))?;

    match destination {
        BackupDestination::Storage(storage) => {
            info!("Writing backup file to {}", filename);
            storage.save(&filename, &mut tarball).with_context(|| {
                format!("Failed to write {} to {}", filename, storage.describe())
            })?;
        }
        BackupDestination::Object { storage, key } => {
            info!("Writing backup file to {}", key);
            storage
                .save(key, &mut tarball)
                .with_context(|| format!("Failed to write {} to {}", key, storage.describe()))?;
        }
        BackupDestination::Path(path) => {
            info!("Writing backup file to {}", path.display());
            write_local_file(&mut tarball, path)?;
        }
    }

    Ok(BackupOutcome { filename, size })
}

/// Removes old backups from the backup storage, keeping the newest ones.
pub fn clean_old_backups(storage: &dyn Storage, backup_config: &BackupConfig) -> Result<Vec<String>> {
    let deleted = locator::cleanup_old_backups(
        storage,
        backup_config.servername.as_deref(),
        backup_config.encrypt,
        backup_config.compress,
        backup_config.cleanup_keep,
    )
    .context("Failed to clean up old backups")?;
    info!("Cleaned up {} old backup(s)", deleted.len());
    Ok(deleted)
}
