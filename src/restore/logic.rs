// mediabackup/src/restore/logic.rs
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::archive::{RestoreSummary, restore_archive};
use crate::config::RestoreConfig;
use crate::errors::MediaError;
use crate::storage::{Storage, StorageLocations};
use crate::transform::{self, ReadTransforms};
use crate::utils::{human_size, locator};

/// Where the backup to restore comes from.
#[derive(Debug, Clone)]
pub enum BackupSource {
    /// Backup storage: an explicit file name, or the newest matching backup.
    Storage {
        storage: Arc<dyn Storage>,
        filename: Option<String>,
    },
    /// A fixed object in a storage, e.g. from an `s3://bucket/key` input path.
    Object { storage: Arc<dyn Storage>, key: String },
    /// A file on the local filesystem.
    Path(PathBuf),
}

/// Opens the backup to restore and returns its name and content.
pub fn get_backup_file(
    source: &BackupSource,
    restore_config: &RestoreConfig,
) -> Result<(String, Box<dyn Read + Send>)> {
    match source {
        BackupSource::Path(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open backup file: {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let reader: Box<dyn Read + Send> = Box::new(file);
            Ok((name, reader))
        }
        BackupSource::Object { storage, key } => {
            let opened = storage
                .open(key)
                .with_context(|| format!("Failed to open {} in {}", key, storage.describe()))?;
            let name = key.rsplit('/').next().unwrap_or(key).to_string();
            Ok((name, opened.reader))
        }
        BackupSource::Storage { storage, filename } => {
            let filename = match filename {
                Some(filename) => filename.clone(),
                None => locator::find_latest_backup(
                    storage.as_ref(),
                    restore_config.servername.as_deref(),
                    restore_config.decrypt,
                    restore_config.uncompress,
                )?,
            };
            let opened = storage
                .open(&filename)
                .with_context(|| format!("Failed to open {} in {}", filename, storage.describe()))?;
            Ok((filename, opened.reader))
        }
    }
}

/// Locates, detransforms, and extracts a media backup into `locations`.
///
/// `confirm` is asked before anything is written when the restore is
/// interactive; returning `false` cancels the restore. Blocking.
pub fn restore_mediafiles(
    locations: &StorageLocations,
    source: &BackupSource,
    restore_config: &RestoreConfig,
    spool_max_size: usize,
    confirm: impl FnOnce(&str) -> std::io::Result<bool>,
) -> Result<RestoreSummary> {
    info!("Restoring backup for media files");
    let (input_filename, input_file) = get_backup_file(source, restore_config)?;
    info!("Restoring: {}", input_filename);

    let detransformed = transform::invert(
        input_file,
        &input_filename,
        &ReadTransforms {
            decrypt: restore_config.decrypt,
            decompress: restore_config.uncompress,
            passphrase: restore_config.passphrase.clone(),
        },
        spool_max_size,
    )
    .with_context(|| format!("Failed to decode backup {}", input_filename))?;
    debug!("Backup size: {}", human_size(detransformed.size));

    if restore_config.interactive {
        let question = format!(
            "Restoring {} into {} will write files{}. Are you sure you want to continue?",
            input_filename,
            locations.labels().join(", "),
            if restore_config.replace { " and replace existing ones" } else { "" }
        );
        if !confirm(&question).context("Failed to read confirmation")? {
            return Err(MediaError::Cancelled("restore declined by user".to_string()).into());
        }
    }

    let summary = match restore_archive(detransformed.content, locations, restore_config.replace) {
        Ok(summary) => summary,
        Err(e) if e.is_format_error() => {
            return Err(anyhow::Error::new(e).context(format!(
                "{} is not a media archive for the configured locations; check the decrypt and uncompress options",
                detransformed.name
            )));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e).context(format!("Failed to restore {}", detransformed.name)));
        }
    };
    info!(
        "Restored {} file(s), replaced {}, skipped {} existing",
        summary.uploaded, summary.replaced, summary.skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::logic::{BackupDestination, backup_mediafiles};
    use crate::config::BackupConfig;
    use crate::storage::MemoryStorage;

    fn restore_config() -> RestoreConfig {
        RestoreConfig {
            input_filename: None,
            input_path: None,
            servername: None,
            decrypt: false,
            passphrase: None,
            uncompress: false,
            replace: false,
            interactive: false,
        }
    }

    fn backup_config(compress: bool, encrypt: bool) -> BackupConfig {
        BackupConfig {
            compress,
            encrypt,
            passphrase: encrypt.then(|| "pw".to_string()),
            servername: Some("web01".to_string()),
            output_filename: None,
            output_path: None,
            clean: false,
            cleanup_keep: 10,
        }
    }

    fn media_locations() -> anyhow::Result<StorageLocations> {
        Ok(StorageLocations::new()
            .with_location(
                "default",
                Arc::new(MemoryStorage::with_files([("a.txt", &b"hi"[..]), ("sub/b.txt", &b"yo"[..])])),
            )?
            .with_location(
                "media2",
                Arc::new(MemoryStorage::with_files([("photo.jpg", &[0xffu8, 0xd8, 0xff][..])])),
            )?)
    }

    fn never_asked(_: &str) -> std::io::Result<bool> {
        panic!("confirmation should not be requested")
    }

    #[test]
    fn test_full_cycle_with_compression_and_encryption() -> anyhow::Result<()> {
        let backups: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        backup_mediafiles(
            &media_locations()?,
            &BackupDestination::Storage(backups.clone()),
            &backup_config(true, true),
            256,
        )?;

        let default = Arc::new(MemoryStorage::new());
        let media2 = Arc::new(MemoryStorage::new());
        let targets = StorageLocations::new()
            .with_location("default", default.clone())?
            .with_location("media2", media2.clone())?;

        let mut config = restore_config();
        config.decrypt = true;
        config.uncompress = true;
        config.passphrase = Some("pw".to_string());
        config.servername = Some("web01".to_string());

        let summary = restore_mediafiles(
            &targets,
            &BackupSource::Storage { storage: backups, filename: None },
            &config,
            256,
            never_asked,
        )?;
        assert_eq!(summary.uploaded, 3);
        assert_eq!(default.get("sub/b.txt").as_deref(), Some(&b"yo"[..]));
        assert_eq!(media2.get("photo.jpg").as_deref(), Some(&[0xffu8, 0xd8, 0xff][..]));
        Ok(())
    }

    #[test]
    fn test_wrong_passphrase_touches_nothing() -> anyhow::Result<()> {
        let backups: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let outcome = backup_mediafiles(
            &media_locations()?,
            &BackupDestination::Storage(backups.clone()),
            &backup_config(false, true),
            256,
        )?;

        let default = Arc::new(MemoryStorage::new());
        let targets = StorageLocations::new().with_location("default", default.clone())?;
        let mut config = restore_config();
        config.decrypt = true;
        config.passphrase = Some("not-pw".to_string());

        let err = restore_mediafiles(
            &targets,
            &BackupSource::Storage { storage: backups, filename: Some(outcome.filename) },
            &config,
            256,
            never_asked,
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<MediaError>(), Some(MediaError::Transform(_))));
        assert!(default.is_empty());
        Ok(())
    }

    #[test]
    fn test_declined_confirmation_cancels() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("media.tar");
        backup_mediafiles(
            &media_locations()?,
            &BackupDestination::Path(path.clone()),
            &backup_config(false, false),
            256,
        )?;

        let default = Arc::new(MemoryStorage::new());
        let media2 = Arc::new(MemoryStorage::new());
        let targets = StorageLocations::new()
            .with_location("default", default.clone())?
            .with_location("media2", media2.clone())?;
        let mut config = restore_config();
        config.interactive = true;

        let err = restore_mediafiles(&targets, &BackupSource::Path(path.clone()), &config, 256, |_| Ok(false))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<MediaError>(), Some(MediaError::Cancelled(_))));
        assert!(default.is_empty() && media2.is_empty());

        let summary =
            restore_mediafiles(&targets, &BackupSource::Path(path), &config, 256, |_| Ok(true))?;
        assert_eq!(summary.uploaded, 3);
        Ok(())
    }

    #[test]
    fn test_unreadable_archive_points_at_flags() -> anyhow::Result<()> {
        let backups: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let outcome = backup_mediafiles(
            &media_locations()?,
            &BackupDestination::Storage(backups.clone()),
            &backup_config(true, false),
            256,
        )?;

        let default = Arc::new(MemoryStorage::new());
        let targets = StorageLocations::new().with_location("default", default.clone())?;
        let err = restore_mediafiles(
            &targets,
            &BackupSource::Storage { storage: backups, filename: Some(outcome.filename) },
            &restore_config(),
            256,
            never_asked,
        )
        .unwrap_err();
        assert!(matches!(err.downcast_ref::<MediaError>(), Some(MediaError::Format(_))));
        assert!(err.to_string().contains("check the decrypt and uncompress options"));
        assert!(default.is_empty());
        Ok(())
    }

    #[test]
    fn test_object_source_uses_key_basename() -> anyhow::Result<()> {
        let storage = Arc::new(MemoryStorage::with_files([("nested/dir/archive.tar", &b""[..])]));
        let (name, _) = get_backup_file(
            &BackupSource::Object { storage, key: "nested/dir/archive.tar".to_string() },
            &restore_config(),
        )?;
        assert_eq!(name, "archive.tar");
        Ok(())
    }
}
