// mediabackup/src/utils/locator.rs
use chrono::NaiveDateTime;
use regex::Regex;
use std::io;
use std::sync::LazyLock;
use tracing::info;

use super::{CONTENT_TYPE, DATE_FORMAT};
use crate::errors::{MediaError, Result};
use crate::storage::Storage;
use crate::transform::{COMPRESSION_SUFFIX, ENCRYPTION_SUFFIX};

const BACKUP_LABEL: &str = "backup";

static BACKUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(?:(?P<server>.+)-)?(?P<datetime>\d{{4}}-\d{{2}}-\d{{2}}-\d{{6}})-{}\.tar(?P<gz>{})?(?P<enc>{})?$",
        CONTENT_TYPE,
        regex::escape(COMPRESSION_SUFFIX),
        regex::escape(ENCRYPTION_SUFFIX),
    ))
    .expect("backup name pattern is valid")
});

/// A media backup file name recognised in a backup storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupName {
    pub filename: String,
    pub servername: Option<String>,
    pub datetime: NaiveDateTime,
    pub compressed: bool,
    pub encrypted: bool,
}

impl BackupName {
    /// Parses a generated backup name; anything else yields `None`.
    pub fn parse(filename: &str) -> Option<Self> {
        let captures = BACKUP_NAME.captures(filename)?;
        let datetime = NaiveDateTime::parse_from_str(&captures["datetime"], DATE_FORMAT).ok()?;
        Some(Self {
            filename: filename.to_string(),
            servername: captures.name("server").map(|m| m.as_str().to_string()),
            datetime,
            compressed: captures.name("gz").is_some(),
            encrypted: captures.name("enc").is_some(),
        })
    }
}

/// Lists media backups at the root of `storage`, newest first.
pub fn list_backups(
    storage: &dyn Storage,
    servername: Option<&str>,
    encrypted: bool,
    compressed: bool,
) -> Result<Vec<BackupName>> {
    let (_, files) = storage
        .listdir("")
        .map_err(|e| MediaError::storage(BACKUP_LABEL, "", e))?;

    let mut backups: Vec<BackupName> = files
        .iter()
        .filter_map(|name| BackupName::parse(name))
        .filter(|b| b.encrypted == encrypted && b.compressed == compressed)
        .filter(|b| servername.is_none_or(|s| b.servername.as_deref() == Some(s)))
        .collect();
    backups.sort_by(|a, b| b.datetime.cmp(&a.datetime).then_with(|| b.filename.cmp(&a.filename)));
    Ok(backups)
}

/// Finds the newest backup matching the server name and transform flags.
pub fn find_latest_backup(
    storage: &dyn Storage,
    servername: Option<&str>,
    encrypted: bool,
    compressed: bool,
) -> Result<String> {
    list_backups(storage, servername, encrypted, compressed)?
        .into_iter()
        .next()
        .map(|b| b.filename)
        .ok_or_else(|| {
            MediaError::storage(
                BACKUP_LABEL,
                "",
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("There's no backup file available in {}", storage.describe()),
                ),
            )
        })
}

/// Deletes all but the newest `keep` matching backups. Returns the deleted names.
pub fn cleanup_old_backups(
    storage: &dyn Storage,
    servername: Option<&str>,
    encrypted: bool,
    compressed: bool,
    keep: usize,
) -> Result<Vec<String>> {
    let backups = list_backups(storage, servername, encrypted, compressed)?;
    let mut deleted = Vec::new();
    for backup in backups.into_iter().skip(keep) {
        info!("Deleting old backup {}", backup.filename);
        storage
            .delete(&backup.filename)
            .map_err(|e| MediaError::storage(BACKUP_LABEL, backup.filename.as_str(), e))?;
        deleted.push(backup.filename);
    }
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn backups() -> MemoryStorage {
        MemoryStorage::with_files([
            ("web01-2024-01-01-000000-media.tar", &b"1"[..]),
            ("web01-2024-02-01-000000-media.tar", &b"2"[..]),
            ("web02-2024-03-01-000000-media.tar", &b"3"[..]),
            ("2024-04-01-000000-media.tar.gz", &b"4"[..]),
            ("web01-2024-05-01-000000-media.tar.gz.enc", &b"5"[..]),
            ("notes.txt", &b"x"[..]),
            ("nested/web01-2030-01-01-000000-media.tar", &b"x"[..]),
        ])
    }

    #[test]
    fn test_parse_backup_names() {
        let parsed = BackupName::parse("my-host-2024-05-01-101500-media.tar.gz.enc")
            .expect("name should parse");
        assert_eq!(parsed.servername.as_deref(), Some("my-host"));
        assert!(parsed.compressed);
        assert!(parsed.encrypted);

        let parsed = BackupName::parse("2024-05-01-101500-media.tar").expect("name should parse");
        assert_eq!(parsed.servername, None);
        assert!(!parsed.compressed && !parsed.encrypted);

        assert!(BackupName::parse("2024-05-01-101500-db.tar").is_none());
        assert!(BackupName::parse("2024-13-45-999999-media.tar").is_none());
    }

    #[test]
    fn test_find_latest_backup_filters_server_and_flags() -> anyhow::Result<()> {
        let storage = backups();
        assert_eq!(
            find_latest_backup(&storage, None, false, false)?,
            "web02-2024-03-01-000000-media.tar"
        );
        assert_eq!(
            find_latest_backup(&storage, Some("web01"), false, false)?,
            "web01-2024-02-01-000000-media.tar"
        );
        assert_eq!(
            find_latest_backup(&storage, None, false, true)?,
            "2024-04-01-000000-media.tar.gz"
        );
        assert_eq!(
            find_latest_backup(&storage, Some("web01"), true, true)?,
            "web01-2024-05-01-000000-media.tar.gz.enc"
        );
        assert!(find_latest_backup(&storage, Some("web03"), false, false).is_err());
        Ok(())
    }

    #[test]
    fn test_cleanup_keeps_newest() -> anyhow::Result<()> {
        let storage = backups();
        let deleted = cleanup_old_backups(&storage, Some("web01"), false, false, 1)?;
        assert_eq!(deleted, vec!["web01-2024-01-01-000000-media.tar"]);
        assert!(storage.get("web01-2024-02-01-000000-media.tar").is_some());
        assert!(storage.get("web02-2024-03-01-000000-media.tar").is_some());
        Ok(())
    }
}
