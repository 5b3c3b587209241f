// mediabackup/src/restore/archive.rs
use std::io::Read;
use tar::Archive;
use tracing::{debug, info, warn};

use crate::errors::{MediaError, Result};
use crate::storage::{Storage, StorageLocations};
use crate::utils::QualifiedPath;

/// Counts of what happened to each restored file entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RestoreSummary {
    pub uploaded: usize,
    pub replaced: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    Uploaded,
    Replaced,
    Skipped,
}

/// Saves one entry into its location, honouring the conflict policy.
fn upload_file(
    content_storage: &dyn Storage,
    qualified: &QualifiedPath,
    content: &mut dyn Read,
    replace: bool,
) -> Result<UploadOutcome> {
    let name = qualified.path.as_str();
    let storage_error = |e| MediaError::storage(qualified.label.as_str(), name, e);

    let mut outcome = UploadOutcome::Uploaded;
    if content_storage.exists(name).map_err(storage_error)? {
        if !replace {
            info!("{} already exists in {}, skipping", name, qualified.label);
            return Ok(UploadOutcome::Skipped);
        }
        content_storage.delete(name).map_err(storage_error)?;
        info!("{} deleted from {}", name, qualified.label);
        outcome = UploadOutcome::Replaced;
    }

    content_storage.save(name, content).map_err(storage_error)?;
    info!("{} uploaded to {}", name, qualified.label);
    Ok(outcome)
}

/// Reads a plain (already decrypted and decompressed) tar stream and puts
/// every file entry back into the location named by its first path segment.
///
/// Entries are processed one at a time. A failure stops the restore; files
/// restored before it stay in place.
pub fn restore_archive<R: Read>(
    input: R,
    locations: &StorageLocations,
    replace: bool,
) -> Result<RestoreSummary> {
    let mut archive = Archive::new(input);
    let mut summary = RestoreSummary::default();

    let entries = archive
        .entries()
        .map_err(|e| MediaError::Format(format!("Failed to read archive: {}", e)))?;

    for entry in entries {
        let mut entry =
            entry.map_err(|e| MediaError::Format(format!("Failed to read archive entry: {}", e)))?;

        let raw_path = String::from_utf8(entry.path_bytes().into_owned()).map_err(|_| {
            MediaError::Format("Archive entry path is not valid UTF-8".to_string())
        })?;
        let entry_type = entry.header().entry_type();

        if entry_type.is_dir() || raw_path.ends_with('/') {
            debug!("Skipping directory entry {}", raw_path);
            continue;
        }
        if !entry_type.is_file() {
            warn!("Skipping {} : unsupported entry type {:?}", raw_path, entry_type);
            continue;
        }

        let qualified = QualifiedPath::parse(&raw_path)?;
        let content_storage =
            locations
                .get(&qualified.label)
                .ok_or_else(|| MediaError::UnknownLocation {
                    label: qualified.label.clone(),
                    path: raw_path.clone(),
                })?;
        info!("Extracting {} for {}", qualified.path, qualified.label);

        match upload_file(content_storage.as_ref(), &qualified, &mut entry, replace)? {
            UploadOutcome::Uploaded => summary.uploaded += 1,
            UploadOutcome::Replaced => summary.replaced += 1,
            UploadOutcome::Skipped => summary.skipped += 1,
        }
    }

    Ok(summary)
}
