// mediabackup/src/storage/mod.rs
pub mod local;
pub mod memory;
pub mod s3;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;

use crate::errors::{MediaError, Result};

pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use s3::S3Storage;

/// An opened file: its exact byte length plus a reader over the content.
pub struct StoredFile {
    pub size: u64,
    pub reader: Box<dyn Read + Send>,
}

impl fmt::Debug for StoredFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredFile").field("size", &self.size).finish()
    }
}

/// Capability set of a storage backend, addressed by `/`-separated paths
/// relative to the backend's root.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Human readable description used in log lines.
    fn describe(&self) -> String;

    /// Immediate subdirectories and files of `path` (`""` is the root).
    fn listdir(&self, path: &str) -> io::Result<(Vec<String>, Vec<String>)>;

    fn open(&self, path: &str) -> io::Result<StoredFile>;

    /// Writes `content` to `path`, creating any parent structure.
    fn save(&self, path: &str, content: &mut dyn Read) -> io::Result<()>;

    fn delete(&self, path: &str) -> io::Result<()>;

    fn exists(&self, path: &str) -> io::Result<bool>;
}

/// Joins a directory and a name the way storage paths are written.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Checks that a label can be used as the first segment of an archive path.
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label.contains('/') || label == "." || label == ".." {
        return Err(MediaError::Config(format!(
            "Invalid location label '{}': labels must be non-empty and must not contain '/'",
            label
        )));
    }
    Ok(())
}

/// Immutable registry of named storage locations.
#[derive(Clone, Default)]
pub struct StorageLocations {
    locations: BTreeMap<String, Arc<dyn Storage>>,
}

impl StorageLocations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, label: &str, storage: Arc<dyn Storage>) -> Result<Self> {
        self.insert(label, storage)?;
        Ok(self)
    }

    pub fn insert(&mut self, label: &str, storage: Arc<dyn Storage>) -> Result<()> {
        validate_label(label)?;
        if self.locations.contains_key(label) {
            return Err(MediaError::Config(format!("Duplicate location label '{}'", label)));
        }
        self.locations.insert(label.to_string(), storage);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Arc<dyn Storage>> {
        self.locations.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn Storage>)> {
        self.locations.iter().map(|(label, storage)| (label.as_str(), storage))
    }

    pub fn labels(&self) -> Vec<&str> {
        self.locations.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

impl fmt::Debug for StorageLocations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.locations.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("sub", "b.txt"), "sub/b.txt");
        assert_eq!(join_path("sub/", "b.txt"), "sub/b.txt");
    }

    #[test]
    fn test_locations_reject_bad_labels() {
        let mut locations = StorageLocations::new();
        assert!(locations.insert("", Arc::new(MemoryStorage::new())).is_err());
        assert!(locations.insert("a/b", Arc::new(MemoryStorage::new())).is_err());
        assert!(locations.insert("default", Arc::new(MemoryStorage::new())).is_ok());
        assert!(locations.insert("default", Arc::new(MemoryStorage::new())).is_err());
        assert_eq!(locations.labels(), vec!["default"]);
    }

    #[test]
    fn test_locations_iterate_in_label_order() -> anyhow::Result<()> {
        let locations = StorageLocations::new()
            .with_location("media2", Arc::new(MemoryStorage::new()))?
            .with_location("default", Arc::new(MemoryStorage::new()))?;
        let labels: Vec<&str> = locations.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["default", "media2"]);
        assert_eq!(locations.len(), 2);
        assert!(locations.get("unknown").is_none());
        Ok(())
    }
}
