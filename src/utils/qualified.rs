// mediabackup/src/utils/qualified.rs
use std::fmt;

use crate::errors::{MediaError, Result};

/// Archive entry path split into its owning location label and the path
/// inside that location. Written to tar as `<label>/<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedPath {
    pub label: String,
    pub path: String,
}

impl QualifiedPath {
    pub fn new(label: &str, path: &str) -> Self {
        Self {
            label: label.to_string(),
            path: path.trim_start_matches('/').to_string(),
        }
    }

    /// Parses an entry path read from an archive.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_start_matches("./");
        let (label, path) = trimmed.split_once('/').ok_or_else(|| {
            MediaError::Format(format!(
                "Entry '{}' has no location label prefix",
                raw
            ))
        })?;

        if label.is_empty() || path.is_empty() {
            return Err(MediaError::Format(format!(
                "Entry '{}' must look like <label>/<path>",
                raw
            )));
        }
        if path.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(MediaError::Format(format!(
                "Entry '{}' contains an empty or parent path segment",
                raw
            )));
        }

        Ok(Self::new(label, path))
    }
}

impl fmt::Display for QualifiedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.label, self.path)
    }
}
