use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage operation failed on '{label}' for '{path}': {source}")]
    Storage {
        label: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid archive: {0}")]
    Format(String),

    #[error("Archive entry '{path}' refers to unknown location '{label}'")]
    UnknownLocation { label: String, path: String },

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl MediaError {
    pub fn storage(label: impl Into<String>, path: impl Into<String>, source: std::io::Error) -> Self {
        MediaError::Storage {
            label: label.into(),
            path: path.into(),
            source,
        }
    }

    /// True for the errors a restore raises when the archive itself is unusable.
    pub fn is_format_error(&self) -> bool {
        matches!(self, MediaError::Format(_) | MediaError::UnknownLocation { .. })
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
