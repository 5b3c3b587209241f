// mediabackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::storage::{self, LocalStorage, S3Storage, Storage, StorageLocations};
use crate::utils::DEFAULT_TMP_FILE_MAX_SIZE;

pub const PASSPHRASE_ENV: &str = "MEDIABACKUP_PASSPHRASE";
pub const DEFAULT_CLEANUP_KEEP: usize = 10;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonStorageConfig {
    Local {
        root: PathBuf,
    },
    S3 {
        bucket_name: Option<String>,
        folder_prefix: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonBackupOptions {
    #[serde(default)]
    pub compress: bool,
    #[serde(default)]
    pub encrypt: bool,
    pub servername: Option<String>,
    pub output_filename: Option<String>,
    pub output_path: Option<String>,
    #[serde(default)]
    pub clean: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRestoreOptions {
    pub input_filename: Option<String>,
    pub input_path: Option<String>,
    pub servername: Option<String>,
    #[serde(default)]
    pub decrypt: bool,
    pub passphrase: Option<String>,
    #[serde(default)]
    pub uncompress: bool,
    #[serde(default)]
    pub replace: bool,
    #[serde(default)]
    pub interactive: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub verbose: Option<bool>,
    pub tmp_file_max_size: Option<usize>,
    pub passphrase: Option<String>,
    pub cleanup_keep: Option<usize>,
    pub locations: BTreeMap<String, JsonStorageConfig>,
    pub backup_storage: Option<JsonStorageConfig>,
    pub backup: Option<JsonBackupOptions>,
    pub restore: Option<JsonRestoreOptions>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub compress: bool,
    pub encrypt: bool,
    pub passphrase: Option<String>,
    pub servername: Option<String>,
    pub output_filename: Option<String>,
    pub output_path: Option<String>,
    pub clean: bool,
    pub cleanup_keep: usize,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub input_filename: Option<String>,
    pub input_path: Option<String>,
    pub servername: Option<String>,
    pub decrypt: bool,
    pub passphrase: Option<String>,
    pub uncompress: bool,
    pub replace: bool,
    pub interactive: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub operation: Option<OperationConfig>,
    pub spaces_config: Option<SpacesConfig>,
    pub tmp_file_max_size: usize,
    pub verbose: bool,
    pub raw_json_config: RawJsonConfig, // Store the parsed raw config
}

#[derive(Debug, Clone)]
pub enum OperationConfig {
    Backup(BackupConfig),
    Restore(RestoreConfig),
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!(
                "Failed to parse JSON from config file at {}",
                config_path.display()
            )
        })
    }

    pub fn from_json_str(config_content: &str) -> Result<Self> {
        let raw_json_config: RawJsonConfig =
            serde_json::from_str(config_content).context("Invalid configuration JSON")?;

        if raw_json_config.locations.is_empty() {
            anyhow::bail!("At least one entry in 'locations' must be configured.");
        }
        for label in raw_json_config.locations.keys() {
            storage::validate_label(label)?;
        }

        let spaces_config = raw_json_config.s3_storage.as_ref().and_then(|s3_raw| {
            if let (Some(bucket), Some(region), Some(key_id), Some(secret), Some(endpoint)) = (
                s3_raw.bucket_name.as_ref().filter(|s| !s.is_empty()), // Ensure not empty
                s3_raw.region.as_ref().filter(|s| !s.is_empty()),
                s3_raw.access_key_id.as_ref().filter(|s| !s.is_empty()),
                s3_raw.secret_access_key.as_ref().filter(|s| !s.is_empty()),
                s3_raw.endpoint_url.as_ref().filter(|s| !s.is_empty()),
            ) {
                Some(SpacesConfig {
                    bucket_name: bucket.clone(),
                    region: region.clone(),
                    access_key_id: key_id.clone(),
                    secret_access_key: secret.clone(),
                    endpoint_url: endpoint.clone(),
                    folder_prefix: s3_raw.folder_prefix.clone().filter(|s| !s.is_empty()),
                })
            } else {
                // Only warn if some S3 fields were provided but were incomplete/empty
                tracing::warn!(
                    "S3 configuration is present but some required fields (bucket_name, region, access_key_id, secret_access_key, endpoint_url) are missing or empty. S3 storage will be disabled."
                );
                None
            }
        });

        Ok(AppConfig {
            operation: None, // To be filled by main after parsing CLI args
            spaces_config,
            tmp_file_max_size: raw_json_config
                .tmp_file_max_size
                .unwrap_or(DEFAULT_TMP_FILE_MAX_SIZE),
            verbose: raw_json_config.verbose.unwrap_or(false),
            raw_json_config,
        })
    }

    /// Instantiates one backend per configured location.
    pub async fn build_locations(&self) -> Result<StorageLocations> {
        let mut locations = StorageLocations::new();
        for (label, storage_config) in &self.raw_json_config.locations {
            let storage = self
                .build_storage(storage_config)
                .await
                .with_context(|| format!("Failed to configure location '{}'", label))?;
            locations.insert(label, storage)?;
        }
        Ok(locations)
    }

    /// The storage backups are written to and discovered in, if configured.
    pub async fn build_backup_storage(&self) -> Result<Option<Arc<dyn Storage>>> {
        match &self.raw_json_config.backup_storage {
            Some(storage_config) => Ok(Some(
                self.build_storage(storage_config)
                    .await
                    .context("Failed to configure backup_storage")?,
            )),
            None => Ok(None),
        }
    }

    pub async fn build_storage(&self, storage_config: &JsonStorageConfig) -> Result<Arc<dyn Storage>> {
        match storage_config {
            JsonStorageConfig::Local { root } => {
                if root.as_os_str().is_empty() {
                    anyhow::bail!("Local storage root cannot be empty.");
                }
                Ok(Arc::new(LocalStorage::new(root.clone())))
            }
            JsonStorageConfig::S3 {
                bucket_name,
                folder_prefix,
            } => {
                let spaces_config = self.require_spaces()?;
                let bucket = bucket_name
                    .as_deref()
                    .filter(|b| !b.is_empty())
                    .unwrap_or(&spaces_config.bucket_name);
                Ok(Arc::new(
                    S3Storage::connect(
                        spaces_config,
                        bucket,
                        folder_prefix.as_deref(),
                        self.tmp_file_max_size,
                    )
                    .await,
                ))
            }
        }
    }

    /// Storage rooted at a bucket, for explicit `s3://bucket/key` paths.
    pub async fn build_bucket_storage(&self, bucket: &str) -> Result<Arc<dyn Storage>> {
        let spaces_config = self.require_spaces()?;
        Ok(Arc::new(
            S3Storage::connect(spaces_config, bucket, None, self.tmp_file_max_size).await,
        ))
    }

    fn require_spaces(&self) -> Result<&SpacesConfig> {
        self.spaces_config.as_ref().context(
            "S3 storage is used but s3_storage is not fully configured or is missing required fields.",
        )
    }
}

/// Picks the first passphrase that is set: explicit, configured, then environment.
fn pick_passphrase(
    explicit: Option<&str>,
    configured: Option<&str>,
    from_env: Option<String>,
) -> Option<String> {
    explicit
        .filter(|p| !p.is_empty())
        .or(configured.filter(|p| !p.is_empty()))
        .map(str::to_string)
        .or(from_env.filter(|p| !p.is_empty()))
}

fn resolve_passphrase(explicit: Option<&str>, configured: Option<&str>) -> Option<String> {
    pick_passphrase(explicit, configured, std::env::var(PASSPHRASE_ENV).ok())
}

pub fn load_backup_config_from_json(raw_config: &RawJsonConfig) -> Result<BackupConfig> {
    let options = raw_config.backup.clone().unwrap_or_default();
    let passphrase = resolve_passphrase(None, raw_config.passphrase.as_deref());

    if options.encrypt && passphrase.is_none() {
        anyhow::bail!(
            "backup.encrypt is set but no passphrase is configured (config 'passphrase' or {}).",
            PASSPHRASE_ENV
        );
    }
    if options.output_path.is_none() && raw_config.backup_storage.is_none() {
        anyhow::bail!("Either backup.output_path or backup_storage must be set in config.json for backup.");
    }
    if options
        .output_filename
        .as_deref()
        .is_some_and(|f| f.trim().is_empty() || f.contains('/'))
    {
        anyhow::bail!("backup.output_filename must be a plain, non-empty file name.");
    }

    Ok(BackupConfig {
        compress: options.compress,
        encrypt: options.encrypt,
        passphrase,
        servername: options.servername.filter(|s| !s.is_empty()),
        output_filename: options.output_filename,
        output_path: options.output_path.filter(|p| !p.trim().is_empty()),
        clean: options.clean,
        cleanup_keep: raw_config.cleanup_keep.unwrap_or(DEFAULT_CLEANUP_KEEP),
    })
}

pub fn load_restore_config_from_json(raw_config: &RawJsonConfig) -> Result<RestoreConfig> {
    let options = raw_config.restore.clone().unwrap_or_default();
    let passphrase = resolve_passphrase(options.passphrase.as_deref(), raw_config.passphrase.as_deref());

    if options.decrypt && passphrase.is_none() {
        anyhow::bail!(
            "restore.decrypt is set but no passphrase is configured (restore.passphrase, 'passphrase' or {}).",
            PASSPHRASE_ENV
        );
    }
    if options.input_path.is_none() && raw_config.backup_storage.is_none() {
        anyhow::bail!("Either restore.input_path or backup_storage must be set in config.json for restore.");
    }

    Ok(RestoreConfig {
        input_filename: options.input_filename.filter(|f| !f.trim().is_empty()),
        input_path: options.input_path.filter(|p| !p.trim().is_empty()),
        servername: options.servername.filter(|s| !s.is_empty()),
        decrypt: options.decrypt,
        passphrase,
        uncompress: options.uncompress,
        replace: options.replace,
        interactive: options.interactive,
    })
}
