// mediabackup/src/storage/s3.rs
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tempfile::{NamedTempFile, SpooledTempFile};
use tokio::runtime::Handle;

use super::{Storage, StoredFile};
use crate::config::SpacesConfig;
use crate::errors::{MediaError, Result};

/// Parses an S3 URI (s3://bucket/key) into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let uri = url::Url::parse(s3_uri)
        .map_err(|e| MediaError::Config(format!("Invalid S3 URI format '{}': {}", s3_uri, e)))?;
    if uri.scheme() != "s3" {
        return Err(MediaError::Config("S3 URI must start with s3://".to_string()));
    }
    let bucket = uri
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| MediaError::Config(format!("S3 URI missing bucket name: {}", s3_uri)))?
        .to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(MediaError::Config(format!(
            "S3 URI missing key (object path): {}",
            s3_uri
        )));
    }
    Ok((bucket, key))
}

/// Builds an S3 client for an S3-compatible service (like DigitalOcean Spaces).
pub async fn build_client(spaces_config: &SpacesConfig) -> s3::Client {
    let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
        .endpoint_url(&spaces_config.endpoint_url)
        .region(Region::new(spaces_config.region.clone()))
        .credentials_provider(s3::config::Credentials::new(
            &spaces_config.access_key_id,
            &spaces_config.secret_access_key,
            None,     // session_token
            None,     // expiry
            "Static", // provider_name
        ))
        .load()
        .await;

    s3::Client::new(&sdk_config)
}

fn sdk_error<E: std::error::Error>(context: String, err: E) -> io::Error {
    io::Error::other(format!("{}: {}", context, DisplayErrorContext(&err)))
}

/// Objects under an optional key prefix in one bucket.
///
/// The storage interface is blocking; SDK futures are driven on the runtime
/// captured at construction, so methods must be called from a blocking
/// context (e.g. inside `spawn_blocking`), never from an async task.
#[derive(Debug, Clone)]
pub struct S3Storage {
    client: s3::Client,
    bucket: String,
    prefix: Option<String>,
    handle: Handle,
    spool_max_size: usize,
}

impl S3Storage {
    pub async fn connect(
        spaces_config: &SpacesConfig,
        bucket: &str,
        prefix: Option<&str>,
        spool_max_size: usize,
    ) -> Self {
        let client = build_client(spaces_config).await;
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty()),
            handle: Handle::current(),
            spool_max_size,
        }
    }

    fn key(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        match &self.prefix {
            Some(prefix) if path.is_empty() => prefix.clone(),
            Some(prefix) => format!("{}/{}", prefix, path),
            None => path.to_string(),
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.handle.block_on(future)
    }
}

impl Storage for S3Storage {
    fn describe(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("s3://{}/{}", self.bucket, prefix),
            None => format!("s3://{}", self.bucket),
        }
    }

    fn listdir(&self, path: &str) -> io::Result<(Vec<String>, Vec<String>)> {
        let mut prefix = self.key(path);
        if !prefix.is_empty() && !prefix.ends_with('/') {
            prefix.push('/');
        }

        self.block_on(async {
            let mut dirs = Vec::new();
            let mut files = Vec::new();
            let mut continuation_token: Option<String> = None;

            loop {
                let response = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&prefix)
                    .delimiter("/")
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|e| {
                        sdk_error(format!("Failed to list s3://{}/{}", self.bucket, prefix), e)
                    })?;

                for common_prefix in response.common_prefixes() {
                    if let Some(name) = common_prefix
                        .prefix()
                        .and_then(|p| p.strip_prefix(prefix.as_str()))
                        .map(|p| p.trim_end_matches('/'))
                        .filter(|p| !p.is_empty())
                    {
                        dirs.push(name.to_string());
                    }
                }
                for object in response.contents() {
                    if let Some(name) = object
                        .key()
                        .and_then(|k| k.strip_prefix(prefix.as_str()))
                        .filter(|k| !k.is_empty() && !k.ends_with('/'))
                    {
                        files.push(name.to_string());
                    }
                }

                match response.next_continuation_token() {
                    Some(token) if response.is_truncated() == Some(true) => {
                        continuation_token = Some(token.to_string());
                    }
                    _ => break,
                }
            }
            Ok::<_, io::Error>((dirs, files))
        })
    }

    fn open(&self, path: &str) -> io::Result<StoredFile> {
        let key = self.key(path);
        self.block_on(async {
            let mut object = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| sdk_error(format!("Failed to get object s3://{}/{}", self.bucket, key), e))?;

            let mut spool = SpooledTempFile::new(self.spool_max_size);
            let mut size = 0u64;
            while let Some(bytes_chunk) = object.body.try_next().await.map_err(|e| {
                sdk_error(format!("Failed to read object s3://{}/{}", self.bucket, key), e)
            })? {
                spool.write_all(&bytes_chunk)?;
                size += bytes_chunk.len() as u64;
            }
            spool.seek(SeekFrom::Start(0))?;

            Ok::<_, io::Error>(StoredFile {
                size,
                reader: Box::new(spool),
            })
        })
    }

    fn save(&self, path: &str, content: &mut dyn Read) -> io::Result<()> {
        let key = self.key(path);
        let mut staged = NamedTempFile::new()?;
        io::copy(content, staged.as_file_mut())?;
        staged.as_file_mut().flush()?;

        self.block_on(async {
            let body = ByteStream::from_path(staged.path()).await.map_err(|e| {
                sdk_error(
                    format!("Failed to create ByteStream from file: {}", staged.path().display()),
                    e,
                )
            })?;

            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(body)
                .send()
                .await
                .map_err(|e| sdk_error(format!("Failed to upload s3://{}/{}", self.bucket, key), e))?;
            Ok::<_, io::Error>(())
        })
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        let key = self.key(path);
        self.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| sdk_error(format!("Failed to delete s3://{}/{}", self.bucket, key), e))?;
            Ok::<_, io::Error>(())
        })
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        let key = self.key(path);
        self.block_on(async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
            {
                Ok(_) => Ok(true),
                Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
                Err(e) => Err(sdk_error(
                    format!("Failed to check s3://{}/{}", self.bucket, key),
                    e,
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_uri() -> anyhow::Result<()> {
        let (bucket, key) = parse_s3_uri("s3://media-backups/2024/site.tar.gz")?;
        assert_eq!(bucket, "media-backups");
        assert_eq!(key, "2024/site.tar.gz");
        Ok(())
    }

    #[test]
    fn test_parse_s3_uri_rejects_missing_parts() {
        assert!(parse_s3_uri("https://bucket/key").is_err());
        assert!(parse_s3_uri("s3://bucket").is_err());
        assert!(parse_s3_uri("s3://bucket/").is_err());
        assert!(parse_s3_uri("not a uri").is_err());
    }
}
