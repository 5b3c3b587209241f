// mediabackup/src/backup/archive.rs
use std::io::{self, Read, Write};
use tar::{Builder, EntryType, Header};
use tracing::info;

use super::explore::explore;
use crate::errors::{MediaError, Result};
use crate::storage::StorageLocations;
use crate::transform::gzip_writer;
use crate::utils::QualifiedPath;

/// Reader that fails unless the content is exactly the size declared in the tar header.
struct ExactSize<R> {
    inner: io::Take<R>,
    remaining: u64,
}

impl<R: Read> ExactSize<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner: inner.take(size),
            remaining: size,
        }
    }
}

impl<R: Read> Read for ExactSize<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            if self.remaining > 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("content ended {} bytes before its declared size", self.remaining),
                ));
            }
            let mut extra = [0u8; 1];
            if self.inner.get_mut().read(&mut extra)? != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "content is longer than its declared size",
                ));
            }
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Writes every file of every location into a tar stream on `destination`.
///
/// Entries are named `<label>/<path within location>` and carry the exact
/// byte length reported by the storage. When `compressed` is set the tar
/// stream is gzipped on the way out.
///
/// # Returns
/// The destination writer, after the archive has been finished.
pub fn build_archive<W: Write>(
    locations: &StorageLocations,
    destination: W,
    compressed: bool,
) -> Result<W> {
    if compressed {
        let encoder = write_entries(locations, gzip_writer(destination))?;
        Ok(encoder.finish()?)
    } else {
        write_entries(locations, destination)
    }
}

fn write_entries<W: Write>(locations: &StorageLocations, destination: W) -> Result<W> {
    let mut tar_builder = Builder::new(destination);
    let mtime = chrono::Utc::now().timestamp().max(0) as u64;

    for (label, content_storage) in locations.iter() {
        for content_filename in explore(label, content_storage.as_ref()) {
            let content_filename = content_filename?;
            let qualified = QualifiedPath::new(label, &content_filename);

            let content_file = content_storage
                .open(&content_filename)
                .map_err(|e| MediaError::storage(label, content_filename.as_str(), e))?;

            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(content_file.size);
            header.set_mode(0o644);
            header.set_mtime(mtime);

            info!("Adding {} - {} bytes", qualified, content_file.size);
            tar_builder
                .append_data(
                    &mut header,
                    qualified.to_string(),
                    ExactSize::new(content_file.reader, content_file.size),
                )
                .map_err(|e| MediaError::storage(label, content_filename.as_str(), e))?;
        }
    }

    Ok(tar_builder.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, Storage, StoredFile};
    use flate2::read::GzDecoder;
    use std::sync::Arc;

    fn entries(archive: &[u8]) -> anyhow::Result<Vec<(String, u64, Vec<u8>)>> {
        let mut archive = tar::Archive::new(archive);
        let mut out = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let size = entry.header().size()?;
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            out.push((path, size, content));
        }
        Ok(out)
    }

    #[test]
    fn test_builds_qualified_entries() -> anyhow::Result<()> {
        let l1 = MemoryStorage::with_files([("a.txt", &b"hi"[..]), ("sub/b.txt", &b"yo"[..])]);
        let locations = StorageLocations::new().with_location("default", Arc::new(l1))?;

        let archive = build_archive(&locations, Vec::new(), false)?;
        let mut found = entries(&archive)?;
        found.sort();
        assert_eq!(
            found,
            vec![
                ("default/a.txt".to_string(), 2, b"hi".to_vec()),
                ("default/sub/b.txt".to_string(), 2, b"yo".to_vec()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_multiple_locations_and_empty_files() -> anyhow::Result<()> {
        let locations = StorageLocations::new()
            .with_location("default", Arc::new(MemoryStorage::with_files([("empty", &b""[..])])))?
            .with_location("media2", Arc::new(MemoryStorage::with_files([("x/y.bin", &[1u8, 2, 3][..])])))?;

        let archive = build_archive(&locations, Vec::new(), false)?;
        let mut found = entries(&archive)?;
        found.sort();
        assert_eq!(
            found,
            vec![
                ("default/empty".to_string(), 0, Vec::new()),
                ("media2/x/y.bin".to_string(), 3, vec![1, 2, 3]),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_empty_location_gives_valid_empty_archive() -> anyhow::Result<()> {
        let locations =
            StorageLocations::new().with_location("default", Arc::new(MemoryStorage::new()))?;
        let archive = build_archive(&locations, Vec::new(), false)?;
        assert!(!archive.is_empty());
        assert!(entries(&archive)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_compressed_archive_is_gzip() -> anyhow::Result<()> {
        let l1 = MemoryStorage::with_files([("a.txt", &b"hi"[..])]);
        let locations = StorageLocations::new().with_location("default", Arc::new(l1))?;

        let archive = build_archive(&locations, Vec::new(), true)?;
        assert_eq!(&archive[..2], &[0x1f, 0x8b]);

        let mut plain = Vec::new();
        GzDecoder::new(&archive[..]).read_to_end(&mut plain)?;
        assert_eq!(entries(&plain)?.len(), 1);
        Ok(())
    }

    /// Lists one file whose reader yields a different length than it reports.
    #[derive(Debug)]
    struct Misreported {
        declared: u64,
        content: &'static [u8],
    }

    impl Storage for Misreported {
        fn describe(&self) -> String {
            "misreported".to_string()
        }
        fn listdir(&self, _path: &str) -> io::Result<(Vec<String>, Vec<String>)> {
            Ok((Vec::new(), vec!["liar.bin".to_string()]))
        }
        fn open(&self, _path: &str) -> io::Result<StoredFile> {
            Ok(StoredFile {
                size: self.declared,
                reader: Box::new(io::Cursor::new(self.content)),
            })
        }
        fn save(&self, _path: &str, _content: &mut dyn Read) -> io::Result<()> {
            unreachable!()
        }
        fn delete(&self, _path: &str) -> io::Result<()> {
            unreachable!()
        }
        fn exists(&self, _path: &str) -> io::Result<bool> {
            unreachable!()
        }
    }

    #[test]
    fn test_short_content_fails_the_build() -> anyhow::Result<()> {
        let storage = Misreported { declared: 10, content: &[0u8; 4] };
        let locations = StorageLocations::new().with_location("default", Arc::new(storage))?;
        let err = build_archive(&locations, Vec::new(), false).unwrap_err();
        assert!(matches!(err, MediaError::Storage { ref path, .. } if path == "liar.bin"));
        Ok(())
    }

    #[test]
    fn test_long_content_fails_the_build() -> anyhow::Result<()> {
        let storage = Misreported { declared: 2, content: b"hello" };
        let locations = StorageLocations::new().with_location("default", Arc::new(storage))?;
        let err = build_archive(&locations, Vec::new(), false).unwrap_err();
        match err {
            MediaError::Storage { path, source, .. } => {
                assert_eq!(path, "liar.bin");
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
            }
            other => panic!("expected storage error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_missing_file_fails_the_build() -> anyhow::Result<()> {
        #[derive(Debug)]
        struct Vanishing;
        impl Storage for Vanishing {
            fn describe(&self) -> String {
                "vanishing".to_string()
            }
            fn listdir(&self, _path: &str) -> io::Result<(Vec<String>, Vec<String>)> {
                Ok((Vec::new(), vec!["gone.txt".to_string()]))
            }
            fn open(&self, _path: &str) -> io::Result<StoredFile> {
                Err(io::Error::new(io::ErrorKind::NotFound, "gone"))
            }
            fn save(&self, _path: &str, _content: &mut dyn Read) -> io::Result<()> {
                unreachable!()
            }
            fn delete(&self, _path: &str) -> io::Result<()> {
                unreachable!()
            }
            fn exists(&self, _path: &str) -> io::Result<bool> {
                unreachable!()
            }
        }

        let locations = StorageLocations::new().with_location("default", Arc::new(Vanishing))?;
        assert!(build_archive(&locations, Vec::new(), false).is_err());
        Ok(())
    }
}
