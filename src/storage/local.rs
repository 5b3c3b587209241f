// mediabackup/src/storage/local.rs
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use super::{Storage, StoredFile};

/// Files stored below a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves a storage path below the root, refusing anything that would escape it.
    fn full_path(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("Path escapes storage root: {}", path),
                    ));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for LocalStorage {
    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }

    fn listdir(&self, path: &str) -> io::Result<(Vec<String>, Vec<String>)> {
        let dir = self.full_path(path)?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = entry.map_err(io::Error::from)?;
            let name = entry.file_name().to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Non UTF-8 file name in {}", dir.display()),
                )
            })?;

            if entry.file_type().is_dir() {
                dirs.push(name.to_string());
            } else if entry.file_type().is_file() {
                files.push(name.to_string());
            }
        }
        Ok((dirs, files))
    }

    fn open(&self, path: &str) -> io::Result<StoredFile> {
        let file = File::open(self.full_path(path)?)?;
        let size = file.metadata()?.len();
        Ok(StoredFile {
            size,
            reader: Box::new(file),
        })
    }

    fn save(&self, path: &str, content: &mut dyn Read) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        if let Some(parent) = full_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = File::create(&full_path)?;
        io::copy(content, &mut file)?;
        file.flush()
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        fs::remove_file(self.full_path(path)?)
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        self.full_path(path)?.try_exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_listdir_splits_dirs_and_files() -> anyhow::Result<()> {
        let root = tempdir()?;
        fs::create_dir_all(root.path().join("sub/deeper"))?;
        fs::write(root.path().join("a.txt"), b"hi")?;
        fs::write(root.path().join("sub/b.txt"), b"yo")?;

        let storage = LocalStorage::new(root.path());
        let (dirs, files) = storage.listdir("")?;
        assert_eq!(dirs, vec!["sub"]);
        assert_eq!(files, vec!["a.txt"]);

        let (dirs, files) = storage.listdir("sub")?;
        assert_eq!(dirs, vec!["deeper"]);
        assert_eq!(files, vec!["b.txt"]);
        Ok(())
    }

    #[test]
    fn test_save_creates_parents_and_open_reports_size() -> anyhow::Result<()> {
        let root = tempdir()?;
        let storage = LocalStorage::new(root.path());

        storage.save("x/y/z.bin", &mut &b"12345"[..])?;
        assert!(storage.exists("x/y/z.bin")?);

        let mut opened = storage.open("x/y/z.bin")?;
        assert_eq!(opened.size, 5);
        let mut content = Vec::new();
        opened.reader.read_to_end(&mut content)?;
        assert_eq!(content, b"12345");

        storage.delete("x/y/z.bin")?;
        assert!(!storage.exists("x/y/z.bin")?);
        Ok(())
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let storage = LocalStorage::new("/tmp/does-not-matter");
        let err = storage.exists("../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_listdir_missing_root_fails() {
        let storage = LocalStorage::new("/nonexistent/mediabackup/root");
        assert!(storage.listdir("").is_err());
    }
}
