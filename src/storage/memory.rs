// mediabackup/src/storage/memory.rs
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Cursor, Read};
use std::sync::{Mutex, MutexGuard};

use super::{Storage, StoredFile};

/// In-process storage keyed by path. Useful for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Self {
        let storage = Self::new();
        for (path, content) in files {
            storage.put(path, content.to_vec());
        }
        storage
    }

    fn lock(&self) -> io::Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.files
            .lock()
            .map_err(|_| io::Error::other("memory storage lock poisoned"))
    }

    pub fn put(&self, path: &str, content: Vec<u8>) {
        if let Ok(mut files) = self.lock() {
            files.insert(path.to_string(), content);
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().ok().and_then(|files| files.get(path).cloned())
    }

    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn listdir(&self, path: &str) -> io::Result<(Vec<String>, Vec<String>)> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };

        let files = self.lock()?;
        let mut dirs = BTreeSet::new();
        let mut names = Vec::new();
        for key in files.keys() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => names.push(rest.to_string()),
            }
        }

        if !prefix.is_empty() && dirs.is_empty() && names.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No such directory: {}", path),
            ));
        }
        Ok((dirs.into_iter().collect(), names))
    }

    fn open(&self, path: &str) -> io::Result<StoredFile> {
        let content = self.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("No such file: {}", path))
        })?;
        Ok(StoredFile {
            size: content.len() as u64,
            reader: Box::new(Cursor::new(content)),
        })
    }

    fn save(&self, path: &str, content: &mut dyn Read) -> io::Result<()> {
        let mut buffer = Vec::new();
        content.read_to_end(&mut buffer)?;
        self.lock()?.insert(path.to_string(), buffer);
        Ok(())
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        match self.lock()?.remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("No such file: {}", path),
            )),
        }
    }

    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.lock()?.contains_key(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listdir_groups_nested_paths() -> anyhow::Result<()> {
        let storage = MemoryStorage::with_files([
            ("a.txt", &b"hi"[..]),
            ("sub/b.txt", &b"yo"[..]),
            ("sub/deeper/c.txt", &b"!"[..]),
        ]);

        let (dirs, files) = storage.listdir("")?;
        assert_eq!(dirs, vec!["sub"]);
        assert_eq!(files, vec!["a.txt"]);

        let (dirs, files) = storage.listdir("sub")?;
        assert_eq!(dirs, vec!["deeper"]);
        assert_eq!(files, vec!["b.txt"]);

        assert!(storage.listdir("missing").is_err());
        Ok(())
    }

    #[test]
    fn test_empty_root_lists_nothing() -> anyhow::Result<()> {
        let storage = MemoryStorage::new();
        let (dirs, files) = storage.listdir("")?;
        assert!(dirs.is_empty() && files.is_empty());
        Ok(())
    }
}
