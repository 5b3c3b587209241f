// mediabackup/src/backup/explore.rs
use std::collections::VecDeque;

use crate::errors::{MediaError, Result};
use crate::storage::{Storage, join_path};

/// Lazily walks every regular file in a storage location.
///
/// Keeps an explicit work-list of directories seeded with the root. Stops
/// after yielding the first listing error.
pub struct Explorer<'a> {
    label: &'a str,
    storage: &'a dyn Storage,
    dirs: Vec<String>,
    pending: VecDeque<String>,
    failed: bool,
}

pub fn explore<'a>(label: &'a str, storage: &'a dyn Storage) -> Explorer<'a> {
    Explorer {
        label,
        storage,
        dirs: vec![String::new()],
        pending: VecDeque::new(),
        failed: false,
    }
}

impl Iterator for Explorer<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.pending.pop_front() {
                return Some(Ok(file));
            }
            if self.failed {
                return None;
            }
            let dir = self.dirs.pop()?;
            match self.storage.listdir(&dir) {
                Ok((subdirs, files)) => {
                    self.pending
                        .extend(files.iter().map(|name| join_path(&dir, name)));
                    self.dirs
                        .extend(subdirs.iter().map(|name| join_path(&dir, name)));
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(MediaError::storage(self.label, dir, e)));
                }
            }
        }
    }
}
