use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{CrawlError, Result};

pub const LOCK_FILE: &str = ".hemnet-crawler.lock";

/// Sentinel file marking a storage directory as in use. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| CrawlError::io(dir, e))?;
        let path = dir.join(LOCK_FILE);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CrawlError::Locked { path });
            }
            Err(e) => return Err(CrawlError::io(path, e)),
        };

        writeln!(file, "{}", std::process::id()).map_err(|e| CrawlError::io(&path, e))?;
        debug!("Acquired run lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the lock in `dir` when this process wrote it. For exits that
    /// skip `Drop`; a lock held by another process is left alone.
    pub fn release_own(dir: &Path) -> Result<bool> {
        let path = dir.join(LOCK_FILE);
        let holder = match fs::read_to_string(&path) {
            Ok(holder) => holder,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(CrawlError::io(path, e)),
        };
        if holder.trim() != std::process::id().to_string() {
            return Ok(false);
        }

        fs::remove_file(&path).map_err(|e| CrawlError::io(&path, e))?;
        debug!("Released run lock {}", path.display());
        Ok(true)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Could not release run lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());

        match RunLock::acquire(dir.path()) {
            Err(CrawlError::Locked { path }) => assert_eq!(path, dir.path().join(LOCK_FILE)),
            other => panic!("expected Locked, got {:?}", other),
        }

        drop(lock);
        assert!(!dir.path().join(LOCK_FILE).exists());
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn release_own_only_touches_this_process_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE);

        fs::write(&path, "999999999\n").unwrap();
        assert!(!RunLock::release_own(dir.path()).unwrap());
        assert!(path.exists());
        fs::remove_file(&path).unwrap();

        let lock = RunLock::acquire(dir.path()).unwrap();
        assert!(RunLock::release_own(dir.path()).unwrap());
        assert!(!path.exists());
        assert!(!RunLock::release_own(dir.path()).unwrap());
        drop(lock);
    }

    #[test]
    fn locked_error_names_the_file_to_delete() {
        let dir = tempfile::tempdir().unwrap();
        let _lock = RunLock::acquire(dir.path()).unwrap();

        let message = RunLock::acquire(dir.path()).unwrap_err().to_string();
        assert!(message.contains(&format!("delete {}", dir.path().join(LOCK_FILE).display())));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("soups");
        let _lock = RunLock::acquire(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
