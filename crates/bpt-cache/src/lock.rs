//! Shared/exclusive advisory locking on a sentinel file in the cache root.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::FileExt;

use crate::CacheError;

const SENTINEL: &str = ".bpt-cache-lock";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WARN_AFTER: Duration = Duration::from_secs(2);

/// A held lock on the cache root's sentinel file. Readers take [`CacheLock::shared`],
/// mutators take [`CacheLock::exclusive`]. Dropping the guard releases the lock.
pub struct CacheLock {
    file: File,
}

impl CacheLock {
    fn sentinel_path(root: &Path) -> PathBuf {
        root.join(SENTINEL)
    }

    fn open_sentinel(root: &Path) -> Result<File, CacheError> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .open(Self::sentinel_path(root))
            .map_err(|e| CacheError::Io { path: Self::sentinel_path(root), source: e })
    }

    pub fn shared(root: &Path) -> Result<CacheLock, CacheError> {
        let file = Self::open_sentinel(root)?;
        poll_until_locked(&file, root, true)?;
        Ok(CacheLock { file })
    }

    pub fn exclusive(root: &Path) -> Result<CacheLock, CacheError> {
        let file = Self::open_sentinel(root)?;
        poll_until_locked(&file, root, false)?;
        Ok(CacheLock { file })
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn poll_until_locked(file: &File, root: &Path, shared: bool) -> Result<(), CacheError> {
    let started = Instant::now();
    let mut warned = false;
    loop {
        let acquired = if shared { file.try_lock_shared() } else { file.try_lock_exclusive() };
        match acquired {
            Ok(()) => return Ok(()),
            Err(_) => {
                if !warned && started.elapsed() > WARN_AFTER {
                    tracing::warn!(
                        "waiting on cache lock at {}",
                        root.join(SENTINEL).display()
                    );
                    warned = true;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_lock_can_be_acquired_repeatedly() {
        let dir = tempfile::tempdir().unwrap();
        let a = CacheLock::shared(dir.path()).unwrap();
        let b = CacheLock::shared(dir.path()).unwrap();
        drop(a);
        drop(b);
    }

    #[test]
    fn exclusive_then_shared_succeeds_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _lock = CacheLock::exclusive(dir.path()).unwrap();
        }
        let _lock = CacheLock::shared(dir.path()).unwrap();
    }
}
