//! Pool of reusable temporary file paths.
//!
//! Paths are handed out as [`TempFile`] guards which give the path back to the
//! pool when dropped. Releasing a path twice is logged and otherwise ignored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use uuid::Uuid;

#[derive(Debug)]
pub struct TempPool {
    dir: PathBuf,
    used: DashSet<PathBuf>,
    free: DashSet<PathBuf>,
}

impl TempPool {
    pub fn new<T: AsRef<Path>>(dir: T) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.as_ref().into(),
            used: DashSet::new(),
            free: DashSet::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hands out a path that nobody else holds. The file itself is neither
    /// created nor truncated.
    pub fn acquire(self: &Arc<Self>) -> TempFile {
        let reused = self.free.iter().next().map(|entry| entry.key().clone());
        let path = match reused.and_then(|path| self.free.remove(&path)) {
            Some(path) => {
                tracing::trace!("Reusing temp path {}", path.display());
                path
            }
            None => {
                let path = self.dir.join(Uuid::new_v4().to_string());
                tracing::trace!("Creating temp path {}", path.display());
                path
            }
        };
        self.used.insert(path.clone());
        TempFile {
            path,
            pool: self.clone(),
            detached: false,
        }
    }

    pub fn release(&self, path: &Path) {
        if self.free.contains(path) {
            tracing::warn!("Duplicate release of temp path {}", path.display());
        } else if self.used.remove(path).is_some() {
            self.free.insert(path.to_path_buf());
            tracing::trace!("Released temp path {}", path.display());
        } else {
            tracing::debug!("Path {} is not owned by the pool", path.display());
        }
    }

    /// Removes a path from the pool for good.
    pub fn detach(&self, path: &Path) {
        self.used.remove(path);
    }

    pub fn in_use(&self) -> usize {
        self.used.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

/// Scoped ownership of a pooled path.
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    pool: Arc<TempPool>,
    detached: bool,
}

impl TempFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file beyond the guard's lifetime; the pool forgets the path.
    pub fn keep(mut self) -> PathBuf {
        self.pool.detach(&self.path);
        self.detached = true;
        self.path.clone()
    }
}

impl AsRef<Path> for TempFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.detached {
            self.pool.release(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_gives_distinct_paths() {
        let pool = TempPool::new("/tmp/cph-judge-test");
        let first = pool.acquire();
        let second = pool.acquire();
        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with("/tmp/cph-judge-test"));
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn test_drop_returns_path_for_reuse() {
        let pool = TempPool::new("/tmp/cph-judge-test");
        let path = {
            let file = pool.acquire();
            file.path().to_path_buf()
        };
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 1);

        let again = pool.acquire();
        assert_eq!(again.path(), path);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_double_release_is_noop() {
        let pool = TempPool::new("/tmp/cph-judge-test");
        let file = pool.acquire();
        let path = file.path().to_path_buf();
        drop(file);
        pool.release(&path);
        pool.release(&path);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_release_of_foreign_path_is_noop() {
        let pool = TempPool::new("/tmp/cph-judge-test");
        pool.release(Path::new("/etc/hosts"));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_keep_detaches_path() {
        let pool = TempPool::new("/tmp/cph-judge-test");
        let file = pool.acquire();
        let kept = file.keep();
        assert_eq!(pool.in_use(), 0);
        assert_eq!(pool.available(), 0);

        let next = pool.acquire();
        assert_ne!(next.path(), kept);
    }
}
