//! Reader pool.
//!
//! Tracks every live reader by path in one of two states: *available* (the
//! dispatcher may drain it) or *locked* (its records are in an in-flight
//! batch, and its handle is travelling with that batch). A path is in at
//! most one state at a time, so at most one batch ever references a given
//! reader.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::source::ReaderHandle;

#[derive(Debug, Default)]
struct PoolInner {
    available: HashMap<PathBuf, ReaderHandle>,
    locked: HashSet<PathBuf>,
}

/// Concurrency-safe set of reader handles keyed by path.
#[derive(Debug, Default)]
pub struct ReaderPool {
    inner: Mutex<PoolInner>,
}

impl ReaderPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reader as available.
    pub fn add(&self, handle: ReaderHandle) {
        let mut inner = self.inner.lock().unwrap();
        let path = handle.path().to_path_buf();
        inner.locked.remove(&path);
        inner.available.insert(path, handle);
    }

    /// Whether a reader for `path` exists in either state.
    pub fn contains(&self, path: &Path) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.available.contains_key(path) || inner.locked.contains(path)
    }

    /// Pop an arbitrary available reader and mark it locked. Non-blocking;
    /// `None` when nothing is available.
    pub fn lock_next(&self) -> Option<ReaderHandle> {
        let mut inner = self.inner.lock().unwrap();
        let path = inner.available.keys().next()?.clone();
        let handle = inner.available.remove(&path)?;
        inner.locked.insert(path);
        Some(handle)
    }

    /// Return a locked reader to the available state.
    pub fn unlock(&self, handle: ReaderHandle) {
        self.add(handle);
    }

    /// Return a batch's contributing readers to the available state.
    pub fn unlock_all(&self, handles: Vec<ReaderHandle>) {
        let mut inner = self.inner.lock().unwrap();
        for handle in handles {
            let path = handle.path().to_path_buf();
            inner.locked.remove(&path);
            inner.available.insert(path, handle);
        }
    }

    /// Drop a reader entirely; its path becomes eligible for rediscovery
    /// by the glob scanner.
    pub fn remove(&self, handle: ReaderHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.available.remove(handle.path());
        inner.locked.remove(handle.path());
    }

    /// Number of (available, locked) readers.
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.lock().unwrap();
        (inner.available.len(), inner.locked.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FileReader, ReaderOptions};
    use crate::stats::Statistics;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;
    use tokio_util::task::TaskTracker;

    fn test_handle(dir: &tempfile::TempDir, name: &str, tracker: &TaskTracker) -> ReaderHandle {
        let path = dir.path().join(name);
        std::fs::write(&path, b"").unwrap();
        let file = std::fs::File::open(&path).unwrap();
        FileReader::spawn(
            file,
            path,
            0,
            Default::default(),
            "test-host".to_string(),
            ReaderOptions::default(),
            Arc::new(Statistics::new()),
            CancellationToken::new(),
            tracker,
        )
    }

    #[tokio::test]
    async fn lock_cycle_moves_between_states() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TaskTracker::new();
        let pool = ReaderPool::new();

        let handle = test_handle(&dir, "a.log", &tracker);
        let path = handle.path().to_path_buf();
        pool.add(handle);

        assert!(pool.contains(&path));
        assert_eq!(pool.counts(), (1, 0));

        let locked = pool.lock_next().expect("reader should be available");
        assert_eq!(locked.path(), path);
        assert_eq!(pool.counts(), (0, 1));
        assert!(pool.contains(&path));

        // Nothing else to lock while it is out.
        assert!(pool.lock_next().is_none());

        pool.unlock(locked);
        assert_eq!(pool.counts(), (1, 0));
    }

    #[tokio::test]
    async fn remove_clears_both_states() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TaskTracker::new();
        let pool = ReaderPool::new();

        pool.add(test_handle(&dir, "a.log", &tracker));
        pool.add(test_handle(&dir, "b.log", &tracker));
        assert_eq!(pool.counts(), (2, 0));

        let locked = pool.lock_next().unwrap();
        let path = locked.path().to_path_buf();
        pool.remove(locked);

        assert!(!pool.contains(&path));
        assert_eq!(pool.counts(), (1, 0));
    }

    #[tokio::test]
    async fn unlock_all_returns_contributors() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TaskTracker::new();
        let pool = ReaderPool::new();

        pool.add(test_handle(&dir, "a.log", &tracker));
        pool.add(test_handle(&dir, "b.log", &tracker));

        let first = pool.lock_next().unwrap();
        let second = pool.lock_next().unwrap();
        assert_eq!(pool.counts(), (0, 2));

        pool.unlock_all(vec![first, second]);
        assert_eq!(pool.counts(), (2, 0));
    }
}
