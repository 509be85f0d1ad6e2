//! Per-path reader/writer locks
//!
//! Each virtual path that is currently in use has one `RwLock` in a shared
//! table. Operations on different paths never contend on anything but the
//! short table lookup. An entry is dropped from the table as soon as the
//! last guard for its path is released, so the table only ever holds paths
//! with an operation in flight.
//!
//! Locks are always taken ancestor first (a parent before its child), which
//! keeps the multi-lock operations of the engine free of lock-order cycles.

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawRwLock, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use verfs_common::VirtualPath;

type PathLock = Arc<RwLock<()>>;

/// Table of locks keyed by virtual path
#[derive(Debug, Default)]
pub struct PathLockTable {
    locks: Mutex<HashMap<VirtualPath, PathLock>>,
}

impl PathLockTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a shared lock on `path`, blocking while a writer holds it
    pub fn read(&self, path: &VirtualPath) -> PathGuard<'_> {
        let lock = self.acquire_entry(path);
        let held = Held::Read(lock.read_arc());
        PathGuard::new(self, path, held)
    }

    /// Take an exclusive lock on `path`, blocking while anyone holds it
    pub fn write(&self, path: &VirtualPath) -> PathGuard<'_> {
        let lock = self.acquire_entry(path);
        let held = Held::Write(lock.write_arc());
        PathGuard::new(self, path, held)
    }

    /// Number of paths with a lock currently in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// True if no path is locked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }

    fn acquire_entry(&self, path: &VirtualPath) -> PathLock {
        let mut locks = self.locks.lock();
        locks
            .entry(path.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn release_entry(&self, path: &VirtualPath) {
        let mut locks = self.locks.lock();
        // Only the table's own reference left: nobody holds or waits
        if locks
            .get(path)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(path);
        }
    }
}

enum Held {
    Read(ArcRwLockReadGuard<RawRwLock, ()>),
    Write(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// A held path lock, released on drop
#[must_use = "the path is unlocked as soon as the guard is dropped"]
pub struct PathGuard<'a> {
    table: &'a PathLockTable,
    path: VirtualPath,
    held: Option<Held>,
}

impl<'a> PathGuard<'a> {
    fn new(table: &'a PathLockTable, path: &VirtualPath, held: Held) -> Self {
        Self {
            table,
            path: path.clone(),
            held: Some(held),
        }
    }

    /// Path this guard locks
    #[must_use]
    pub const fn path(&self) -> &VirtualPath {
        &self.path
    }

    /// True for an exclusive guard
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Write(_)))
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        // Unlock first so the guard's reference no longer counts
        drop(self.held.take());
        self.table.release_entry(&self.path);
    }
}

impl std::fmt::Debug for PathGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathGuard")
            .field("path", &self.path)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn path(s: &str) -> VirtualPath {
        VirtualPath::new(s).unwrap()
    }

    #[test]
    fn test_entries_are_collected() {
        let table = PathLockTable::new();
        {
            let _a = table.read(&path("/a"));
            let _b = table.read(&path("/a"));
            let _c = table.write(&path("/c"));
            assert_eq!(table.len(), 2);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn test_shared_readers() {
        let table = PathLockTable::new();
        let p = path("/f");
        let first = table.read(&p);
        let second = table.read(&p);
        assert!(!first.is_exclusive());
        assert_eq!(second.path(), &p);
    }

    #[test]
    fn test_writer_excludes_others() {
        let table = Arc::new(PathLockTable::new());
        let p = path("/f");
        let guard = table.write(&p);
        assert!(guard.is_exclusive());

        let (tx, rx) = mpsc::channel();
        let handle = {
            let table = table.clone();
            let p = p.clone();
            thread::spawn(move || {
                let _guard = table.read(&p);
                tx.send(()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        handle.join().unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_different_paths_do_not_contend() {
        let table = Arc::new(PathLockTable::new());
        let _held = table.write(&path("/busy"));

        let handle = {
            let table = table.clone();
            thread::spawn(move || {
                let _guard = table.write(&path("/free"));
            })
        };
        handle.join().unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_writers_serialize() {
        let table = Arc::new(PathLockTable::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _guard = table.write(&path("/hot"));
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(table.is_empty());
    }
}
