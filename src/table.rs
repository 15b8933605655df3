//! The descriptor table.
//!
//! Maps guest file descriptors to [`Entry`] records. Lookups clone an `Arc`
//! under the read lock; insert, remove and renumber serialize on the write
//! lock, so every mutation is linearizable against concurrent lookups.
//! Stream-level operations never hold the table lock -- they run against the
//! cloned entry.

use crate::entry::Entry;
use crate::fdpool::FdPool;
use crate::wasi::{Errno, Fd, Filetype};
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub(crate) struct Table {
    inner: RwLock<Inner>,
}

struct Inner {
    map: HashMap<Fd, Arc<Entry>>,
    pool: FdPool,
}

impl Table {
    pub fn new(max: u32) -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: HashMap::new(),
                // fds 0, 1 and 2 are reserved for stdio; insert_at claims
                // them, push starts looking at 3.
                pool: FdPool::new(3, max),
            }),
        }
    }

    /// Insert an entry at the smallest free descriptor, `Nfile` when the
    /// configured maximum is reached.
    pub fn push(&self, entry: Entry) -> Result<Fd> {
        let mut inner = self.inner.write().unwrap();
        let fd = inner.pool.allocate().ok_or(Errno::Nfile)?;
        inner.map.insert(fd, Arc::new(entry));
        Ok(fd)
    }

    /// Insert at a specific descriptor, used for stdio pre-binding.
    pub fn insert_at(&self, fd: Fd, entry: Entry) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.pool.claim(fd) {
            return Err(Errno::Nfile.into());
        }
        inner.map.insert(fd, Arc::new(entry));
        Ok(())
    }

    pub fn get(&self, fd: Fd) -> Result<Arc<Entry>> {
        self.inner
            .read()
            .unwrap()
            .map
            .get(&fd)
            .cloned()
            .ok_or_else(|| Errno::Badf.into())
    }

    pub fn contains_key(&self, fd: Fd) -> bool {
        self.inner.read().unwrap().map.contains_key(&fd)
    }

    /// Linear scan for the first entry bound to `guest_path`.
    pub fn get_by_path(&self, guest_path: &str) -> Option<(Fd, Arc<Entry>)> {
        let inner = self.inner.read().unwrap();
        let mut fds: Vec<Fd> = inner.map.keys().copied().collect();
        fds.sort_unstable();
        for fd in fds {
            let entry = &inner.map[&fd];
            if entry.guest_path == guest_path {
                return Some((fd, Arc::clone(entry)));
            }
        }
        None
    }

    /// Remove a descriptor. Dropping the returned `Arc` closes the backing
    /// stream for regular files (the `File` is owned by the handle);
    /// directory and device descriptors give up only their table slot.
    pub fn delete(&self, fd: Fd) -> Result<Arc<Entry>> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.map.remove(&fd).ok_or(Errno::Badf)?;
        inner.pool.deallocate(fd);
        Ok(entry)
    }

    /// Move the descriptor `from` to `to`, closing whatever occupied `to`.
    /// The whole transition happens under one write-lock critical section:
    /// either it completes, or the table is unchanged.
    pub fn renumber(&self, from: Fd, to: Fd) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if !inner.map.contains_key(&from) {
            return Err(Errno::Badf.into());
        }
        if from == to {
            return Ok(());
        }
        if inner.map.remove(&to).is_some() {
            inner.pool.deallocate(to);
        }
        let entry = inner.map.remove(&from).expect("checked above");
        inner.pool.deallocate(from);
        if !inner.pool.claim(to) {
            // Cannot happen: `to` was just vacated and `from` freed a slot.
            inner.pool.claim(from);
            inner.map.insert(from, entry);
            return Err(Errno::Nfile.into());
        }
        inner.map.insert(to, entry);
        Ok(())
    }

    /// Snapshot of the live descriptors, in ascending id order.
    pub fn entries(&self) -> Vec<(Fd, Arc<Entry>)> {
        let inner = self.inner.read().unwrap();
        let mut all: Vec<(Fd, Arc<Entry>)> = inner
            .map
            .iter()
            .map(|(fd, entry)| (*fd, Arc::clone(entry)))
            .collect();
        all.sort_unstable_by_key(|(fd, _)| *fd);
        all
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().map.len()
    }

    /// Drop every regular-file descriptor, releasing the table slots of the
    /// rest as well. Called on teardown.
    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        let fds: Vec<Fd> = inner.map.keys().copied().collect();
        for fd in fds {
            let is_file = inner.map[&fd].file_type == Filetype::RegularFile;
            if is_file {
                inner.map.remove(&fd);
            }
            inner.pool.deallocate(fd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AccessMode, EntryRights};
    use crate::handle::Handle;
    use crate::wasi::Rights;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn entry(path: &str) -> Entry {
        Entry::new(
            Filetype::CharacterDevice,
            path.to_owned(),
            Handle::DevNull,
            AccessMode::READ | AccessMode::WRITE,
            EntryRights::from_base(Rights::FD_READ),
            false,
        )
    }

    #[test]
    fn push_allocates_smallest_free_from_three() {
        let table = Table::new(16);
        assert_eq!(table.push(entry("/a")).unwrap(), 3);
        assert_eq!(table.push(entry("/b")).unwrap(), 4);
        table.delete(3).unwrap();
        assert_eq!(table.push(entry("/c")).unwrap(), 3);
        assert_eq!(table.push(entry("/d")).unwrap(), 5);
    }

    #[test]
    fn closed_stdio_slots_are_not_reallocated() {
        let table = Table::new(16);
        table.insert_at(0, entry("/dev/stdin")).unwrap();
        table.delete(0).unwrap();
        assert_eq!(table.push(entry("/a")).unwrap(), 3);
    }

    #[test]
    fn lookup_failures_are_badf() {
        let table = Table::new(16);
        assert_eq!(
            table.get(3).unwrap_err().as_wasi_errno(),
            Errno::Badf
        );
        assert_eq!(
            table.delete(3).unwrap_err().as_wasi_errno(),
            Errno::Badf
        );
        assert_eq!(
            table.renumber(3, 4).unwrap_err().as_wasi_errno(),
            Errno::Badf
        );
    }

    #[test]
    fn capacity_is_enforced() {
        let table = Table::new(2);
        table.push(entry("/a")).unwrap();
        table.push(entry("/b")).unwrap();
        assert_eq!(
            table.push(entry("/c")).unwrap_err().as_wasi_errno(),
            Errno::Nfile
        );
        table.delete(3).unwrap();
        assert!(table.push(entry("/c")).is_ok());
    }

    #[test]
    fn renumber_replaces_target() {
        let table = Table::new(16);
        let a = table.push(entry("/a")).unwrap();
        let b = table.push(entry("/b")).unwrap();
        table.renumber(a, b).unwrap();
        assert!(!table.contains_key(a));
        assert_eq!(table.get(b).unwrap().guest_path, "/a");
        // After closing `b`, neither id is live.
        table.delete(b).unwrap();
        assert!(!table.contains_key(a));
        assert!(!table.contains_key(b));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn get_by_path_finds_first_match() {
        let table = Table::new(16);
        table.push(entry("/x")).unwrap();
        let fd = table.push(entry("/y")).unwrap();
        assert_eq!(table.get_by_path("/y").unwrap().0, fd);
        assert!(table.get_by_path("/z").is_none());
    }

    #[test]
    fn concurrent_churn_stays_consistent() {
        let table = Arc::new(Table::new(1024));
        let inserted = Arc::new(AtomicUsize::new(0));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let table = Arc::clone(&table);
            let inserted = Arc::clone(&inserted);
            workers.push(thread::spawn(move || {
                for i in 0..100 {
                    let fd = table.push(entry("/worker")).unwrap();
                    inserted.fetch_add(1, Ordering::Relaxed);
                    assert!(table.get(fd).is_ok());
                    if i % 2 == 0 {
                        table.delete(fd).unwrap();
                        inserted.fetch_sub(1, Ordering::Relaxed);
                    }
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(table.len(), inserted.load(Ordering::Relaxed));
    }
}
