//! Per-record serialization.

use crmsync_protocol::RemoteId;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;

type RecordKey = (String, RemoteId);

/// Keyed lock table: at most one holder per (object type, remote id).
///
/// Different keys never block each other. Entries exist only while held.
#[derive(Debug, Default)]
pub struct RecordLocks {
    held: Mutex<HashSet<RecordKey>>,
    released: Condvar,
}

impl RecordLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the record is free, then holds it until the guard drops.
    pub fn lock(&self, object_type: &str, remote_id: &RemoteId) -> RecordGuard<'_> {
        let key = (object_type.to_string(), remote_id.clone());
        let mut held = self.held.lock();
        while held.contains(&key) {
            self.released.wait(&mut held);
        }
        held.insert(key.clone());
        RecordGuard { locks: self, key }
    }

    /// Returns true if the record is currently held.
    pub fn is_locked(&self, object_type: &str, remote_id: &RemoteId) -> bool {
        self.held
            .lock()
            .contains(&(object_type.to_string(), remote_id.clone()))
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.held.lock().len()
    }

    /// Returns true if no record is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds a record lock.
#[derive(Debug)]
pub struct RecordGuard<'a> {
    locks: &'a RecordLocks,
    key: RecordKey,
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn guard_releases_on_drop() {
        let locks = RecordLocks::new();
        let id = RemoteId::new("A001");
        {
            let _guard = locks.lock("Lead", &id);
            assert!(locks.is_locked("Lead", &id));
            assert!(!locks.is_locked("Contact", &id));
        }
        assert!(locks.is_empty());
    }

    #[test]
    fn different_records_do_not_block() {
        let locks = RecordLocks::new();
        let _a = locks.lock("Lead", &RemoteId::new("A001"));
        let _b = locks.lock("Lead", &RemoteId::new("A002"));
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn same_record_is_serialized() {
        let locks = Arc::new(RecordLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _guard = locks.lock("Lead", &RemoteId::new("A001"));
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }
}
