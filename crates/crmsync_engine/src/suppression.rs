//! Echo suppression for outbound deletes.
//!
//! An outbound delete marks its record before the remote call and clears the
//! mark right after. An inbound delete for a marked record is the echo of
//! that call and must not be applied. Marks expire after a TTL so a crashed
//! or hung caller cannot suppress inbound deletes forever.

use crmsync_protocol::RemoteId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

type RecordKey = (String, RemoteId);

/// Keyed, time-bounded set of suppressed records.
#[derive(Debug)]
pub struct SuppressionSet {
    ttl: Duration,
    entries: Mutex<HashMap<RecordKey, Instant>>,
}

impl SuppressionSet {
    /// Creates an empty set whose entries expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Marks a record until the guard drops or the TTL elapses.
    pub fn suppress(&self, object_type: &str, remote_id: &RemoteId) -> SuppressionGuard<'_> {
        let key = (object_type.to_string(), remote_id.clone());
        let expires_at = Instant::now() + self.ttl;
        self.entries.lock().insert(key.clone(), expires_at);
        SuppressionGuard { set: self, key }
    }

    /// Returns true if the record is marked and the mark has not expired.
    pub fn is_suppressed(&self, object_type: &str, remote_id: &RemoteId) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires_at| *expires_at > now);
        entries.contains_key(&(object_type.to_string(), remote_id.clone()))
    }

    /// Number of live marks.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, expires_at| *expires_at > now);
        entries.len()
    }

    /// Returns true if nothing is suppressed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Clears a suppression mark on drop.
#[derive(Debug)]
pub struct SuppressionGuard<'a> {
    set: &'a SuppressionSet,
    key: RecordKey,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.set.entries.lock().remove(&self.key);
    }
}
