//! Change windows and detected changes.

use crate::error::{PollError, PollResult};
use crate::record::RemoteId;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// A time interval used to ask the remote system for changes.
///
/// Both ends are inclusive. Consecutive windows share their boundary
/// instant, so a record modified exactly at a boundary is reported twice.
/// That overlap is safe because inbound apply is idempotent; a gap between
/// windows would not be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ChangeWindow {
    /// Creates a window, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> PollResult<Self> {
        if start > end {
            return Err(PollError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Window start (inclusive).
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Window end (inclusive).
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Returns true if `instant` falls inside the window.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Returns the window that follows this one, ending at `end`.
    pub fn next(&self, end: DateTime<Utc>) -> PollResult<Self> {
        Self::new(self.end, end)
    }
}

/// Identifiers reported as changed within a window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedIds {
    /// Records created or updated.
    pub updated: BTreeSet<RemoteId>,
    /// Records deleted.
    pub deleted: BTreeSet<RemoteId>,
}

impl ChangedIds {
    /// Creates an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of reported identifiers.
    pub fn len(&self) -> usize {
        self.updated.len() + self.deleted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn inverted_window_is_rejected() {
        let err = ChangeWindow::new(at(10), at(5)).unwrap_err();
        assert!(matches!(err, PollError::InvalidWindow { .. }));
    }

    #[test]
    fn empty_window_is_allowed() {
        let window = ChangeWindow::new(at(5), at(5)).unwrap();
        assert!(window.contains(at(5)));
    }

    #[test]
    fn bounds_are_inclusive() {
        let window = ChangeWindow::new(at(0), at(10)).unwrap();
        assert!(window.contains(at(0)));
        assert!(window.contains(at(10)));
        assert!(!window.contains(at(11)));
        assert!(!window.contains(at(-1)));
    }

    #[test]
    fn chained_windows_share_boundary() {
        let first = ChangeWindow::new(at(0), at(10)).unwrap();
        let second = first.next(at(20)).unwrap();
        assert_eq!(second.start(), first.end());
        assert!(first.contains(at(10)) && second.contains(at(10)));
    }

    #[test]
    fn changed_ids_counts() {
        let mut ids = ChangedIds::new();
        assert!(ids.is_empty());
        ids.updated.insert(RemoteId::new("A"));
        ids.deleted.insert(RemoteId::new("B"));
        assert_eq!(ids.len(), 2);
    }
}
