//! Change detection.
//!
//! A [`ChangeMechanism`] answers one question: which records of an object
//! type changed within a window. The [`Poller`] validates the window and
//! delegates to its mechanism. Neither retries: a failed window is reported
//! to the caller, who must re-attempt the same window before moving on.

mod deletion_feed;
mod modstamp;

pub use deletion_feed::{DeletedRecordFeed, DeletionFeed};
pub use modstamp::SystemModstamp;

use crate::error::PollResult;
use crate::window::{ChangeWindow, ChangedIds};
use chrono::{DateTime, Utc};

/// A pluggable change-detection strategy.
pub trait ChangeMechanism: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "custom"
    }

    /// Returns the identifiers that changed within `window`.
    fn changed_ids(&self, object_type: &str, window: &ChangeWindow) -> PollResult<ChangedIds>;
}

/// Runs a change mechanism over time windows.
pub struct Poller<M: ChangeMechanism> {
    mechanism: M,
}

impl<M: ChangeMechanism> Poller<M> {
    /// Creates a poller around a mechanism.
    pub fn new(mechanism: M) -> Self {
        Self { mechanism }
    }

    /// Returns the underlying mechanism.
    pub fn mechanism(&self) -> &M {
        &self.mechanism
    }

    /// Returns the records of `object_type` that changed in `[start, end]`.
    pub fn changed_ids(
        &self,
        object_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> PollResult<ChangedIds> {
        let window = ChangeWindow::new(start, end)?;
        self.poll(object_type, &window)
    }

    /// Same as [`Poller::changed_ids`] for an already validated window.
    pub fn poll(&self, object_type: &str, window: &ChangeWindow) -> PollResult<ChangedIds> {
        let changed = self.mechanism.changed_ids(object_type, window)?;
        tracing::debug!(
            mechanism = self.mechanism.name(),
            object_type,
            start = %window.start(),
            end = %window.end(),
            updated = changed.updated.len(),
            deleted = changed.deleted.len(),
            "polled change window"
        );
        Ok(changed)
    }
}
