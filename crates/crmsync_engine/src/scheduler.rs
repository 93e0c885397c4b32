//! Window chaining for periodic polling.

use crate::error::SyncResult;
use crate::state::{DeleteOutcome, InboundOutcome, SyncEngine};
use crate::store::LocalStore;
use chrono::{DateTime, Utc};
use crmsync_protocol::{ChangeMechanism, ChangeWindow, Poller, Remote};
use parking_lot::Mutex;
use std::sync::Arc;

/// What a window brought in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    /// The polled window.
    pub window: ChangeWindow,
    /// Records created locally.
    pub created: u64,
    /// Records updated locally.
    pub updated: u64,
    /// Records newer than their checkpoint with no real change.
    pub unchanged: u64,
    /// Records discarded as stale.
    pub stale: u64,
    /// Records deleted locally.
    pub deleted: u64,
    /// Deletes skipped because an outbound delete was in flight, or because
    /// no local record existed.
    pub skipped_deletes: u64,
    /// Reported as updated but gone by the time they were fetched.
    pub vanished: u64,
}

impl WindowReport {
    fn new(window: ChangeWindow) -> Self {
        Self {
            window,
            created: 0,
            updated: 0,
            unchanged: 0,
            stale: 0,
            deleted: 0,
            skipped_deletes: 0,
            vanished: 0,
        }
    }
}

/// Polls one object type window after window.
///
/// Each window starts where the previous successful one ended, so windows
/// share their boundary instant and nothing is skipped. The cursor moves
/// only once every change in a window has been applied; a failed window is
/// retried as a whole, which is safe because inbound apply is idempotent.
pub struct PollScheduler<M: ChangeMechanism, R: Remote, S: LocalStore> {
    engine: Arc<SyncEngine<R, S>>,
    poller: Poller<M>,
    object_type: String,
    cursor: Mutex<DateTime<Utc>>,
}

impl<M: ChangeMechanism, R: Remote, S: LocalStore> PollScheduler<M, R, S> {
    /// Creates a scheduler whose first window starts at `cursor`.
    pub fn new(
        engine: Arc<SyncEngine<R, S>>,
        poller: Poller<M>,
        object_type: impl Into<String>,
        cursor: DateTime<Utc>,
    ) -> SyncResult<Self> {
        let object_type = object_type.into();
        engine.record_type(&object_type)?;
        Ok(Self {
            engine,
            poller,
            object_type,
            cursor: Mutex::new(cursor),
        })
    }

    /// Start of the next window.
    pub fn cursor(&self) -> DateTime<Utc> {
        *self.cursor.lock()
    }

    /// Polls `[cursor, end]` once and applies every change in it.
    pub fn poll_once(&self, end: DateTime<Utc>) -> SyncResult<WindowReport> {
        let mut cursor = self.cursor.lock();
        let window = ChangeWindow::new(*cursor, end)?;
        let report = self.run_window(window)?;

        *cursor = end;
        tracing::info!(
            object_type = %self.object_type,
            start = %window.start(),
            end = %window.end(),
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            "advanced poll cursor"
        );
        Ok(report)
    }

    /// Like [`PollScheduler::poll_once`], retrying retryable failures with
    /// the engine's retry policy.
    pub fn poll(&self, end: DateTime<Utc>) -> SyncResult<WindowReport> {
        let retry = &self.engine.config().retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.poll_once(end) {
                Ok(report) => return Ok(report),
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        object_type = %self.object_type,
                        attempt,
                        ?delay,
                        error = %err,
                        "poll failed, retrying window"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn run_window(&self, window: ChangeWindow) -> SyncResult<WindowReport> {
        let object_type = self.object_type.as_str();
        let changed = self.poller.poll(object_type, &window)?;
        let mut report = WindowReport::new(window);

        for remote_id in &changed.updated {
            let Some(record) = self.engine.remote().fetch(object_type, remote_id)? else {
                tracing::debug!(object_type, %remote_id, "changed record vanished before fetch");
                report.vanished += 1;
                continue;
            };
            match self.engine.apply_inbound_record(object_type, &record, true)? {
                InboundOutcome::Created(_) => report.created += 1,
                InboundOutcome::Updated(_) => report.updated += 1,
                InboundOutcome::Unchanged(_) => report.unchanged += 1,
                InboundOutcome::Stale(_) => report.stale += 1,
            }
        }

        for remote_id in &changed.deleted {
            match self.engine.apply_inbound_delete(object_type, remote_id)? {
                DeleteOutcome::Deleted(_) => report.deleted += 1,
                DeleteOutcome::NotFound | DeleteOutcome::Suppressed => report.skipped_deletes += 1,
            }
        }

        Ok(report)
    }
}
