//! Sync notifications.

use crmsync_protocol::RemoteId;
use serde::Serialize;
use std::fmt;

/// Which way a change flowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Remote to local.
    Inbound,
    /// Local to remote.
    Outbound,
}

/// What was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Record created.
    Create,
    /// Record updated.
    Update,
    /// Record deleted.
    Delete,
}

/// A successfully applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEvent {
    /// Direction of the change.
    pub direction: Direction,
    /// Remote object type.
    pub object_type: String,
    /// Remote identifier of the record.
    pub remote_id: RemoteId,
    /// Applied operation.
    pub operation: OperationKind,
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {:?} {} {}",
            self.direction, self.operation, self.object_type, self.remote_id
        )
    }
}

/// Receives a call after every successful apply.
///
/// Stale and unchanged inbound deliveries, suppressed deletes and failed
/// operations produce no call. The record lock is already released, so an
/// observer may apply further changes to the same record.
pub trait SyncObserver: Send + Sync {
    /// Called after a change has been applied.
    fn on_sync(&self, event: &SyncEvent);
}

impl<F> SyncObserver for F
where
    F: Fn(&SyncEvent) + Send + Sync,
{
    fn on_sync(&self, event: &SyncEvent) {
        self(event);
    }
}
