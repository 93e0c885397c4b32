//! Deletion detection through a remote "recently deleted" feed.

use super::ChangeMechanism;
use crate::error::{PollResult, RemoteResult};
use crate::record::RemoteId;
use crate::window::{ChangeWindow, ChangedIds};
use std::sync::Arc;

/// Remote capability listing records deleted within a window.
pub trait DeletedRecordFeed: Send + Sync {
    /// Returns identifiers of `object_type` deleted within `window`.
    fn deleted_ids(&self, object_type: &str, window: &ChangeWindow) -> RemoteResult<Vec<RemoteId>>;
}

/// Combines an update-detecting mechanism with a deletion feed.
///
/// A record both updated and deleted within the same window is reported
/// only as deleted.
pub struct DeletionFeed<M: ChangeMechanism, F: DeletedRecordFeed> {
    updates: M,
    feed: Arc<F>,
}

impl<M: ChangeMechanism, F: DeletedRecordFeed> DeletionFeed<M, F> {
    /// Wraps `updates` and adds deletions from `feed`.
    pub fn new(updates: M, feed: Arc<F>) -> Self {
        Self { updates, feed }
    }
}

impl<M: ChangeMechanism, F: DeletedRecordFeed> ChangeMechanism for DeletionFeed<M, F> {
    fn name(&self) -> &'static str {
        "deletion_feed"
    }

    fn changed_ids(&self, object_type: &str, window: &ChangeWindow) -> PollResult<ChangedIds> {
        let mut changed = self.updates.changed_ids(object_type, window)?;
        changed
            .deleted
            .extend(self.feed.deleted_ids(object_type, window)?);
        changed.updated.retain(|id| !changed.deleted.contains(id));
        Ok(changed)
    }
}
