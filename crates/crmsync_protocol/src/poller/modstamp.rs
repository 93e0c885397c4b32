//! Modification-timestamp change detection.

use super::ChangeMechanism;
use crate::error::PollResult;
use crate::remote::{Predicate, RemoteQuery};
use crate::window::{ChangeWindow, ChangedIds};
use std::sync::Arc;

/// Detects updates by querying for records whose modification timestamp
/// falls within the window.
///
/// Deleted records vanish from query results, so this mechanism never
/// reports deletions. Pair it with [`super::DeletionFeed`] when deletes must
/// be observed by polling.
pub struct SystemModstamp<Q: RemoteQuery> {
    query: Arc<Q>,
}

impl<Q: RemoteQuery> SystemModstamp<Q> {
    /// Creates the mechanism over a query capability.
    pub fn new(query: Arc<Q>) -> Self {
        Self { query }
    }
}

impl<Q: RemoteQuery> ChangeMechanism for SystemModstamp<Q> {
    fn name(&self) -> &'static str {
        "system_modstamp"
    }

    fn changed_ids(&self, object_type: &str, window: &ChangeWindow) -> PollResult<ChangedIds> {
        let records = self
            .query
            .query(object_type, &Predicate::ModifiedWithin(*window))?;

        Ok(ChangedIds {
            updated: records.into_iter().map(|record| record.id).collect(),
            deleted: Default::default(),
        })
    }
}
