//! Bidirectional sync state machine.
//!
//! A record moves between four informal states: absent, present and in
//! sync, dirty on the local side, dirty on the remote side. The remote
//! modification time stored as the record's checkpoint is the only conflict
//! signal: an inbound change is applied only if it is strictly newer, and
//! every outbound write stores the time the remote system assigned to it so
//! that its echo arrives as stale.

use crate::config::{RecordTypeConfig, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::locks::{RecordGuard, RecordLocks};
use crate::observer::{Direction, OperationKind, SyncEvent, SyncObserver};
use crate::store::{LocalId, LocalRecord, LocalStore, NewRecord};
use crate::suppression::SuppressionSet;
use chrono::{DateTime, Utc};
use crmsync_compare::{is_real_change, AttributeMap, FieldValue};
use crmsync_protocol::{
    CallContext, Notification, Remote, RemoteError, RemoteId, RemoteRecord,
};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Returns true if an inbound change with `modified_at` should be applied
/// over a local record whose checkpoint is `checkpoint`.
///
/// Equal timestamps are stale: that is the echo of our own write.
pub fn should_apply_inbound(
    checkpoint: Option<DateTime<Utc>>,
    modified_at: DateTime<Utc>,
) -> bool {
    checkpoint.map_or(true, |checkpoint| modified_at > checkpoint)
}

/// Result of an inbound apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// No local record existed; one was created.
    Created(LocalId),
    /// At least one synced attribute changed.
    Updated(LocalId),
    /// Newer than the checkpoint but no attribute really changed. The
    /// checkpoint was still advanced.
    Unchanged(LocalId),
    /// Not newer than the checkpoint; discarded.
    Stale(LocalId),
}

impl InboundOutcome {
    /// Local record the delivery was matched to.
    pub fn local_id(&self) -> LocalId {
        match self {
            InboundOutcome::Created(id)
            | InboundOutcome::Updated(id)
            | InboundOutcome::Unchanged(id)
            | InboundOutcome::Stale(id) => *id,
        }
    }

    /// Returns true if local state changed.
    pub fn is_applied(&self) -> bool {
        matches!(self, InboundOutcome::Created(_) | InboundOutcome::Updated(_))
    }
}

/// Result of an inbound delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The local record was removed.
    Deleted(LocalId),
    /// No local record carries the identifier.
    NotFound,
    /// An outbound delete of the same record is in flight.
    Suppressed,
}

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Inbound deliveries that created a local record.
    pub inbound_created: u64,
    /// Inbound deliveries that changed a local record.
    pub inbound_updated: u64,
    /// Inbound deliveries with no real change.
    pub inbound_unchanged: u64,
    /// Inbound deliveries discarded as stale.
    pub inbound_stale: u64,
    /// Inbound deletes applied.
    pub inbound_deleted: u64,
    /// Inbound deletes skipped because of suppression.
    pub suppressed_deletes: u64,
    /// Outbound creates.
    pub outbound_created: u64,
    /// Outbound updates.
    pub outbound_updated: u64,
    /// Outbound deletes.
    pub outbound_deleted: u64,
    /// Outbound calls whose outcome is unknown.
    pub unknown_outcomes: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

/// The sync engine applies changes in both directions for the configured
/// record types.
pub struct SyncEngine<R: Remote, S: LocalStore> {
    config: SyncConfig,
    remote: Arc<R>,
    store: Arc<S>,
    locks: RecordLocks,
    suppression: SuppressionSet,
    observer: RwLock<Option<Arc<dyn SyncObserver>>>,
    stats: RwLock<SyncStats>,
}

impl<R: Remote, S: LocalStore> SyncEngine<R, S> {
    /// Creates a new sync engine. Fails if the configuration is invalid.
    pub fn new(config: SyncConfig, remote: Arc<R>, store: Arc<S>) -> SyncResult<Self> {
        config.validate()?;
        let suppression = SuppressionSet::new(config.suppression_ttl);
        Ok(Self {
            config,
            remote,
            store,
            locks: RecordLocks::new(),
            suppression,
            observer: RwLock::new(None),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Sets the observer notified after each applied change.
    pub fn set_observer(&self, observer: Arc<dyn SyncObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the remote capability.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Gets the local store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns true if inbound deletes of the record are currently
    /// suppressed.
    pub fn is_suppressed(&self, object_type: &str, remote_id: &RemoteId) -> bool {
        self.suppression.is_suppressed(object_type, remote_id)
    }

    /// Looks up a configured record type.
    pub fn record_type(&self, object_type: &str) -> SyncResult<&RecordTypeConfig> {
        self.config
            .record_type(object_type)
            .ok_or_else(|| SyncError::UnknownObjectType(object_type.to_string()))
    }

    /// Applies a remote change to the local store.
    ///
    /// `attributes` carries remote attribute names. Synced attributes that
    /// are absent are set to null when `emit_blanks` is true and left
    /// untouched otherwise. Never triggers an outbound write.
    pub fn apply_inbound(
        &self,
        object_type: &str,
        remote_id: &RemoteId,
        attributes: &AttributeMap,
        modified_at: DateTime<Utc>,
        emit_blanks: bool,
    ) -> SyncResult<InboundOutcome> {
        let record_type = self.record_type(object_type)?;
        let guard = self.locks.lock(object_type, remote_id);

        let Some(mut local) = self.store.find_by_remote_id(object_type, remote_id)? else {
            let record = NewRecord {
                remote_id: Some(remote_id.clone()),
                checkpoint: Some(modified_at),
                attributes: inbound_changes(record_type, None, attributes, emit_blanks)
                    .into_iter()
                    .collect(),
            };
            let created = self.store.insert(object_type, record)?;
            tracing::info!(object_type, %remote_id, local_id = %created.id, "inbound create");
            self.stats.write().inbound_created += 1;
            drop(guard);
            self.notify(Direction::Inbound, object_type, remote_id, OperationKind::Create);
            return Ok(InboundOutcome::Created(created.id));
        };

        if !should_apply_inbound(local.checkpoint, modified_at) {
            tracing::debug!(
                object_type,
                %remote_id,
                %modified_at,
                checkpoint = ?local.checkpoint,
                "discarding stale inbound change"
            );
            self.stats.write().inbound_stale += 1;
            return Ok(InboundOutcome::Stale(local.id));
        }

        let changes = inbound_changes(record_type, Some(&local.attributes), attributes, emit_blanks);
        local.checkpoint = Some(modified_at);

        if changes.is_empty() {
            self.store.update(object_type, &local)?;
            tracing::debug!(object_type, %remote_id, "inbound change with no real difference");
            self.stats.write().inbound_unchanged += 1;
            return Ok(InboundOutcome::Unchanged(local.id));
        }

        let changed = changes.len();
        local.attributes.extend(changes);
        self.store.update(object_type, &local)?;
        tracing::info!(object_type, %remote_id, local_id = %local.id, changed, "inbound update");
        self.stats.write().inbound_updated += 1;
        drop(guard);
        self.notify(Direction::Inbound, object_type, remote_id, OperationKind::Update);
        Ok(InboundOutcome::Updated(local.id))
    }

    /// Applies a fetched or pushed remote record.
    pub fn apply_inbound_record(
        &self,
        object_type: &str,
        record: &RemoteRecord,
        emit_blanks: bool,
    ) -> SyncResult<InboundOutcome> {
        let modified_at = record
            .modified_at
            .ok_or_else(|| SyncError::MissingModificationTime {
                object_type: object_type.to_string(),
                remote_id: record.id.clone(),
            })?;
        self.apply_inbound(object_type, &record.id, &record.attributes, modified_at, emit_blanks)
    }

    /// Removes the local record for a remote delete. Never triggers an
    /// outbound delete.
    pub fn apply_inbound_delete(
        &self,
        object_type: &str,
        remote_id: &RemoteId,
    ) -> SyncResult<DeleteOutcome> {
        self.record_type(object_type)?;

        if self.suppressed_delete(object_type, remote_id) {
            return Ok(DeleteOutcome::Suppressed);
        }
        let guard = self.locks.lock(object_type, remote_id);
        // The outbound delete may have started while we waited.
        if self.suppressed_delete(object_type, remote_id) {
            return Ok(DeleteOutcome::Suppressed);
        }

        let Some(local) = self.store.find_by_remote_id(object_type, remote_id)? else {
            tracing::debug!(object_type, %remote_id, "inbound delete of unknown record");
            return Ok(DeleteOutcome::NotFound);
        };

        self.store.delete(object_type, local.id)?;
        tracing::info!(object_type, %remote_id, local_id = %local.id, "inbound delete");
        self.stats.write().inbound_deleted += 1;
        drop(guard);
        self.notify(Direction::Inbound, object_type, remote_id, OperationKind::Delete);
        Ok(DeleteOutcome::Deleted(local.id))
    }

    /// Applies a push notification as partial updates.
    ///
    /// Fails without applying anything if the notification names another
    /// organization than the configured one.
    pub fn handle_notification(&self, notification: &Notification) -> SyncResult<Vec<InboundOutcome>> {
        if let Some(expected) = &self.config.organization_id {
            if !notification.organization_id.eq_ignore_ascii_case(expected) {
                tracing::warn!(
                    organization_id = %notification.organization_id,
                    "rejecting notification from unknown organization"
                );
                return Err(SyncError::InvalidOrganization(
                    notification.organization_id.clone(),
                ));
            }
        }

        notification
            .records
            .iter()
            .map(|record| self.apply_inbound_record(&notification.object_type, record, false))
            .collect()
    }

    /// Creates a record on the remote system, then locally with the
    /// returned identifier already set.
    ///
    /// `attributes` carries local column names. Columns that are not synced
    /// are stored locally but not sent.
    pub fn outbound_create(
        &self,
        object_type: &str,
        attributes: AttributeMap,
    ) -> SyncResult<LocalRecord> {
        let key = Uuid::new_v4().to_string();
        self.outbound_create_with_key(object_type, attributes, key)
    }

    /// Same as [`SyncEngine::outbound_create`] with a caller-chosen
    /// idempotency key, typically the one returned by an
    /// [`SyncError::UnknownOutcome`].
    pub fn outbound_create_with_key(
        &self,
        object_type: &str,
        attributes: AttributeMap,
        idempotency_key: String,
    ) -> SyncResult<LocalRecord> {
        let record_type = self.record_type(object_type)?;
        let payload = record_type.remote_payload(&attributes);
        let ctx = self.call_context().with_idempotency_key(idempotency_key.clone());

        let response = self
            .remote
            .create(object_type, &payload, &ctx)
            .map_err(|err| self.outbound_error(object_type, None, Some(idempotency_key), err))?;
        if !response.success {
            return Err(self.rejected(object_type, response.errors));
        }
        let remote_id = response.id.ok_or_else(|| {
            SyncError::InvalidResponse(format!("{object_type} create succeeded without an id"))
        })?;
        let modified_at = match response.modified_at {
            Some(ts) => Some(ts),
            None => self.fetch_modified_at(object_type, &remote_id),
        };

        let guard = self.locks.lock(object_type, &remote_id);

        // The echo of the create may already have been applied inbound.
        let record = match self.store.find_by_remote_id(object_type, &remote_id)? {
            Some(mut existing) => {
                existing.attributes.extend(attributes);
                existing.checkpoint = existing.checkpoint.max(modified_at);
                self.store.update(object_type, &existing)?;
                existing
            }
            None => self.store.insert(
                object_type,
                NewRecord {
                    remote_id: Some(remote_id.clone()),
                    checkpoint: modified_at,
                    attributes,
                },
            )?,
        };

        tracing::info!(object_type, %remote_id, local_id = %record.id, "outbound create");
        self.stats.write().outbound_created += 1;
        drop(guard);
        self.notify(Direction::Outbound, object_type, &remote_id, OperationKind::Create);
        Ok(record)
    }

    /// Sends a local diff to the remote system and stores it locally along
    /// with the new remote modification time.
    ///
    /// `diff` carries local column names; every column must be synced.
    pub fn outbound_update(
        &self,
        object_type: &str,
        local_id: LocalId,
        diff: &AttributeMap,
    ) -> SyncResult<LocalRecord> {
        let record_type = self.record_type(object_type)?;
        let payload = record_type.map_diff(diff)?;
        let remote_id = self.linked_remote_id(object_type, local_id)?;

        let guard = self.locks.lock(object_type, &remote_id);
        let local = self.get_local(object_type, local_id)?;
        if payload.is_empty() {
            return Ok(local);
        }
        self.push_update(guard, object_type, local, &remote_id, &payload, diff.clone())
    }

    /// Holds `object_type`/`remote_id` until the guard drops. Outbound and
    /// inbound operations on the same record wait for it.
    pub(crate) fn lock_record(&self, object_type: &str, remote_id: &RemoteId) -> RecordGuard<'_> {
        self.locks.lock(object_type, remote_id)
    }

    /// Sends `payload` (remote names) for a record whose lock `guard` holds,
    /// then stores `writes` (local columns) and the new checkpoint in one
    /// local update. The lock is released before observers run.
    pub(crate) fn push_update(
        &self,
        guard: RecordGuard<'_>,
        object_type: &str,
        mut local: LocalRecord,
        remote_id: &RemoteId,
        payload: &AttributeMap,
        writes: AttributeMap,
    ) -> SyncResult<LocalRecord> {
        let response = self
            .remote
            .update(object_type, remote_id, payload, &self.call_context())
            .map_err(|err| self.outbound_error(object_type, Some(remote_id.clone()), None, err))?;
        if !response.success {
            return Err(self.rejected(object_type, response.errors));
        }
        let modified_at = match response.modified_at {
            Some(ts) => Some(ts),
            None => self.fetch_modified_at(object_type, remote_id),
        };

        local.attributes.extend(writes);
        local.checkpoint = local.checkpoint.max(modified_at);
        self.store.update(object_type, &local)?;

        tracing::info!(object_type, %remote_id, local_id = %local.id, "outbound update");
        self.stats.write().outbound_updated += 1;
        drop(guard);
        self.notify(Direction::Outbound, object_type, remote_id, OperationKind::Update);
        Ok(local)
    }

    /// Deletes a record on the remote system, then locally. Inbound deletes
    /// of the same record are suppressed while the remote call runs.
    pub fn outbound_delete(&self, object_type: &str, local_id: LocalId) -> SyncResult<()> {
        self.record_type(object_type)?;
        let remote_id = self.linked_remote_id(object_type, local_id)?;

        let guard = self.locks.lock(object_type, &remote_id);
        let response = {
            let _suppressed = self.suppression.suppress(object_type, &remote_id);
            self.remote
                .delete(object_type, &remote_id, &self.call_context())
                .map_err(|err| self.outbound_error(object_type, Some(remote_id.clone()), None, err))?
        };
        if !response.success {
            return Err(self.rejected(object_type, response.errors));
        }

        self.store.delete(object_type, local_id)?;
        tracing::info!(object_type, %remote_id, %local_id, "outbound delete");
        self.stats.write().outbound_deleted += 1;
        drop(guard);
        self.notify(Direction::Outbound, object_type, &remote_id, OperationKind::Delete);
        Ok(())
    }

    fn call_context(&self) -> CallContext {
        CallContext::new(self.config.call_timeout)
    }

    fn get_local(&self, object_type: &str, local_id: LocalId) -> SyncResult<LocalRecord> {
        self.store
            .get(object_type, local_id)?
            .ok_or_else(|| SyncError::NotFound {
                object_type: object_type.to_string(),
                local_id,
            })
    }

    fn linked_remote_id(&self, object_type: &str, local_id: LocalId) -> SyncResult<RemoteId> {
        self.get_local(object_type, local_id)?
            .remote_id
            .ok_or_else(|| SyncError::NotLinked {
                object_type: object_type.to_string(),
                local_id,
            })
    }

    fn suppressed_delete(&self, object_type: &str, remote_id: &RemoteId) -> bool {
        if !self.suppression.is_suppressed(object_type, remote_id) {
            return false;
        }
        tracing::debug!(object_type, %remote_id, "inbound delete suppressed");
        self.stats.write().suppressed_deletes += 1;
        true
    }

    /// Fetches the remote modification time after a write whose response
    /// did not carry it. The write already happened, so a failure here only
    /// leaves the checkpoint behind; the echo will then compare as unchanged.
    fn fetch_modified_at(&self, object_type: &str, remote_id: &RemoteId) -> Option<DateTime<Utc>> {
        match self.remote.modified_at(object_type, remote_id) {
            Ok(ts) => ts,
            Err(err) => {
                tracing::warn!(object_type, %remote_id, error = %err, "could not fetch modification time");
                None
            }
        }
    }

    fn outbound_error(
        &self,
        object_type: &str,
        remote_id: Option<RemoteId>,
        idempotency_key: Option<String>,
        err: RemoteError,
    ) -> SyncError {
        let error = if err.is_outcome_unknown() {
            tracing::warn!(object_type, remote_id = ?remote_id, error = %err, "outbound outcome unknown");
            self.stats.write().unknown_outcomes += 1;
            SyncError::UnknownOutcome {
                object_type: object_type.to_string(),
                remote_id,
                idempotency_key,
                source: err,
            }
        } else {
            SyncError::Remote(err)
        };
        self.stats.write().last_error = Some(error.to_string());
        error
    }

    fn rejected(&self, object_type: &str, errors: Vec<String>) -> SyncError {
        let error = SyncError::Rejected {
            object_type: object_type.to_string(),
            errors,
        };
        self.stats.write().last_error = Some(error.to_string());
        error
    }

    fn notify(
        &self,
        direction: Direction,
        object_type: &str,
        remote_id: &RemoteId,
        operation: OperationKind,
    ) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.on_sync(&SyncEvent {
                direction,
                object_type: object_type.to_string(),
                remote_id: remote_id.clone(),
                operation,
            });
        }
    }
}

/// Local column changes an inbound delivery implies, keyed by local column.
///
/// With no current record every delivered value is a change. A column the
/// current record lacks counts as null.
fn inbound_changes(
    record_type: &RecordTypeConfig,
    current: Option<&AttributeMap>,
    incoming: &AttributeMap,
    emit_blanks: bool,
) -> Vec<(String, FieldValue)> {
    record_type
        .synced_attributes
        .iter()
        .filter_map(|remote| {
            let column = record_type.local_name(remote);
            let new = match incoming.get(remote.as_str()) {
                Some(value) => value.clone(),
                None if emit_blanks => FieldValue::Null,
                None => return None,
            };
            let changed = current.map_or(true, |current| {
                current
                    .get(column)
                    .map_or(!new.is_null(), |old| is_real_change(old, &new))
            });
            changed.then(|| (column.to_string(), new))
        })
        .collect()
}
