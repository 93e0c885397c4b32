//! Record-type layer over the local store.
//!
//! Local writes made through a [`SyncedRepository`] propagate to the remote
//! system when the global switch, the record type's switch and its enabled
//! operations all allow it. [`WriteOptions::skip_sync`] bypasses the remote
//! side for a single write, e.g. when loading records already known remotely.

use crate::error::{SyncError, SyncResult};
use crate::state::SyncEngine;
use crate::store::{LocalId, LocalRecord, LocalStore, NewRecord};
use crmsync_compare::{is_real_change, AttributeMap, FieldValue};
use crmsync_protocol::{Remote, RemoteId};
use std::sync::Arc;

/// Per-write options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Write locally only.
    pub skip_sync: bool,
}

impl WriteOptions {
    /// Options for a local-only write.
    pub fn skip_sync() -> Self {
        Self { skip_sync: true }
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Create,
    Update,
    Delete,
}

/// Local access to one record type, with outbound sync.
pub struct SyncedRepository<R: Remote, S: LocalStore> {
    engine: Arc<SyncEngine<R, S>>,
    object_type: String,
}

impl<R: Remote, S: LocalStore> SyncedRepository<R, S> {
    /// Creates a repository for a configured record type.
    pub fn new(engine: Arc<SyncEngine<R, S>>, object_type: impl Into<String>) -> SyncResult<Self> {
        let object_type = object_type.into();
        engine.record_type(&object_type)?;
        Ok(Self {
            engine,
            object_type,
        })
    }

    /// Object type of this repository.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Gets a record.
    pub fn get(&self, id: LocalId) -> SyncResult<Option<LocalRecord>> {
        Ok(self.engine.store().get(&self.object_type, id)?)
    }

    /// Finds the record linked to a remote identifier.
    pub fn find_by_remote_id(&self, remote_id: &RemoteId) -> SyncResult<Option<LocalRecord>> {
        Ok(self
            .engine
            .store()
            .find_by_remote_id(&self.object_type, remote_id)?)
    }

    /// Lists all records.
    pub fn list(&self) -> SyncResult<Vec<LocalRecord>> {
        Ok(self.engine.store().list(&self.object_type)?)
    }

    /// Creates a record. When sync applies, the remote record is created
    /// first and the local record is stored already linked to it.
    pub fn create(&self, attributes: AttributeMap, options: WriteOptions) -> SyncResult<LocalRecord> {
        if self.syncs(Operation::Create, options)? {
            return self.engine.outbound_create(&self.object_type, attributes);
        }
        Ok(self
            .engine
            .store()
            .insert(&self.object_type, NewRecord::new(attributes))?)
    }

    /// Stores a record as is, without any remote call. Used to load records
    /// that already exist on the remote side.
    pub fn import(&self, record: NewRecord) -> SyncResult<LocalRecord> {
        Ok(self.engine.store().insert(&self.object_type, record)?)
    }

    /// Updates columns of a record.
    ///
    /// Only values that really changed are written. When sync applies and
    /// the record is linked, the synced part of the change goes to the
    /// remote system first; nothing is written locally if that fails.
    /// Linked records are read and written under their record lock, so an
    /// inbound change landing in between is never overwritten.
    pub fn update(
        &self,
        id: LocalId,
        changes: AttributeMap,
        options: WriteOptions,
    ) -> SyncResult<LocalRecord> {
        let current = self.require(id)?;
        let Some(remote_id) = current.remote_id.clone() else {
            // Inbound sync never touches unlinked records.
            let diff = real_changes(&current, changes);
            return self.store_changes(current, diff);
        };

        let guard = self.engine.lock_record(&self.object_type, &remote_id);
        let current = self.require(id)?;
        let diff = real_changes(&current, changes);
        if diff.is_empty() {
            return Ok(current);
        }

        let record_type = self.engine.record_type(&self.object_type)?;
        let (synced, local_only): (AttributeMap, AttributeMap) = diff
            .into_iter()
            .partition(|(column, _)| record_type.remote_name(column).is_some());

        if synced.is_empty() || !self.syncs(Operation::Update, options)? {
            let mut writes = synced;
            writes.extend(local_only);
            return self.store_changes(current, writes);
        }

        let payload = record_type.map_diff(&synced)?;
        let mut writes = synced;
        writes.extend(local_only);
        self.engine
            .push_update(guard, &self.object_type, current, &remote_id, &payload, writes)
    }

    /// Sets a single column.
    pub fn set(
        &self,
        id: LocalId,
        column: impl Into<String>,
        value: impl Into<FieldValue>,
        options: WriteOptions,
    ) -> SyncResult<LocalRecord> {
        let mut changes = AttributeMap::new();
        changes.insert(column.into(), value.into());
        self.update(id, changes, options)
    }

    /// Deletes a record. When sync applies and the record is linked, the
    /// remote record is deleted first.
    pub fn delete(&self, id: LocalId, options: WriteOptions) -> SyncResult<()> {
        let current = self.require(id)?;
        let Some(remote_id) = current.remote_id else {
            self.engine.store().delete(&self.object_type, id)?;
            return Ok(());
        };
        if self.syncs(Operation::Delete, options)? {
            return self.engine.outbound_delete(&self.object_type, id);
        }

        let _guard = self.engine.lock_record(&self.object_type, &remote_id);
        if !self.engine.store().delete(&self.object_type, id)? {
            return Err(self.not_found(id));
        }
        Ok(())
    }

    fn require(&self, id: LocalId) -> SyncResult<LocalRecord> {
        self.get(id)?.ok_or_else(|| self.not_found(id))
    }

    fn not_found(&self, id: LocalId) -> SyncError {
        SyncError::NotFound {
            object_type: self.object_type.clone(),
            local_id: id,
        }
    }

    fn store_changes(&self, mut current: LocalRecord, diff: AttributeMap) -> SyncResult<LocalRecord> {
        if diff.is_empty() {
            return Ok(current);
        }
        current.attributes.extend(diff);
        self.engine.store().update(&self.object_type, &current)?;
        Ok(current)
    }

    fn syncs(&self, operation: Operation, options: WriteOptions) -> SyncResult<bool> {
        if options.skip_sync || !self.engine.config().sync_enabled {
            return Ok(false);
        }
        let record_type = self.engine.record_type(&self.object_type)?;
        let enabled = match operation {
            Operation::Create => record_type.operations.create,
            Operation::Update => record_type.operations.update,
            Operation::Delete => record_type.operations.delete,
        };
        Ok(record_type.enabled && enabled)
    }
}

/// The entries of `changes` that differ from `current`. A column the record
/// lacks counts as changed unless the new value is null.
fn real_changes(current: &LocalRecord, changes: AttributeMap) -> AttributeMap {
    changes
        .into_iter()
        .filter(|(column, value)| {
            current
                .attributes
                .get(column)
                .map_or(!value.is_null(), |old| is_real_change(old, value))
        })
        .collect()
}
