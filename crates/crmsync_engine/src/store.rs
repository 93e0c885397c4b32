//! Local store capability.

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use crmsync_compare::{AttributeMap, FieldValue};
use crmsync_protocol::RemoteId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Local primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A locally stored record.
///
/// Attribute names are local column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Local primary key.
    pub id: LocalId,
    /// Remote identifier, once linked.
    pub remote_id: Option<RemoteId>,
    /// Last known remote modification time.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Column values.
    pub attributes: AttributeMap,
}

static NULL: FieldValue = FieldValue::Null;

impl LocalRecord {
    /// Returns a column value, or `Null` when the column is unset.
    pub fn get(&self, column: &str) -> &FieldValue {
        self.attributes.get(column).unwrap_or(&NULL)
    }
}

/// A record to insert.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    /// Remote identifier, if already known.
    pub remote_id: Option<RemoteId>,
    /// Initial checkpoint.
    pub checkpoint: Option<DateTime<Utc>>,
    /// Column values.
    pub attributes: AttributeMap,
}

impl NewRecord {
    /// Creates an unlinked record.
    pub fn new(attributes: AttributeMap) -> Self {
        Self {
            remote_id: None,
            checkpoint: None,
            attributes,
        }
    }

    /// Links the record to a remote identifier.
    pub fn with_remote_id(mut self, remote_id: impl Into<RemoteId>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    /// Sets the initial checkpoint.
    pub fn with_checkpoint(mut self, checkpoint: DateTime<Utc>) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Sets a column value.
    pub fn with_attribute(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }
}

/// Persistence used by the sync engine.
///
/// Implementations must keep at most one record per remote identifier per
/// object type, and must assign the remote identifier in the same write
/// that makes the record visible.
pub trait LocalStore: Send + Sync {
    /// Finds the record linked to a remote identifier.
    fn find_by_remote_id(
        &self,
        object_type: &str,
        remote_id: &RemoteId,
    ) -> StoreResult<Option<LocalRecord>>;

    /// Gets a record by local identifier.
    fn get(&self, object_type: &str, id: LocalId) -> StoreResult<Option<LocalRecord>>;

    /// Inserts a record and returns it with its assigned identifier.
    fn insert(&self, object_type: &str, record: NewRecord) -> StoreResult<LocalRecord>;

    /// Replaces a stored record.
    fn update(&self, object_type: &str, record: &LocalRecord) -> StoreResult<()>;

    /// Deletes a record. Returns false if it did not exist.
    fn delete(&self, object_type: &str, id: LocalId) -> StoreResult<bool>;

    /// Lists every record of an object type in identifier order.
    fn list(&self, object_type: &str) -> StoreResult<Vec<LocalRecord>>;
}

#[derive(Debug, Default)]
struct Table {
    records: BTreeMap<LocalId, LocalRecord>,
    by_remote_id: HashMap<RemoteId, LocalId>,
}

/// An in-memory local store for testing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    next_id: RwLock<u64>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records of an object type.
    pub fn count(&self, object_type: &str) -> usize {
        self.tables
            .read()
            .get(object_type)
            .map_or(0, |table| table.records.len())
    }
}

impl LocalStore for MemoryStore {
    fn find_by_remote_id(
        &self,
        object_type: &str,
        remote_id: &RemoteId,
    ) -> StoreResult<Option<LocalRecord>> {
        let tables = self.tables.read();
        Ok(tables.get(object_type).and_then(|table| {
            table
                .by_remote_id
                .get(remote_id)
                .and_then(|id| table.records.get(id))
                .cloned()
        }))
    }

    fn get(&self, object_type: &str, id: LocalId) -> StoreResult<Option<LocalRecord>> {
        Ok(self
            .tables
            .read()
            .get(object_type)
            .and_then(|table| table.records.get(&id))
            .cloned())
    }

    fn insert(&self, object_type: &str, record: NewRecord) -> StoreResult<LocalRecord> {
        let mut tables = self.tables.write();
        let table = tables.entry(object_type.to_string()).or_default();

        if let Some(remote_id) = &record.remote_id {
            if table.by_remote_id.contains_key(remote_id) {
                return Err(StoreError::DuplicateRemoteId {
                    object_type: object_type.to_string(),
                    remote_id: remote_id.clone(),
                });
            }
        }

        let id = {
            let mut next = self.next_id.write();
            *next += 1;
            LocalId(*next)
        };
        let stored = LocalRecord {
            id,
            remote_id: record.remote_id,
            checkpoint: record.checkpoint,
            attributes: record.attributes,
        };
        if let Some(remote_id) = &stored.remote_id {
            table.by_remote_id.insert(remote_id.clone(), id);
        }
        table.records.insert(id, stored.clone());
        Ok(stored)
    }

    fn update(&self, object_type: &str, record: &LocalRecord) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let not_found = || StoreError::NotFound {
            object_type: object_type.to_string(),
            id: record.id,
        };
        let table = tables.get_mut(object_type).ok_or_else(not_found)?;
        let previous = table
            .records
            .get(&record.id)
            .ok_or_else(not_found)?
            .remote_id
            .clone();

        if previous != record.remote_id {
            if let Some(remote_id) = &record.remote_id {
                if table.by_remote_id.contains_key(remote_id) {
                    return Err(StoreError::DuplicateRemoteId {
                        object_type: object_type.to_string(),
                        remote_id: remote_id.clone(),
                    });
                }
                table.by_remote_id.insert(remote_id.clone(), record.id);
            }
            if let Some(previous) = previous {
                table.by_remote_id.remove(&previous);
            }
        }

        table.records.insert(record.id, record.clone());
        Ok(())
    }

    fn delete(&self, object_type: &str, id: LocalId) -> StoreResult<bool> {
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(object_type) else {
            return Ok(false);
        };
        match table.records.remove(&id) {
            Some(record) => {
                if let Some(remote_id) = record.remote_id {
                    table.by_remote_id.remove(&remote_id);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self, object_type: &str) -> StoreResult<Vec<LocalRecord>> {
        Ok(self
            .tables
            .read()
            .get(object_type)
            .map(|table| table.records.values().cloned().collect())
            .unwrap_or_default())
    }
}
