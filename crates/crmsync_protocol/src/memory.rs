//! In-memory remote system for tests and local replay.

use crate::error::{RemoteError, RemoteResult};
use crate::poller::DeletedRecordFeed;
use crate::record::{RemoteId, RemoteRecord};
use crate::remote::{
    ApplyResponse, CallContext, CreateResponse, Predicate, RemoteApply, RemoteQuery,
};
use crate::window::ChangeWindow;
use chrono::{DateTime, Duration, Utc};
use crmsync_compare::AttributeMap;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// 2024-01-01T00:00:00Z, the default starting point of the remote clock.
const DEFAULT_EPOCH_SECS: i64 = 1_704_067_200;

/// A call received by [`MemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    /// `query`.
    Query {
        /// Object type.
        object_type: String,
        /// Query filter.
        predicate: Predicate,
    },
    /// `create`.
    Create {
        /// Object type.
        object_type: String,
        /// Remote-named attributes sent.
        attributes: AttributeMap,
        /// Idempotency key, if any.
        idempotency_key: Option<String>,
    },
    /// `update`.
    Update {
        /// Object type.
        object_type: String,
        /// Target record.
        id: RemoteId,
        /// Remote-named attributes sent.
        attributes: AttributeMap,
    },
    /// `delete`.
    Delete {
        /// Object type.
        object_type: String,
        /// Target record.
        id: RemoteId,
    },
    /// `deleted_ids`.
    DeletedIds {
        /// Object type.
        object_type: String,
    },
}

#[derive(Debug)]
struct State {
    tables: BTreeMap<String, BTreeMap<RemoteId, RemoteRecord>>,
    tombstones: Vec<(String, RemoteId, DateTime<Utc>)>,
    clock: DateTime<Utc>,
    next_id: u64,
    id_prefix: String,
    idempotency: HashMap<String, RemoteId>,
    failures: VecDeque<RemoteError>,
    lose_next_create_ack: bool,
    modstamp_in_responses: bool,
    calls: Vec<RemoteCall>,
}

impl State {
    /// Advances the clock by one second and returns the new time.
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += Duration::seconds(1);
        self.clock
    }

    fn table(&mut self, object_type: &str) -> &mut BTreeMap<RemoteId, RemoteRecord> {
        self.tables.entry(object_type.to_string()).or_default()
    }

    fn take_failure(&mut self) -> RemoteResult<()> {
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// A remote system held entirely in memory.
///
/// Every write advances a deterministic clock by one second and stamps the
/// record with it, so modification times are strictly increasing. Failures
/// can be queued with [`MemoryRemote::fail_next`], and a create whose
/// acknowledgment is lost can be simulated with
/// [`MemoryRemote::lose_next_create_ack`]. Creates carrying an idempotency
/// key already seen return the record created the first time.
#[derive(Debug)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    /// Creates an empty remote with its clock at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tables: BTreeMap::new(),
                tombstones: Vec::new(),
                clock: DateTime::from_timestamp(DEFAULT_EPOCH_SECS, 0).unwrap_or_default(),
                next_id: 1,
                id_prefix: "R".to_string(),
                idempotency: HashMap::new(),
                failures: VecDeque::new(),
                lose_next_create_ack: false,
                modstamp_in_responses: false,
                calls: Vec::new(),
            }),
        }
    }

    /// Sets the prefix of generated identifiers.
    pub fn with_id_prefix(self, prefix: impl Into<String>) -> Self {
        self.state.lock().id_prefix = prefix.into();
        self
    }

    /// Makes create/update responses carry the new modification time.
    pub fn with_modstamp_in_responses(self, enabled: bool) -> Self {
        self.state.lock().modstamp_in_responses = enabled;
        self
    }

    /// Returns the current remote clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.state.lock().clock
    }

    /// Moves the remote clock.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        self.state.lock().clock = now;
    }

    /// Inserts or replaces a record exactly as given.
    pub fn seed(&self, object_type: &str, record: RemoteRecord) {
        self.state
            .lock()
            .table(object_type)
            .insert(record.id.clone(), record);
    }

    /// Edits a record on the remote side, as another client of the remote
    /// system would. Returns the new modification time.
    pub fn modify(
        &self,
        object_type: &str,
        id: &RemoteId,
        attributes: AttributeMap,
    ) -> Option<DateTime<Utc>> {
        let mut state = self.state.lock();
        let now = state.tick();
        let record = state.table(object_type).get_mut(id)?;
        record.attributes.extend(attributes);
        record.modified_at = Some(now);
        Some(now)
    }

    /// Deletes a record on the remote side and records a tombstone.
    pub fn remove(&self, object_type: &str, id: &RemoteId) -> Option<RemoteRecord> {
        let mut state = self.state.lock();
        let now = state.tick();
        let removed = state.table(object_type).remove(id)?;
        state
            .tombstones
            .push((object_type.to_string(), id.clone(), now));
        Some(removed)
    }

    /// Returns a copy of a stored record.
    pub fn record(&self, object_type: &str, id: &RemoteId) -> Option<RemoteRecord> {
        self.state
            .lock()
            .tables
            .get(object_type)
            .and_then(|table| table.get(id))
            .cloned()
    }

    /// Copies of every record stored for an object type, in id order.
    pub fn records(&self, object_type: &str) -> Vec<RemoteRecord> {
        self.state
            .lock()
            .tables
            .get(object_type)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records stored for an object type.
    pub fn count(&self, object_type: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(object_type)
            .map_or(0, BTreeMap::len)
    }

    /// Queues an error returned by the next call, whatever it is.
    pub fn fail_next(&self, error: RemoteError) {
        self.state.lock().failures.push_back(error);
    }

    /// Applies the next create but reports a timeout to the caller.
    pub fn lose_next_create_ack(&self) {
        self.state.lock().lose_next_create_ack = true;
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().calls.clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteQuery for MemoryRemote {
    fn query(&self, object_type: &str, predicate: &Predicate) -> RemoteResult<Vec<RemoteRecord>> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Query {
            object_type: object_type.to_string(),
            predicate: predicate.clone(),
        });
        state.take_failure()?;

        Ok(state
            .tables
            .get(object_type)
            .map(|table| {
                table
                    .values()
                    .filter(|record| predicate.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

impl RemoteApply for MemoryRemote {
    fn create(
        &self,
        object_type: &str,
        attributes: &AttributeMap,
        ctx: &CallContext,
    ) -> RemoteResult<CreateResponse> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Create {
            object_type: object_type.to_string(),
            attributes: attributes.clone(),
            idempotency_key: ctx.idempotency_key.clone(),
        });
        state.take_failure()?;

        let existing = ctx
            .idempotency_key
            .as_ref()
            .and_then(|key| state.idempotency.get(key))
            .cloned();
        if let Some(existing) = existing {
            let modified_at = state
                .tables
                .get(object_type)
                .and_then(|table| table.get(&existing))
                .and_then(|record| record.modified_at);
            let mut response = CreateResponse::success(existing);
            if state.modstamp_in_responses {
                response.modified_at = modified_at;
            }
            return Ok(response);
        }

        let id = RemoteId::new(format!("{}{:03}", state.id_prefix, state.next_id));
        state.next_id += 1;
        let now = state.tick();
        let record = RemoteRecord {
            id: id.clone(),
            modified_at: Some(now),
            attributes: attributes.clone(),
        };
        state.table(object_type).insert(id.clone(), record);
        if let Some(key) = &ctx.idempotency_key {
            state.idempotency.insert(key.clone(), id.clone());
        }

        if std::mem::take(&mut state.lose_next_create_ack) {
            return Err(RemoteError::Timeout(ctx.timeout));
        }

        let mut response = CreateResponse::success(id);
        if state.modstamp_in_responses {
            response.modified_at = Some(now);
        }
        Ok(response)
    }

    fn update(
        &self,
        object_type: &str,
        id: &RemoteId,
        attributes: &AttributeMap,
        _ctx: &CallContext,
    ) -> RemoteResult<ApplyResponse> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Update {
            object_type: object_type.to_string(),
            id: id.clone(),
            attributes: attributes.clone(),
        });
        state.take_failure()?;

        let now = state.tick();
        let modstamp_in_responses = state.modstamp_in_responses;
        let Some(record) = state.table(object_type).get_mut(id) else {
            return Ok(ApplyResponse::rejected(vec![format!(
                "entity is deleted: {id}"
            )]));
        };
        record.attributes.extend(attributes.clone());
        record.modified_at = Some(now);

        let response = ApplyResponse::success();
        Ok(if modstamp_in_responses {
            response.with_modified_at(now)
        } else {
            response
        })
    }

    fn delete(
        &self,
        object_type: &str,
        id: &RemoteId,
        _ctx: &CallContext,
    ) -> RemoteResult<ApplyResponse> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::Delete {
            object_type: object_type.to_string(),
            id: id.clone(),
        });
        state.take_failure()?;

        let now = state.tick();
        if state.table(object_type).remove(id).is_some() {
            state
                .tombstones
                .push((object_type.to_string(), id.clone(), now));
        }
        Ok(ApplyResponse::success())
    }
}

impl DeletedRecordFeed for MemoryRemote {
    fn deleted_ids(&self, object_type: &str, window: &ChangeWindow) -> RemoteResult<Vec<RemoteId>> {
        let mut state = self.state.lock();
        state.calls.push(RemoteCall::DeletedIds {
            object_type: object_type.to_string(),
        });
        state.take_failure()?;

        Ok(state
            .tombstones
            .iter()
            .filter(|(ty, _, at)| ty == object_type && window.contains(*at))
            .map(|(_, id, _)| id.clone())
            .collect())
    }
}
