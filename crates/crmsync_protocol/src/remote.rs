//! Capabilities consumed from the remote system.
//!
//! The sync core has no wire format of its own. These traits abstract the
//! client that talks to the remote system, allowing for different
//! implementations (REST, SOAP, in-memory for testing, etc.).

use crate::error::RemoteResult;
use crate::record::{RemoteId, RemoteRecord};
use crate::window::ChangeWindow;
use chrono::{DateTime, Utc};
use crmsync_compare::AttributeMap;
use std::time::Duration;

/// Default bound on a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Filter for a remote query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Records whose modification time falls within the window.
    ModifiedWithin(ChangeWindow),
    /// The single record with this identifier.
    IdEquals(RemoteId),
}

impl Predicate {
    /// Returns true if the record satisfies the predicate.
    pub fn matches(&self, record: &RemoteRecord) -> bool {
        match self {
            Predicate::ModifiedWithin(window) => {
                record.modified_at.is_some_and(|ts| window.contains(ts))
            }
            Predicate::IdEquals(id) => &record.id == id,
        }
    }
}

/// Per-call options handed to the remote capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    /// Upper bound on the call. Implementations report
    /// [`crate::RemoteError::Timeout`] when it elapses.
    pub timeout: Duration,
    /// Key letting the remote system deduplicate a retried create.
    pub idempotency_key: Option<String>,
}

impl CallContext {
    /// Creates a context with the given timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            idempotency_key: None,
        }
    }

    /// Attaches an idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}

/// Response to a remote create.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateResponse {
    /// Identifier assigned by the remote system.
    pub id: Option<RemoteId>,
    /// Whether the create was accepted.
    pub success: bool,
    /// Validation or processing errors.
    pub errors: Vec<String>,
    /// Modification time of the new record, when the remote reports it.
    pub modified_at: Option<DateTime<Utc>>,
}

impl CreateResponse {
    /// Creates a successful response.
    pub fn success(id: impl Into<RemoteId>) -> Self {
        Self {
            id: Some(id.into()),
            success: true,
            errors: Vec::new(),
            modified_at: None,
        }
    }

    /// Creates a rejected response.
    pub fn rejected(errors: Vec<String>) -> Self {
        Self {
            id: None,
            success: false,
            errors,
            modified_at: None,
        }
    }

    /// Sets the reported modification time.
    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }
}

/// Response to a remote update or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResponse {
    /// Whether the operation was accepted.
    pub success: bool,
    /// Validation or processing errors.
    pub errors: Vec<String>,
    /// New modification time, when the remote reports it.
    pub modified_at: Option<DateTime<Utc>>,
}

impl ApplyResponse {
    /// Creates a successful response.
    pub fn success() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            modified_at: None,
        }
    }

    /// Creates a rejected response.
    pub fn rejected(errors: Vec<String>) -> Self {
        Self {
            success: false,
            errors,
            modified_at: None,
        }
    }

    /// Sets the reported modification time.
    pub fn with_modified_at(mut self, modified_at: DateTime<Utc>) -> Self {
        self.modified_at = Some(modified_at);
        self
    }
}

/// Read access to the remote system.
pub trait RemoteQuery: Send + Sync {
    /// Returns every record of `object_type` matching the predicate.
    fn query(&self, object_type: &str, predicate: &Predicate) -> RemoteResult<Vec<RemoteRecord>>;

    /// Fetches a single record.
    fn fetch(&self, object_type: &str, id: &RemoteId) -> RemoteResult<Option<RemoteRecord>> {
        Ok(self
            .query(object_type, &Predicate::IdEquals(id.clone()))?
            .into_iter()
            .next())
    }

    /// Fetches the current modification time of a single record.
    fn modified_at(&self, object_type: &str, id: &RemoteId) -> RemoteResult<Option<DateTime<Utc>>> {
        Ok(self.fetch(object_type, id)?.and_then(|record| record.modified_at))
    }
}

/// Write access to the remote system.
///
/// Update and delete are naturally idempotent. Create is not: a retry after
/// a lost acknowledgment can produce a duplicate unless the implementation
/// honors [`CallContext::idempotency_key`].
pub trait RemoteApply: Send + Sync {
    /// Creates a record from remote-named attributes.
    fn create(
        &self,
        object_type: &str,
        attributes: &AttributeMap,
        ctx: &CallContext,
    ) -> RemoteResult<CreateResponse>;

    /// Updates the given remote-named attributes of a record.
    fn update(
        &self,
        object_type: &str,
        id: &RemoteId,
        attributes: &AttributeMap,
        ctx: &CallContext,
    ) -> RemoteResult<ApplyResponse>;

    /// Deletes a record.
    fn delete(&self, object_type: &str, id: &RemoteId, ctx: &CallContext)
        -> RemoteResult<ApplyResponse>;
}

/// A remote system offering both read and write access.
pub trait Remote: RemoteQuery + RemoteApply {}

impl<T: RemoteQuery + RemoteApply> Remote for T {}
