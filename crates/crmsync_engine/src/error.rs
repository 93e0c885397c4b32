//! Error types for the sync engine.

use crate::store::LocalId;
use crmsync_protocol::{PollError, RemoteError, RemoteId};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a local store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Another local record already carries this remote identifier.
    #[error("duplicate remote id {remote_id} for {object_type}")]
    DuplicateRemoteId {
        /// Object type.
        object_type: String,
        /// Conflicting identifier.
        remote_id: RemoteId,
    },

    /// The record does not exist.
    #[error("{object_type} record {id} not found")]
    NotFound {
        /// Object type.
        object_type: String,
        /// Local identifier.
        id: LocalId,
    },

    /// Failure in the underlying persistence engine.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    /// No record type is configured for this object type.
    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    /// A local column has no forward mapping to a synced attribute.
    #[error("column {column} of {object_type} is not mapped to a synced attribute")]
    UnmappedAttribute {
        /// Object type.
        object_type: String,
        /// Local column name.
        column: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote call failed before reaching the remote system, or was
    /// refused by it.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// An outbound call timed out or lost its connection: the remote
    /// system may or may not have applied it.
    #[error("outcome of outbound {object_type} call unknown: {source}")]
    UnknownOutcome {
        /// Object type.
        object_type: String,
        /// Target record, when known before the call.
        remote_id: Option<RemoteId>,
        /// Idempotency key sent with a create, to reuse on retry.
        idempotency_key: Option<String>,
        /// Underlying failure.
        source: RemoteError,
    },

    /// The remote system rejected the request.
    #[error("remote rejected {object_type} request: {}", errors.join("; "))]
    Rejected {
        /// Object type.
        object_type: String,
        /// Errors reported by the remote system.
        errors: Vec<String>,
    },

    /// The remote system answered with something unusable.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),

    /// The local record does not exist.
    #[error("{object_type} record {local_id} not found")]
    NotFound {
        /// Object type.
        object_type: String,
        /// Local identifier.
        local_id: LocalId,
    },

    /// The local record has no remote identifier yet.
    #[error("{object_type} record {local_id} is not linked to a remote record")]
    NotLinked {
        /// Object type.
        object_type: String,
        /// Local identifier.
        local_id: LocalId,
    },

    /// A push notification claimed a different organization.
    #[error("invalid organization id in inbound notification: {0}")]
    InvalidOrganization(String),

    /// An inbound record carried no modification time.
    #[error("{object_type} record {remote_id} has no modification time")]
    MissingModificationTime {
        /// Object type.
        object_type: String,
        /// Remote identifier.
        remote_id: RemoteId,
    },

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Change detection failure.
    #[error("poll error: {0}")]
    Poll(#[from] PollError),
}

impl SyncError {
    /// Returns true if this error can be retried.
    ///
    /// Unknown outcomes are not: blindly repeating a create may duplicate
    /// the remote record.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Poll(err) => err.is_retryable(),
            SyncError::Store(StoreError::Backend(_)) => true,
            _ => false,
        }
    }

    /// Returns true if the remote system may have applied the request.
    pub fn is_unknown_outcome(&self) -> bool {
        matches!(self, SyncError::UnknownOutcome { .. })
    }
}
