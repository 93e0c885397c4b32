//! # CRMSync Engine
//!
//! Bidirectional sync state machine for CRMSync.
//!
//! This crate provides:
//! - Inbound apply with stale detection and semantic change detection
//! - Outbound create/update/delete with echo suppression
//! - Per-record serialization through a keyed lock table
//! - A synced repository honoring per-type and per-write sync switches
//! - A poll scheduler chaining change windows with retry
//!
//! ## Architecture
//!
//! The remote modification time is the single source of truth for ordering:
//! 1. Every local record stores the last remote modification time it saw
//!    (its checkpoint)
//! 2. Inbound changes apply only when strictly newer than the checkpoint
//! 3. Outbound writes store the modification time the remote system gave
//!    them, so their echo arrives stale
//!
//! ## Key Invariants
//!
//! - Inbound apply never triggers an outbound write
//! - A checkpoint never moves backwards
//! - Records are processed one at a time per (object type, remote id)
//! - An outbound delete's own echo is never applied
//! - A timed-out outbound call is reported as an unknown outcome

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod locks;
mod observer;
mod repository;
mod scheduler;
mod state;
mod store;
mod suppression;

pub use config::{Operations, RecordTypeConfig, RetryConfig, SyncConfig, ORGANIZATION_ID_LEN};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use locks::{RecordGuard, RecordLocks};
pub use observer::{Direction, OperationKind, SyncEvent, SyncObserver};
pub use repository::{SyncedRepository, WriteOptions};
pub use scheduler::{PollScheduler, WindowReport};
pub use state::{should_apply_inbound, DeleteOutcome, InboundOutcome, SyncEngine, SyncStats};
pub use store::{LocalId, LocalRecord, LocalStore, MemoryStore, NewRecord};
pub use suppression::{SuppressionGuard, SuppressionSet};
