//! # CRMSync Protocol
//!
//! Record identity, remote capabilities and change detection for CRMSync.
//!
//! This crate provides:
//! - `RemoteId`, `RemoteRecord` and `Notification` payload types
//! - `ChangeWindow` with inclusive bounds and `ChangedIds`
//! - The `RemoteQuery` / `RemoteApply` capability traits
//! - The `Poller` and its pluggable `ChangeMechanism`s
//! - `MemoryRemote`, an in-memory remote system for tests and replay
//!
//! No transport lives here: real clients implement the capability traits.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod memory;
pub mod poller;
mod record;
mod remote;
mod window;

pub use error::{PollError, PollResult, RemoteError, RemoteResult};
pub use memory::{MemoryRemote, RemoteCall};
pub use poller::{ChangeMechanism, DeletedRecordFeed, DeletionFeed, Poller, SystemModstamp};
pub use record::{Notification, RemoteId, RemoteRecord};
pub use remote::{
    ApplyResponse, CallContext, CreateResponse, Predicate, Remote, RemoteApply, RemoteQuery,
    DEFAULT_CALL_TIMEOUT,
};
pub use window::{ChangeWindow, ChangedIds};
