//! # CRMSync Testkit
//!
//! Test utilities for CRMSync.
//!
//! This crate provides:
//! - The `Lead` fixture record type and an engine over in-memory
//!   collaborators with an event recorder
//! - Property-based test generators using proptest
//! - Temporary JSON files for CLI scenarios
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crmsync_testkit::prelude::*;
//!
//! #[test]
//! fn inbound_create() {
//!     let sync = TestSync::new();
//!     sync.apply_inbound(LEAD, &"A001".into(), &attrs(&[("FirstName", "John")]), at(1), true)
//!         .unwrap();
//!     assert!(sync.lead("A001").is_some());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
