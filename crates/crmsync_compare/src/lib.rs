//! # CRMSync Compare
//!
//! Semantic comparison of field values exchanged with a CRM-style remote
//! system.
//!
//! Every inbound and outbound apply decision is gated by "does any watched
//! field actually differ". Raw equality flags false positives on every round
//! trip through systems with different serialization conventions, so this
//! crate answers the question after normalizing away:
//! - invalid byte sequences in transported text
//! - timezone and sub-second differences in timestamps
//! - floating-point representation drift
//! - line-ending and whitespace differences, and astral-plane glyphs that
//!   some transports mangle
//!
//! This is a pure crate with no I/O.
//!
//! ## Usage
//!
//! ```
//! use crmsync_compare::{equals, FieldValue};
//!
//! let local = FieldValue::Text("2024-05-01T10:00:00.250Z".into());
//! let remote = FieldValue::Text("2024-05-01T12:00:00+02:00".into());
//! assert!(equals(&local, &remote));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod compare;
mod value;

pub use compare::{
    cleanup, coerce, equals, is_real_change, normalize_text, parse_timestamp, EPSILON,
};
pub use value::{AttributeMap, FieldValue, ValueKind};
