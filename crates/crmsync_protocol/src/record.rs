//! Remote record identity and payloads.

use chrono::{DateTime, Utc};
use crmsync_compare::{AttributeMap, FieldValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, globally unique identifier assigned by the remote system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Creates a remote ID from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RemoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A record as returned by the remote system.
///
/// Attribute names are remote field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote identifier.
    pub id: RemoteId,
    /// Remote system's last modification time for this record.
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    /// Field values keyed by remote field name.
    #[serde(default)]
    pub attributes: AttributeMap,
}

impl RemoteRecord {
    /// Creates a record with no attributes.
    pub fn new(id: impl Into<RemoteId>, modified_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            modified_at,
            attributes: AttributeMap::new(),
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Returns an attribute value, if present.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name)
    }
}

/// An inbound push message delivered by the remote system.
///
/// Push messages carry only the fields the remote side chose to send, so
/// they are applied as partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Organization the message claims to come from.
    pub organization_id: String,
    /// Object type of every record in the message.
    pub object_type: String,
    /// Records carried by the message.
    pub records: Vec<RemoteRecord>,
}
