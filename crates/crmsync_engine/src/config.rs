//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crmsync_compare::AttributeMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Length of a case-insensitive organization identifier.
pub const ORGANIZATION_ID_LEN: usize = 18;

/// Which outbound operations a record type propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Operations {
    /// Local creates are sent to the remote system.
    pub create: bool,
    /// Local updates are sent to the remote system.
    pub update: bool,
    /// Local deletes are sent to the remote system.
    pub delete: bool,
}

impl Operations {
    /// All operations enabled.
    pub fn all() -> Self {
        Self {
            create: true,
            update: true,
            delete: true,
        }
    }

    /// No outbound operations.
    pub fn none() -> Self {
        Self {
            create: false,
            update: false,
            delete: false,
        }
    }
}

impl Default for Operations {
    fn default() -> Self {
        Self::all()
    }
}

/// Sync configuration for one remote object type.
///
/// Attribute names in `synced_attributes` are remote field names. `mapping`
/// renames some of them to local columns; unmapped attributes keep their
/// remote name locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTypeConfig {
    /// Remote object type, e.g. `Lead`.
    pub object_type: String,
    /// Remote attributes kept in sync.
    #[serde(default)]
    pub synced_attributes: BTreeSet<String>,
    /// Remote attribute name to local column name.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,
    /// Enabled outbound operations.
    #[serde(default)]
    pub operations: Operations,
    /// Whether local writes to this record type sync at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl RecordTypeConfig {
    /// Creates a configuration with no synced attributes.
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            synced_attributes: BTreeSet::new(),
            mapping: BTreeMap::new(),
            operations: Operations::all(),
            enabled: true,
        }
    }

    /// Adds synced attributes.
    pub fn with_attributes<I, A>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.synced_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Maps a remote attribute to a differently named local column.
    pub fn with_mapping(mut self, remote: impl Into<String>, local: impl Into<String>) -> Self {
        self.mapping.insert(remote.into(), local.into());
        self
    }

    /// Sets the enabled outbound operations.
    pub fn with_operations(mut self, operations: Operations) -> Self {
        self.operations = operations;
        self
    }

    /// Sets the participation switch.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Local column for a remote attribute.
    pub fn local_name<'a>(&'a self, remote: &'a str) -> &'a str {
        self.mapping.get(remote).map_or(remote, String::as_str)
    }

    /// Remote attribute for a local column, if the column is synced.
    pub fn remote_name(&self, local: &str) -> Option<&str> {
        self.synced_attributes
            .iter()
            .map(String::as_str)
            .find(|remote| self.local_name(remote) == local)
    }

    /// Outbound create payload: the synced columns present in `local`,
    /// renamed to remote attributes. Other columns are dropped.
    pub fn remote_payload(&self, local: &AttributeMap) -> AttributeMap {
        self.synced_attributes
            .iter()
            .filter_map(|remote| {
                local
                    .get(self.local_name(remote))
                    .map(|value| (remote.clone(), value.clone()))
            })
            .collect()
    }

    /// Renames a local diff to remote attributes, failing on any column that
    /// is not synced.
    pub fn map_diff(&self, diff: &AttributeMap) -> SyncResult<AttributeMap> {
        diff.iter()
            .map(|(column, value)| {
                self.remote_name(column)
                    .map(|remote| (remote.to_string(), value.clone()))
                    .ok_or_else(|| SyncError::UnmappedAttribute {
                        object_type: self.object_type.clone(),
                        column: column.clone(),
                    })
            })
            .collect()
    }

    /// Validates the record type.
    pub fn validate(&self) -> SyncResult<()> {
        if self.object_type.is_empty() {
            return Err(SyncError::Config("object type must not be empty".into()));
        }

        if let Some(remote) = self
            .mapping
            .keys()
            .find(|remote| !self.synced_attributes.contains(*remote))
        {
            return Err(SyncError::Config(format!(
                "{}: mapping names {remote}, which is not a synced attribute",
                self.object_type
            )));
        }

        let mut columns = BTreeSet::new();
        for remote in &self.synced_attributes {
            let local = self.local_name(remote);
            if !columns.insert(local) {
                return Err(SyncError::Config(format!(
                    "{}: local column {local} is mapped more than once",
                    self.object_type
                )));
            }
        }

        Ok(())
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Synced record types.
    pub record_types: Vec<RecordTypeConfig>,
    /// Global switch for outbound sync of local writes.
    pub sync_enabled: bool,
    /// Timeout handed to every remote call.
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
    /// Upper bound on how long a delete suppression entry lives.
    #[serde(with = "duration_secs")]
    pub suppression_ttl: Duration,
    /// Retry configuration for polling.
    pub retry: RetryConfig,
    /// Organization accepted in push notifications.
    pub organization_id: Option<String>,
}

impl SyncConfig {
    /// Creates a configuration with no record types.
    pub fn new() -> Self {
        Self {
            record_types: Vec::new(),
            sync_enabled: true,
            call_timeout: Duration::from_secs(30),
            suppression_ttl: Duration::from_secs(60),
            retry: RetryConfig::default(),
            organization_id: None,
        }
    }

    /// Adds a record type.
    pub fn with_record_type(mut self, record_type: RecordTypeConfig) -> Self {
        self.record_types.push(record_type);
        self
    }

    /// Sets the global sync switch.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Sets the remote call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the suppression expiry.
    pub fn with_suppression_ttl(mut self, ttl: Duration) -> Self {
        self.suppression_ttl = ttl;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the organization accepted in push notifications.
    pub fn with_organization_id(mut self, id: impl Into<String>) -> Self {
        self.organization_id = Some(id.into());
        self
    }

    /// Looks up a record type.
    pub fn record_type(&self, object_type: &str) -> Option<&RecordTypeConfig> {
        self.record_types
            .iter()
            .find(|rt| rt.object_type == object_type)
    }

    /// Validates the whole configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if let Some(id) = &self.organization_id {
            if id.chars().count() != ORGANIZATION_ID_LEN {
                return Err(SyncError::Config(format!(
                    "organization id must be {ORGANIZATION_ID_LEN} characters, got {id:?}"
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for record_type in &self.record_types {
            if !seen.insert(record_type.object_type.as_str()) {
                return Err(SyncError::Config(format!(
                    "record type {} configured twice",
                    record_type.object_type
                )));
            }
            record_type.validate()?;
        }

        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    #[allow(clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1).min(i32::MAX as u32) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            Duration::from_secs_f64(delay_secs + delay_secs * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pseudo-random fraction in `[0, 1)` taken from the clock's sub-second part.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

/// Durations as fractional seconds in configuration files.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_compare::FieldValue;

    fn lead() -> RecordTypeConfig {
        RecordTypeConfig::new("Lead")
            .with_attributes(["FirstName", "LastName", "CustomAttribute__c"])
            .with_mapping("CustomAttribute__c", "custom_attribute")
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_record_type(lead())
            .with_call_timeout(Duration::from_secs(5))
            .with_suppression_ttl(Duration::from_secs(10))
            .with_organization_id("00D000000000001AAA");

        assert!(config.sync_enabled);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.suppression_ttl, Duration::from_secs(10));
        assert!(config.record_type("Lead").is_some());
        assert!(config.record_type("Contact").is_none());
        config.validate().unwrap();
    }

    #[test]
    fn name_mapping() {
        let lead = lead();
        assert_eq!(lead.local_name("CustomAttribute__c"), "custom_attribute");
        assert_eq!(lead.local_name("FirstName"), "FirstName");
        assert_eq!(lead.remote_name("custom_attribute"), Some("CustomAttribute__c"));
        assert_eq!(lead.remote_name("FirstName"), Some("FirstName"));
        assert_eq!(lead.remote_name("CustomAttribute__c"), None);
        assert_eq!(lead.remote_name("non_sf_attribute"), None);
    }

    #[test]
    fn remote_payload_drops_unknown_columns() {
        let mut local = AttributeMap::new();
        local.insert("FirstName".into(), "Mark".into());
        local.insert("custom_attribute".into(), "322".into());
        local.insert("non_sf_attribute".into(), "unknown".into());

        let payload = lead().remote_payload(&local);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["FirstName"], FieldValue::from("Mark"));
        assert_eq!(payload["CustomAttribute__c"], FieldValue::from("322"));
    }

    #[test]
    fn map_diff_fails_fast_on_unmapped_column() {
        let mut diff = AttributeMap::new();
        diff.insert("non_sf_attribute".into(), "x".into());

        let err = lead().map_diff(&diff).unwrap_err();
        assert_eq!(
            err,
            SyncError::UnmappedAttribute {
                object_type: "Lead".into(),
                column: "non_sf_attribute".into(),
            }
        );
    }

    #[test]
    fn mapping_outside_synced_set_is_rejected() {
        let config = RecordTypeConfig::new("Lead")
            .with_attributes(["FirstName"])
            .with_mapping("Email", "email");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn duplicate_local_columns_are_rejected() {
        let config = RecordTypeConfig::new("Lead")
            .with_attributes(["FirstName", "Name"])
            .with_mapping("Name", "FirstName");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn organization_id_length() {
        let config = SyncConfig::new().with_organization_id("00D000000000001");
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn duplicate_record_types_are_rejected() {
        let config = SyncConfig::new()
            .with_record_type(lead())
            .with_record_type(lead());
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn config_from_json() {
        let json = r#"{
            "record_types": [{
                "object_type": "Lead",
                "synced_attributes": ["FirstName"],
                "operations": {"delete": false}
            }],
            "call_timeout": 2.5
        }"#;
        let config: SyncConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.call_timeout, Duration::from_millis(2500));
        assert_eq!(config.suppression_ttl, Duration::from_secs(60));

        let lead = config.record_type("Lead").unwrap();
        assert!(lead.enabled);
        assert!(lead.operations.create);
        assert!(!lead.operations.delete);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for_attempt(1), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250));
    }
}
