//! Test fixtures and engine helpers.
//!
//! Provides a `Lead` record type mirroring a typical CRM lead, and a
//! ready-made engine over in-memory collaborators.

use chrono::{DateTime, Duration, TimeZone, Utc};
use crmsync_compare::{AttributeMap, FieldValue};
use crmsync_engine::{
    LocalRecord, LocalStore, MemoryStore, NewRecord, RecordTypeConfig, SyncConfig, SyncEngine,
    SyncEvent, SyncObserver, SyncedRepository,
};
use crmsync_protocol::{MemoryRemote, RemoteId};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Object type of the lead fixture.
pub const LEAD: &str = "Lead";

/// Organization id accepted by [`lead_config`].
pub const ORGANIZATION_ID: &str = "00D000000000001AAA";

/// Engine over in-memory collaborators.
pub type MemoryEngine = SyncEngine<MemoryRemote, MemoryStore>;

/// The `Lead` record type: `FirstName`, `LastName` and
/// `CustomAttribute__c`, the latter stored locally as `custom_attribute`.
pub fn lead_record_type() -> RecordTypeConfig {
    RecordTypeConfig::new(LEAD)
        .with_attributes(["FirstName", "LastName", "CustomAttribute__c"])
        .with_mapping("CustomAttribute__c", "custom_attribute")
}

/// Configuration with the lead record type and [`ORGANIZATION_ID`].
pub fn lead_config() -> SyncConfig {
    SyncConfig::new()
        .with_record_type(lead_record_type())
        .with_organization_id(ORGANIZATION_ID)
}

/// Fixed instant `secs` seconds after 2024-01-01T00:00:00Z.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid fixture date")
        + Duration::seconds(secs)
}

/// Builds an attribute map from text pairs.
pub fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), FieldValue::from(*value)))
        .collect()
}

/// Observer that records every event.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingObserver {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded events.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    /// Forgets recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl SyncObserver for RecordingObserver {
    fn on_sync(&self, event: &SyncEvent) {
        self.events.lock().push(event.clone());
    }
}

/// An engine over in-memory collaborators with an event recorder attached.
pub struct TestSync {
    /// The engine.
    pub engine: Arc<MemoryEngine>,
    /// The in-memory remote system.
    pub remote: Arc<MemoryRemote>,
    /// The in-memory local store.
    pub store: Arc<MemoryStore>,
    /// Events emitted by the engine.
    pub observer: Arc<RecordingObserver>,
}

impl TestSync {
    /// Creates a test setup with [`lead_config`].
    pub fn new() -> Self {
        Self::with_config(lead_config())
    }

    /// Creates a test setup with a custom configuration.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::with_remote(config, MemoryRemote::new())
    }

    /// Creates a test setup around a preconfigured remote.
    pub fn with_remote(config: SyncConfig, remote: MemoryRemote) -> Self {
        let remote = Arc::new(remote);
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(config, Arc::clone(&remote), Arc::clone(&store))
            .expect("valid test configuration");
        let observer = Arc::new(RecordingObserver::new());
        engine.set_observer(observer.clone());

        Self {
            engine: Arc::new(engine),
            remote,
            store,
            observer,
        }
    }

    /// Repository for the lead record type.
    pub fn leads(&self) -> SyncedRepository<MemoryRemote, MemoryStore> {
        SyncedRepository::new(Arc::clone(&self.engine), LEAD).expect("lead record type configured")
    }

    /// Inserts a lead locally without any remote call.
    pub fn import_lead(&self, record: NewRecord) -> LocalRecord {
        self.store.insert(LEAD, record).expect("import lead")
    }

    /// Looks up a lead by remote identifier.
    pub fn lead(&self, remote_id: &str) -> Option<LocalRecord> {
        self.store
            .find_by_remote_id(LEAD, &RemoteId::new(remote_id))
            .expect("memory store lookup")
    }
}

impl Default for TestSync {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestSync {
    type Target = MemoryEngine;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// A JSON file in a temporary directory, removed on drop.
pub struct TempJson {
    _dir: TempDir,
    path: PathBuf,
}

impl TempJson {
    /// Writes `value` as JSON to a fresh temporary file.
    pub fn new<T: Serialize>(value: &T) -> Self {
        let dir = TempDir::new().expect("create temp directory");
        let path = dir.path().join("scenario.json");
        let json = serde_json::to_vec_pretty(value).expect("serialize fixture");
        std::fs::write(&path, json).expect("write fixture");
        Self { _dir: dir, path }
    }

    /// Path of the file.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_config_is_valid() {
        lead_config().validate().unwrap();
    }

    #[test]
    fn test_sync_records_events() {
        let sync = TestSync::new();
        sync.apply_inbound(LEAD, &"A001".into(), &attrs(&[("FirstName", "John")]), at(1), true)
            .unwrap();
        assert_eq!(sync.observer.events().len(), 1);
        assert!(sync.lead("A001").is_some());
    }

    #[test]
    fn temp_json_round_trip() {
        let file = TempJson::new(&serde_json::json!({"a": 1}));
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.contains("\"a\""));
    }
}
