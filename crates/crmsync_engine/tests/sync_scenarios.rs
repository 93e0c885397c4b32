//! End-to-end sync scenarios over in-memory collaborators.

use crmsync_compare::{AttributeMap, FieldValue};
use crmsync_engine::{
    DeleteOutcome, Direction, InboundOutcome, LocalId, LocalRecord, LocalStore, MemoryStore,
    NewRecord, OperationKind, StoreResult, SyncConfig, SyncEngine, SyncError, SyncEvent,
    SyncedRepository, WriteOptions,
};
use crmsync_protocol::{
    ApplyResponse, CallContext, CreateResponse, MemoryRemote, Notification, Predicate, RemoteApply,
    RemoteCall, RemoteError, RemoteId, RemoteQuery, RemoteRecord, RemoteResult,
};
use crmsync_testkit::prelude::*;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;

/// Remote whose deletes block until the test releases them.
struct GatedRemote {
    inner: MemoryRemote,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl RemoteQuery for GatedRemote {
    fn query(&self, object_type: &str, predicate: &Predicate) -> RemoteResult<Vec<RemoteRecord>> {
        self.inner.query(object_type, predicate)
    }
}

impl RemoteApply for GatedRemote {
    fn create(
        &self,
        object_type: &str,
        attributes: &AttributeMap,
        ctx: &CallContext,
    ) -> RemoteResult<CreateResponse> {
        self.inner.create(object_type, attributes, ctx)
    }

    fn update(
        &self,
        object_type: &str,
        id: &RemoteId,
        attributes: &AttributeMap,
        ctx: &CallContext,
    ) -> RemoteResult<ApplyResponse> {
        self.inner.update(object_type, id, attributes, ctx)
    }

    fn delete(&self, object_type: &str, id: &RemoteId, ctx: &CallContext) -> RemoteResult<ApplyResponse> {
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv();
        self.inner.delete(object_type, id, ctx)
    }
}

/// Store whose first `get` pauses after reading until the test releases it.
struct PausingStore {
    inner: MemoryStore,
    first_get: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl PausingStore {
    fn new(entered: Sender<()>, release: Receiver<()>) -> Self {
        Self {
            inner: MemoryStore::new(),
            first_get: Mutex::new(Some((entered, release))),
        }
    }
}

impl LocalStore for PausingStore {
    fn find_by_remote_id(&self, object_type: &str, remote_id: &RemoteId) -> StoreResult<Option<LocalRecord>> {
        self.inner.find_by_remote_id(object_type, remote_id)
    }

    fn get(&self, object_type: &str, id: LocalId) -> StoreResult<Option<LocalRecord>> {
        let record = self.inner.get(object_type, id);
        let gate = self.first_get.lock().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        record
    }

    fn insert(&self, object_type: &str, record: NewRecord) -> StoreResult<LocalRecord> {
        self.inner.insert(object_type, record)
    }

    fn update(&self, object_type: &str, record: &LocalRecord) -> StoreResult<()> {
        self.inner.update(object_type, record)
    }

    fn delete(&self, object_type: &str, id: LocalId) -> StoreResult<bool> {
        self.inner.delete(object_type, id)
    }

    fn list(&self, object_type: &str) -> StoreResult<Vec<LocalRecord>> {
        self.inner.list(object_type)
    }
}

/// Runs `write` on a repository over a [`PausingStore`] and applies
/// `inbound` to A001 at `at(2)` while the write sits between its first read
/// and its write.
fn race_write_with_inbound<F>(inbound: AttributeMap, write: F) -> (Arc<PausingStore>, LocalId)
where
    F: FnOnce(&SyncedRepository<MemoryRemote, PausingStore>, LocalId) + Send + 'static,
{
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(PausingStore::new(entered_tx, release_rx));
    let remote = MemoryRemote::new();
    remote.seed(LEAD, RemoteRecord::new("A001", Some(at(1))));
    let engine = Arc::new(
        SyncEngine::new(lead_config(), Arc::new(remote), Arc::clone(&store)).unwrap(),
    );
    let local = store
        .insert(
            LEAD,
            NewRecord::default()
                .with_remote_id("A001")
                .with_attribute("FirstName", "John")
                .with_attribute("LastName", "Doe")
                .with_checkpoint(at(1)),
        )
        .unwrap();

    let writing = {
        let repo = SyncedRepository::new(Arc::clone(&engine), LEAD).unwrap();
        let id = local.id;
        thread::spawn(move || write(&repo, id))
    };
    entered_rx.recv().unwrap();

    let outcome = engine
        .apply_inbound(LEAD, &"A001".into(), &inbound, at(2), false)
        .unwrap();
    assert_eq!(outcome, InboundOutcome::Updated(local.id));

    release_tx.send(()).unwrap();
    writing.join().unwrap();
    (store, local.id)
}

fn lead_payload() -> AttributeMap {
    attrs(&[
        ("FirstName", "John"),
        ("LastName", "Doe"),
        ("CustomAttribute__c", "32876"),
    ])
}

#[test]
fn inbound_creates_missing_record() {
    let sync = TestSync::new();
    let outcome = sync
        .apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(10), true)
        .unwrap();
    assert!(matches!(outcome, InboundOutcome::Created(_)));

    let lead = sync.lead("A001").unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("John"));
    assert_eq!(lead.get("LastName"), &FieldValue::from("Doe"));
    assert_eq!(lead.get("custom_attribute"), &FieldValue::from("32876"));
    assert_eq!(lead.checkpoint, Some(at(10)));
}

#[test]
fn inbound_updates_existing_record() {
    let sync = TestSync::new();
    let local = sync.import_lead(
        NewRecord::default()
            .with_remote_id("A001")
            .with_attribute("FirstName", "Arnold")
            .with_attribute("LastName", "Schwarzenegger"),
    );

    let outcome = sync
        .apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(10), true)
        .unwrap();
    assert_eq!(outcome, InboundOutcome::Updated(local.id));
    assert_eq!(sync.store.count(LEAD), 1);

    let lead = sync.lead("A001").unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("John"));
    assert_eq!(lead.get("LastName"), &FieldValue::from("Doe"));
}

#[test]
fn inbound_at_checkpoint_changes_nothing_and_notifies_nobody() {
    let sync = TestSync::new();
    sync.import_lead(
        NewRecord::default()
            .with_remote_id("A001")
            .with_attribute("FirstName", "Jack")
            .with_checkpoint(at(10)),
    );

    let outcome = sync
        .apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(10), true)
        .unwrap();
    assert!(matches!(outcome, InboundOutcome::Stale(_)));
    assert_eq!(sync.lead("A001").unwrap().get("FirstName"), &FieldValue::from("Jack"));
    assert!(sync.observer.events().is_empty());
}

#[test]
fn reapplying_the_same_payload_is_stale() {
    let sync = TestSync::new();
    sync.apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(10), true)
        .unwrap();
    let before = sync.lead("A001").unwrap();

    let outcome = sync
        .apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(10), true)
        .unwrap();
    assert!(matches!(outcome, InboundOutcome::Stale(_)));
    assert_eq!(sync.lead("A001").unwrap(), before);
    assert_eq!(sync.observer.events().len(), 1);
}

#[test]
fn reverse_ordered_deliveries_keep_newest_state() {
    let sync = TestSync::new();
    let newer = attrs(&[("FirstName", "Newer")]);
    let older = attrs(&[("FirstName", "Older")]);

    sync.apply_inbound(LEAD, &"A001".into(), &newer, at(20), false)
        .unwrap();
    let outcome = sync
        .apply_inbound(LEAD, &"A001".into(), &older, at(10), false)
        .unwrap();

    assert!(matches!(outcome, InboundOutcome::Stale(_)));
    let lead = sync.lead("A001").unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("Newer"));
    assert_eq!(lead.checkpoint, Some(at(20)));
}

#[test]
fn emit_blanks_nulls_missing_attributes() {
    let sync = TestSync::new();
    sync.import_lead(
        NewRecord::default()
            .with_remote_id("A001")
            .with_attribute("FirstName", "Jane")
            .with_attribute("LastName", "Doe"),
    );

    sync.apply_inbound(LEAD, &"A001".into(), &attrs(&[("FirstName", "John")]), at(5), true)
        .unwrap();

    let lead = sync.lead("A001").unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("John"));
    assert_eq!(lead.get("LastName"), &FieldValue::Null);
}

#[test]
fn partial_update_keeps_missing_attributes() {
    let sync = TestSync::new();
    sync.import_lead(
        NewRecord::default()
            .with_remote_id("A001")
            .with_attribute("FirstName", "John"),
    );

    sync.apply_inbound(LEAD, &"A001".into(), &Default::default(), at(5), false)
        .unwrap();
    assert_eq!(sync.lead("A001").unwrap().get("FirstName"), &FieldValue::from("John"));
}

#[test]
fn inbound_never_calls_the_remote() {
    let sync = TestSync::new();
    sync.apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(1), true)
        .unwrap();
    sync.apply_inbound(LEAD, &"A001".into(), &attrs(&[("FirstName", "X")]), at(2), false)
        .unwrap();
    sync.apply_inbound_delete(LEAD, &"A001".into()).unwrap();
    assert!(sync.remote.calls().is_empty());
}

#[test]
fn inbound_delete_removes_record_without_outbound_delete() {
    let sync = TestSync::new();
    sync.import_lead(NewRecord::default().with_remote_id("A001"));

    let outcome = sync.apply_inbound_delete(LEAD, &"A001".into()).unwrap();
    assert!(matches!(outcome, DeleteOutcome::Deleted(_)));
    assert_eq!(sync.store.count(LEAD), 0);
    assert!(sync.remote.calls().is_empty());

    assert_eq!(
        sync.apply_inbound_delete(LEAD, &"A001".into()).unwrap(),
        DeleteOutcome::NotFound
    );
}

#[test]
fn outbound_create_posts_mapped_synced_attributes() {
    let remote = MemoryRemote::new().with_id_prefix("A");
    remote
        .create("Scratch", &AttributeMap::new(), &CallContext::default())
        .unwrap();
    let sync = TestSync::with_remote(lead_config(), remote);
    sync.remote.clear_calls();

    let mut local = attrs(&[("FirstName", "Mark"), ("custom_attribute", "322")]);
    local.insert("non_sf_attribute".into(), "unknown".into());
    let created = sync.leads().create(local, WriteOptions::default()).unwrap();

    assert_eq!(created.remote_id, Some(RemoteId::new("A002")));
    assert_eq!(created.get("non_sf_attribute"), &FieldValue::from("unknown"));

    let calls = sync.remote.calls();
    let RemoteCall::Create { attributes, .. } = &calls[0] else {
        panic!("expected create, got {calls:?}");
    };
    assert_eq!(
        attributes,
        &attrs(&[("FirstName", "Mark"), ("CustomAttribute__c", "322")])
    );
}

#[test]
fn outbound_create_response_id_is_stored() {
    let sync = TestSync::with_remote(lead_config(), MemoryRemote::new().with_id_prefix("A"));
    let created = sync
        .outbound_create(LEAD, attrs(&[("FirstName", "John")]))
        .unwrap();

    let remote_id = created.remote_id.clone().unwrap();
    let stored = sync.lead(remote_id.as_str()).unwrap();
    assert_eq!(stored.id, created.id);

    let remote_record = sync.remote.record(LEAD, &remote_id).unwrap();
    assert_eq!(stored.checkpoint, remote_record.modified_at);
}

#[test]
fn outbound_update_echo_does_not_alter_local_state() {
    let sync = TestSync::new();
    let created = sync
        .leads()
        .create(attrs(&[("FirstName", "Mark")]), WriteOptions::default())
        .unwrap();
    let remote_id = created.remote_id.clone().unwrap();

    let updated = sync
        .leads()
        .set(created.id, "FirstName", "John", WriteOptions::default())
        .unwrap();
    let remote_record = sync.remote.record(LEAD, &remote_id).unwrap();
    assert_eq!(updated.checkpoint, remote_record.modified_at);
    sync.observer.clear();

    // The echo carries exactly the stored modification time.
    let outcome = sync
        .apply_inbound_record(LEAD, &remote_record, true)
        .unwrap();
    assert!(matches!(outcome, InboundOutcome::Stale(_)));

    // An older delivery is stale as well.
    let mut older = remote_record.clone();
    older.modified_at = Some(at(-100));
    older.attributes.insert("FirstName".into(), "Ancient".into());
    sync.apply_inbound_record(LEAD, &older, true).unwrap();

    assert_eq!(sync.lead(remote_id.as_str()).unwrap(), updated);
    assert!(sync.observer.events().is_empty());
}

#[test]
fn outbound_update_prefers_modstamp_from_response() {
    let sync = TestSync::with_remote(lead_config(), MemoryRemote::new().with_modstamp_in_responses(true));
    let created = sync
        .outbound_create(LEAD, attrs(&[("FirstName", "Mark")]))
        .unwrap();
    sync.remote.clear_calls();

    sync.outbound_update(LEAD, created.id, &attrs(&[("FirstName", "John")]))
        .unwrap();
    let calls = sync.remote.calls();
    assert_eq!(calls.len(), 1, "no modstamp fetch expected: {calls:?}");
}

#[test]
fn outbound_update_of_unmapped_column_fails_fast() {
    let sync = TestSync::new();
    let created = sync
        .outbound_create(LEAD, attrs(&[("FirstName", "Mark")]))
        .unwrap();
    sync.remote.clear_calls();

    let err = sync
        .outbound_update(LEAD, created.id, &attrs(&[("non_sf_attribute", "x")]))
        .unwrap_err();
    assert!(matches!(err, SyncError::UnmappedAttribute { .. }));
    assert!(sync.remote.calls().is_empty());
}

#[test]
fn outbound_delete_suppresses_its_echo() {
    let sync = TestSync::new();
    let created = sync
        .outbound_create(LEAD, attrs(&[("FirstName", "Mark")]))
        .unwrap();
    let remote_id = created.remote_id.clone().unwrap();

    sync.outbound_delete(LEAD, created.id).unwrap();
    assert!(sync.lead(remote_id.as_str()).is_none());
    assert!(sync.remote.record(LEAD, &remote_id).is_none());
    assert!(!sync.is_suppressed(LEAD, &remote_id));

    // The echo arrives after the delete completed: nothing left to do.
    assert_eq!(
        sync.apply_inbound_delete(LEAD, &remote_id).unwrap(),
        DeleteOutcome::NotFound
    );
}

#[test]
fn inbound_delete_during_outbound_delete_is_suppressed() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let remote = Arc::new(GatedRemote {
        inner: MemoryRemote::new(),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(
        SyncEngine::new(lead_config(), Arc::clone(&remote), Arc::clone(&store)).unwrap(),
    );
    let local = store
        .insert(LEAD, NewRecord::default().with_remote_id("A001"))
        .unwrap();
    let remote_id = RemoteId::new("A001");

    let deleting = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.outbound_delete(LEAD, local.id))
    };
    entered_rx.recv().unwrap();

    assert!(engine.is_suppressed(LEAD, &remote_id));
    assert_eq!(
        engine.apply_inbound_delete(LEAD, &remote_id).unwrap(),
        DeleteOutcome::Suppressed
    );

    release_tx.send(()).unwrap();
    deleting.join().unwrap().unwrap();
    assert!(!engine.is_suppressed(LEAD, &remote_id));
    assert_eq!(store.count(LEAD), 0);
    assert_eq!(engine.stats().suppressed_deletes, 1);
}

#[test]
fn failed_outbound_delete_clears_suppression() {
    let sync = TestSync::new();
    let local = sync.import_lead(NewRecord::default().with_remote_id("A001"));
    sync.remote
        .fail_next(RemoteError::ConnectionLost("reset".into()));

    let err = sync.outbound_delete(LEAD, local.id).unwrap_err();
    assert!(err.is_unknown_outcome());
    assert!(sync.lead("A001").is_some());
    assert!(!sync.is_suppressed(LEAD, &"A001".into()));

    assert!(matches!(
        sync.apply_inbound_delete(LEAD, &"A001".into()).unwrap(),
        DeleteOutcome::Deleted(_)
    ));
}

#[test]
fn outbound_create_timeout_reports_idempotency_key() {
    let sync = TestSync::new();
    sync.remote.lose_next_create_ack();

    let err = sync
        .outbound_create(LEAD, attrs(&[("FirstName", "Mark")]))
        .unwrap_err();
    let SyncError::UnknownOutcome {
        idempotency_key: Some(key),
        ..
    } = err
    else {
        panic!("expected unknown outcome, got {err:?}");
    };
    assert_eq!(sync.store.count(LEAD), 0);
    assert_eq!(sync.remote.count(LEAD), 1);

    // Retrying with the same key does not duplicate the remote record.
    let created = sync
        .outbound_create_with_key(LEAD, attrs(&[("FirstName", "Mark")]), key)
        .unwrap();
    assert_eq!(sync.remote.count(LEAD), 1);
    assert!(created.remote_id.is_some());
}

#[test]
fn outbound_failure_leaves_local_state_untouched() {
    let sync = TestSync::new();
    sync.remote
        .fail_next(RemoteError::network_retryable("connection refused"));

    let err = sync
        .leads()
        .create(attrs(&[("FirstName", "Mark")]), WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));
    assert!(err.is_retryable());
    assert_eq!(sync.store.count(LEAD), 0);
}

#[test]
fn observer_sees_applied_changes_only() {
    let sync = TestSync::new();
    sync.apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(1), true)
        .unwrap();
    sync.apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(2), true)
        .unwrap();
    let created = sync
        .outbound_create(LEAD, attrs(&[("FirstName", "Mark")]))
        .unwrap();
    sync.outbound_delete(LEAD, created.id).unwrap();

    let events: Vec<_> = sync
        .observer
        .events()
        .into_iter()
        .map(|event| (event.direction, event.operation))
        .collect();
    assert_eq!(
        events,
        vec![
            (Direction::Inbound, OperationKind::Create),
            (Direction::Outbound, OperationKind::Create),
            (Direction::Outbound, OperationKind::Delete),
        ]
    );
}

#[test]
fn notification_applies_partial_updates() {
    let sync = TestSync::new();
    sync.import_lead(
        NewRecord::default()
            .with_remote_id("A001")
            .with_attribute("FirstName", "Jane")
            .with_attribute("LastName", "Doe"),
    );

    let notification = Notification {
        organization_id: ORGANIZATION_ID.to_string(),
        object_type: LEAD.to_string(),
        records: vec![
            RemoteRecord::new("A001", Some(at(5))).with_attribute("FirstName", "John"),
            RemoteRecord::new("A002", Some(at(5))).with_attribute("LastName", "Roe"),
        ],
    };
    let outcomes = sync.handle_notification(&notification).unwrap();
    assert!(matches!(outcomes[0], InboundOutcome::Updated(_)));
    assert!(matches!(outcomes[1], InboundOutcome::Created(_)));

    let lead = sync.lead("A001").unwrap();
    assert_eq!(lead.get("LastName"), &FieldValue::from("Doe"));
}

#[test]
fn notification_from_other_organization_is_rejected() {
    let sync = TestSync::new();
    let notification = Notification {
        organization_id: "00D000000000002BBB".to_string(),
        object_type: LEAD.to_string(),
        records: vec![RemoteRecord::new("A001", Some(at(5)))],
    };

    let err = sync.handle_notification(&notification).unwrap_err();
    assert!(matches!(err, SyncError::InvalidOrganization(_)));
    assert_eq!(sync.store.count(LEAD), 0);
}

#[test]
fn notification_without_modification_time_fails() {
    let sync = TestSync::with_config(SyncConfig::new().with_record_type(lead_record_type()));
    let notification = Notification {
        organization_id: "anything".to_string(),
        object_type: LEAD.to_string(),
        records: vec![RemoteRecord::new("A001", None)],
    };
    assert!(matches!(
        sync.handle_notification(&notification),
        Err(SyncError::MissingModificationTime { .. })
    ));
}

#[test]
fn concurrent_deliveries_for_one_record_converge() {
    let sync = TestSync::new();
    let handles: Vec<_> = (1..=16)
        .map(|i| {
            let engine = Arc::clone(&sync.engine);
            thread::spawn(move || {
                let name = format!("v{i}");
                let payload = attrs(&[("FirstName", name.as_str())]);
                engine
                    .apply_inbound(LEAD, &"A001".into(), &payload, at(i), false)
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let lead = sync.lead("A001").unwrap();
    assert_eq!(sync.store.count(LEAD), 1);
    assert_eq!(lead.checkpoint, Some(at(16)));
    assert_eq!(lead.get("FirstName"), &FieldValue::from("v16"));
}

#[test]
fn local_only_write_keeps_concurrent_inbound_change() {
    let (store, id) = race_write_with_inbound(attrs(&[("FirstName", "Jane")]), |repo, id| {
        repo.set(id, "notes", "called", WriteOptions::skip_sync())
            .unwrap();
    });

    let lead = store.get(LEAD, id).unwrap().unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("Jane"));
    assert_eq!(lead.get("notes"), &FieldValue::from("called"));
    assert_eq!(lead.checkpoint, Some(at(2)));
}

#[test]
fn synced_write_keeps_concurrent_inbound_change() {
    let (store, id) = race_write_with_inbound(attrs(&[("LastName", "Roe")]), |repo, id| {
        repo.update(
            id,
            attrs(&[("FirstName", "Mark"), ("notes", "called")]),
            WriteOptions::default(),
        )
        .unwrap();
    });

    let lead = store.get(LEAD, id).unwrap().unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("Mark"));
    assert_eq!(lead.get("LastName"), &FieldValue::from("Roe"));
    assert_eq!(lead.get("notes"), &FieldValue::from("called"));
    assert!(lead.checkpoint >= Some(at(2)));
}

#[test]
fn observer_may_apply_to_the_record_it_was_told_about() {
    let sync = TestSync::new();
    let engine: Arc<OnceLock<Weak<MemoryEngine>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let engine = Arc::clone(&engine);
        let seen = Arc::clone(&seen);
        sync.set_observer(Arc::new(move |event: &SyncEvent| {
            seen.lock().push(event.operation);
            if event.operation != OperationKind::Create {
                return;
            }
            if let Some(engine) = engine.get().and_then(Weak::upgrade) {
                let follow_up = attrs(&[("LastName", "Roe")]);
                engine
                    .apply_inbound(&event.object_type, &event.remote_id, &follow_up, at(2), false)
                    .unwrap();
            }
        }));
    }
    engine.set(Arc::downgrade(&sync.engine)).unwrap();

    sync.apply_inbound(LEAD, &"A001".into(), &lead_payload(), at(1), true)
        .unwrap();

    let lead = sync.lead("A001").unwrap();
    assert_eq!(lead.get("FirstName"), &FieldValue::from("John"));
    assert_eq!(lead.get("LastName"), &FieldValue::from("Roe"));
    assert_eq!(lead.checkpoint, Some(at(2)));
    assert_eq!(*seen.lock(), vec![OperationKind::Create, OperationKind::Update]);
}
