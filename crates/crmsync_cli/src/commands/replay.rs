//! Replay command implementation.
//!
//! A scenario seeds an in-memory remote system, then runs a list of steps
//! through the sync engine: inbound deliveries, push notifications, local
//! writes through the synced repository, edits made by other remote
//! clients, injected failures and polls. Step failures are reported and do
//! not stop the replay.

use super::load_json;
use chrono::{DateTime, Utc};
use crmsync_compare::AttributeMap;
use crmsync_engine::{
    LocalId, LocalRecord, LocalStore, MemoryStore, PollScheduler, SyncConfig, SyncEngine,
    SyncError, SyncResult, SyncStats, SyncedRepository, WriteOptions,
};
use crmsync_protocol::{
    DeletionFeed, MemoryRemote, Notification, Poller, RemoteError, RemoteId, RemoteRecord,
    SystemModstamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

type Engine = SyncEngine<MemoryRemote, MemoryStore>;
type Mechanism = DeletionFeed<SystemModstamp<MemoryRemote>, MemoryRemote>;
type Scheduler = PollScheduler<Mechanism, MemoryRemote, MemoryStore>;

/// A replayable scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Engine configuration.
    pub config: SyncConfig,
    /// Records present on the remote system before the first step.
    #[serde(default)]
    pub remote: Vec<SeedRecord>,
    /// Start of the first poll window. Defaults to the remote clock's
    /// starting time.
    #[serde(default)]
    pub poll_start: Option<DateTime<Utc>>,
    /// Steps to run in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A record seeded on the remote system.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedRecord {
    /// Remote object type.
    pub object_type: String,
    /// The record.
    #[serde(flatten)]
    pub record: RemoteRecord,
}

/// Failure injected into the next remote call.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Failure {
    /// Retryable network error before the request was sent.
    Network,
    /// Call timeout.
    Timeout,
    /// Connection dropped after the request was sent.
    ConnectionLost,
}

/// One scenario step.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Deliver a remote change.
    Inbound {
        /// Remote object type.
        object_type: String,
        /// The changed record.
        record: RemoteRecord,
        /// Null synced attributes absent from the record.
        #[serde(default)]
        emit_blanks: bool,
    },
    /// Deliver a remote delete.
    InboundDelete {
        /// Remote object type.
        object_type: String,
        /// Deleted record.
        id: RemoteId,
    },
    /// Deliver a push notification.
    Notification(Notification),
    /// Create a record locally.
    Create {
        /// Remote object type.
        object_type: String,
        /// Local column values.
        attributes: AttributeMap,
        /// Write locally only.
        #[serde(default)]
        skip_sync: bool,
    },
    /// Update a local record.
    Update {
        /// Remote object type.
        object_type: String,
        /// Local record.
        local_id: LocalId,
        /// Local column values.
        changes: AttributeMap,
        /// Write locally only.
        #[serde(default)]
        skip_sync: bool,
    },
    /// Delete a local record.
    Delete {
        /// Remote object type.
        object_type: String,
        /// Local record.
        local_id: LocalId,
        /// Write locally only.
        #[serde(default)]
        skip_sync: bool,
    },
    /// Edit a record as another remote client would.
    RemoteModify {
        /// Remote object type.
        object_type: String,
        /// Edited record.
        id: RemoteId,
        /// Remote attribute values.
        attributes: AttributeMap,
    },
    /// Delete a record as another remote client would.
    RemoteDelete {
        /// Remote object type.
        object_type: String,
        /// Deleted record.
        id: RemoteId,
    },
    /// Fail the next remote call.
    FailNext {
        /// Kind of failure.
        error: Failure,
    },
    /// Create the next record remotely but lose the acknowledgment.
    LoseNextCreateAck,
    /// Poll one object type up to the remote clock's current time.
    Poll {
        /// Remote object type.
        object_type: String,
    },
}

impl Step {
    /// Short name of the step kind.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Inbound { .. } => "inbound",
            Step::InboundDelete { .. } => "inbound_delete",
            Step::Notification(_) => "notification",
            Step::Create { .. } => "create",
            Step::Update { .. } => "update",
            Step::Delete { .. } => "delete",
            Step::RemoteModify { .. } => "remote_modify",
            Step::RemoteDelete { .. } => "remote_delete",
            Step::FailNext { .. } => "fail_next",
            Step::LoseNextCreateAck => "lose_next_create_ack",
            Step::Poll { .. } => "poll",
        }
    }
}

/// What one step did.
#[derive(Debug, Serialize)]
pub struct StepReport {
    /// Position in the scenario, starting at 1.
    pub index: usize,
    /// Step kind.
    pub op: &'static str,
    /// Outcome on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a replay.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    /// Per-step results.
    pub steps: Vec<StepReport>,
    /// Final local records per object type.
    pub local: BTreeMap<String, Vec<LocalRecord>>,
    /// Final remote records per object type.
    pub remote: BTreeMap<String, Vec<RemoteRecord>>,
    /// Engine statistics.
    pub stats: SyncStats,
}

struct Replay {
    engine: Arc<Engine>,
    remote: Arc<MemoryRemote>,
    store: Arc<MemoryStore>,
    schedulers: HashMap<String, Scheduler>,
    poll_start: DateTime<Utc>,
}

impl Replay {
    fn new(scenario: &Scenario) -> SyncResult<Self> {
        let remote = Arc::new(MemoryRemote::new());
        let poll_start = scenario.poll_start.unwrap_or_else(|| remote.now());
        for seed in &scenario.remote {
            remote.seed(&seed.object_type, seed.record.clone());
        }
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(
            scenario.config.clone(),
            Arc::clone(&remote),
            Arc::clone(&store),
        )?;

        Ok(Self {
            engine: Arc::new(engine),
            remote,
            store,
            schedulers: HashMap::new(),
            poll_start,
        })
    }

    fn repository(&self, object_type: &str) -> SyncResult<SyncedRepository<MemoryRemote, MemoryStore>> {
        SyncedRepository::new(Arc::clone(&self.engine), object_type)
    }

    fn run(&mut self, step: &Step) -> SyncResult<String> {
        let options = |skip_sync: bool| WriteOptions { skip_sync };

        match step {
            Step::Inbound {
                object_type,
                record,
                emit_blanks,
            } => {
                let outcome = self
                    .engine
                    .apply_inbound_record(object_type, record, *emit_blanks)?;
                Ok(format!("{outcome:?}"))
            }
            Step::InboundDelete { object_type, id } => {
                let outcome = self.engine.apply_inbound_delete(object_type, id)?;
                Ok(format!("{outcome:?}"))
            }
            Step::Notification(notification) => {
                let outcomes = self.engine.handle_notification(notification)?;
                Ok(format!("{outcomes:?}"))
            }
            Step::Create {
                object_type,
                attributes,
                skip_sync,
            } => {
                let record = self
                    .repository(object_type)?
                    .create(attributes.clone(), options(*skip_sync))?;
                Ok(describe(&record))
            }
            Step::Update {
                object_type,
                local_id,
                changes,
                skip_sync,
            } => {
                let record = self.repository(object_type)?.update(
                    *local_id,
                    changes.clone(),
                    options(*skip_sync),
                )?;
                Ok(describe(&record))
            }
            Step::Delete {
                object_type,
                local_id,
                skip_sync,
            } => {
                self.repository(object_type)?
                    .delete(*local_id, options(*skip_sync))?;
                Ok(format!("deleted {local_id}"))
            }
            Step::RemoteModify {
                object_type,
                id,
                attributes,
            } => match self.remote.modify(object_type, id, attributes.clone()) {
                Some(modified_at) => Ok(format!("{id} modified at {modified_at}")),
                None => Err(SyncError::Remote(RemoteError::InvalidRequest(format!(
                    "no {object_type} record {id}"
                )))),
            },
            Step::RemoteDelete { object_type, id } => match self.remote.remove(object_type, id) {
                Some(_) => Ok(format!("{id} removed")),
                None => Err(SyncError::Remote(RemoteError::InvalidRequest(format!(
                    "no {object_type} record {id}"
                )))),
            },
            Step::FailNext { error } => {
                let timeout = self.engine.config().call_timeout;
                self.remote.fail_next(match error {
                    Failure::Network => RemoteError::network_retryable("injected"),
                    Failure::Timeout => RemoteError::Timeout(timeout),
                    Failure::ConnectionLost => RemoteError::ConnectionLost("injected".into()),
                });
                Ok(format!("next call fails with {error:?}"))
            }
            Step::LoseNextCreateAck => {
                self.remote.lose_next_create_ack();
                Ok("next create acknowledgment lost".to_string())
            }
            Step::Poll { object_type } => {
                let end = self.remote.now();
                let report = self.scheduler(object_type)?.poll_once(end)?;
                Ok(format!(
                    "[{}, {}] created={} updated={} unchanged={} stale={} deleted={} skipped_deletes={} vanished={}",
                    report.window.start(),
                    report.window.end(),
                    report.created,
                    report.updated,
                    report.unchanged,
                    report.stale,
                    report.deleted,
                    report.skipped_deletes,
                    report.vanished
                ))
            }
        }
    }

    fn scheduler(&mut self, object_type: &str) -> SyncResult<&Scheduler> {
        if !self.schedulers.contains_key(object_type) {
            let mechanism = DeletionFeed::new(
                SystemModstamp::new(Arc::clone(&self.remote)),
                Arc::clone(&self.remote),
            );
            let scheduler = PollScheduler::new(
                Arc::clone(&self.engine),
                Poller::new(mechanism),
                object_type,
                self.poll_start,
            )?;
            self.schedulers.insert(object_type.to_string(), scheduler);
        }
        self.schedulers
            .get(object_type)
            .ok_or_else(|| SyncError::UnknownObjectType(object_type.to_string()))
    }

    fn finish(self, steps: Vec<StepReport>) -> SyncResult<ReplayReport> {
        let mut local = BTreeMap::new();
        let mut remote = BTreeMap::new();
        for record_type in &self.engine.config().record_types {
            let object_type = record_type.object_type.clone();
            local.insert(object_type.clone(), self.store.list(&object_type)?);
            remote.insert(object_type.clone(), self.remote.records(&object_type));
        }

        Ok(ReplayReport {
            steps,
            local,
            remote,
            stats: self.engine.stats(),
        })
    }
}

fn describe(record: &LocalRecord) -> String {
    match &record.remote_id {
        Some(remote_id) => format!("local {} linked to {remote_id}", record.id),
        None => format!("local {} (not linked)", record.id),
    }
}

/// Replays a scenario.
pub fn replay(scenario: &Scenario) -> SyncResult<ReplayReport> {
    let mut replay = Replay::new(scenario)?;
    let mut steps = Vec::with_capacity(scenario.steps.len());

    for (i, step) in scenario.steps.iter().enumerate() {
        let index = i + 1;
        let span = tracing::debug_span!("step", index, op = step.name());
        let _entered = span.enter();

        let report = match replay.run(step) {
            Ok(outcome) => StepReport {
                index,
                op: step.name(),
                outcome: Some(outcome),
                error: None,
            },
            Err(err) => {
                tracing::warn!(error = %err, "step failed");
                StepReport {
                    index,
                    op: step.name(),
                    outcome: None,
                    error: Some(err.to_string()),
                }
            }
        };
        steps.push(report);
    }

    replay.finish(steps)
}

/// Runs the replay command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let scenario: Scenario = load_json(path)?;
    let report = replay(&scenario)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            print_text_output(&report);
        }
    }

    Ok(())
}

fn print_text_output(report: &ReplayReport) {
    println!("Steps:");
    for step in &report.steps {
        match (&step.outcome, &step.error) {
            (_, Some(error)) => println!("  {:>3}. {:<20} ERROR {}", step.index, step.op, error),
            (Some(outcome), None) => println!("  {:>3}. {:<20} {}", step.index, step.op, outcome),
            (None, None) => println!("  {:>3}. {}", step.index, step.op),
        }
    }

    for (object_type, records) in &report.local {
        println!();
        println!("Local {object_type} ({} records):", records.len());
        for record in records {
            let remote_id = record
                .remote_id
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            let checkpoint = record
                .checkpoint
                .map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339());
            println!("  [{}] remote={remote_id} checkpoint={checkpoint}", record.id);
            for (column, value) in &record.attributes {
                println!("      {column} = {value}");
            }
        }
    }

    for (object_type, records) in &report.remote {
        println!();
        println!("Remote {object_type} ({} records)", records.len());
    }

    let stats = &report.stats;
    println!();
    println!("Stats:");
    println!(
        "  inbound:  created={} updated={} unchanged={} stale={} deleted={} suppressed={}",
        stats.inbound_created,
        stats.inbound_updated,
        stats.inbound_unchanged,
        stats.inbound_stale,
        stats.inbound_deleted,
        stats.suppressed_deletes
    );
    println!(
        "  outbound: created={} updated={} deleted={} unknown={}",
        stats.outbound_created, stats.outbound_updated, stats.outbound_deleted, stats.unknown_outcomes
    );
}
