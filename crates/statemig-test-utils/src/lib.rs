//! Testing utilities for the statemig workspace
//!
//! Oracles, ledgers and backends with scripted behavior, plus state
//! fixtures.

#![allow(missing_docs)]

use parking_lot::Mutex;
use statemig_history::{HistoryError, HistoryLedger, HistoryRecord};
use statemig_plan::{ChangeKind, DiffOracle, OracleError, PlanResult};
use statemig_state::{
    DeploymentId, LockHandle, MemoryBackend, ResourceAddress, ResourceRecord, StateBackend,
    StateError, StateSnapshot,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub const AWS: &str = "provider[\"registry.terraform.io/hashicorp/aws\"]";

pub fn address(s: &str) -> ResourceAddress {
    s.parse().unwrap()
}

pub fn aws_record(id: &str) -> ResourceRecord {
    ResourceRecord::imported(AWS, id)
}

/// State with one database module and a web instance
pub fn split_db_state() -> StateSnapshot {
    StateSnapshot::with_lineage("3f1c2a9e-split-db")
        .with_serial(7)
        .with_resource(address("module.db.aws_db_instance.main"), aws_record("db-main"))
        .with_resource(address("module.db.aws_db_subnet_group.main"), aws_record("sg-db"))
        .with_resource(address("aws_instance.web"), aws_record("i-web"))
}

/// Live infrastructure after `module.db` was renamed to `module.db_primary`
pub fn split_db_inventory() -> InventoryOracle {
    InventoryOracle::new()
        .with_resource("module.db_primary.aws_db_instance.main", "db-main")
        .with_resource("module.db_primary.aws_db_subnet_group.main", "sg-db")
        .with_resource("aws_instance.web", "i-web")
}

/// Oracle that diffs state against a declared inventory
///
/// A declared address missing from state is a create, one with another
/// `id` is an update, and a state address not declared is a destroy.
#[derive(Debug, Default)]
pub struct InventoryOracle {
    declared: BTreeMap<String, String>,
    calls: AtomicUsize,
}

impl InventoryOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, address: &str, id: &str) -> Self {
        self.declared.insert(address.to_string(), id.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DiffOracle for InventoryOracle {
    async fn diff(&self, state: &StateSnapshot) -> Result<PlanResult, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut plan = PlanResult::new();
        for (address, record) in state.resources() {
            let key = address.to_string();
            let kind = match self.declared.get(&key) {
                Some(id) if record.id() == Some(id.as_str()) => ChangeKind::NoChange,
                Some(_) => ChangeKind::Update,
                None => ChangeKind::Destroy,
            };
            plan.insert(key, kind);
        }
        for address in self.declared.keys() {
            if !plan.changes().contains_key(address) {
                plan.insert(address.clone(), ChangeKind::Create);
            }
        }
        Ok(plan)
    }

    fn name(&self) -> &'static str {
        "inventory"
    }
}

/// Oracle returning the same plan every call and keeping the last state
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    plan: PlanResult,
    last_state: Mutex<Option<StateSnapshot>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn returning(plan: PlanResult) -> Self {
        Self {
            plan,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_state(&self) -> Option<StateSnapshot> {
        self.last_state.lock().clone()
    }
}

#[async_trait::async_trait]
impl DiffOracle for ScriptedOracle {
    async fn diff(&self, state: &StateSnapshot) -> Result<PlanResult, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_state.lock() = Some(state.clone());
        Ok(self.plan.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Oracle that blocks inside `diff` until released
///
/// Lets a test hold a run at the check, lock taken, while it starts a
/// second run.
#[derive(Debug, Default)]
pub struct GatedOracle {
    entered: Notify,
    gate: Notify,
}

impl GatedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a run is inside `diff`
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the blocked run continue
    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait::async_trait]
impl DiffOracle for GatedOracle {
    async fn diff(&self, _state: &StateSnapshot) -> Result<PlanResult, OracleError> {
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(PlanResult::new())
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

/// Ledger whose appends always fail
#[derive(Debug, Default)]
pub struct FailingLedger;

#[async_trait::async_trait]
impl HistoryLedger for FailingLedger {
    async fn records(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        Ok(Vec::new())
    }

    async fn record(&self, _record: HistoryRecord) -> Result<(), HistoryError> {
        Err(HistoryError::Unavailable("ledger is read-only".to_string()))
    }
}

/// Per-operation call counts of a [`RecordingBackend`]
#[derive(Debug, Default)]
pub struct BackendCalls {
    pub locks: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub releases: AtomicUsize,
}

/// In-memory backend that counts calls
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    calls: Arc<BackendCalls>,
}

impl RecordingBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            calls: Arc::default(),
        }
    }

    pub fn inner(&self) -> &MemoryBackend {
        &self.inner
    }

    pub fn locks(&self) -> usize {
        self.calls.locks.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.calls.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.calls.writes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.calls.releases.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StateBackend for RecordingBackend {
    async fn acquire_lock(&self, deployment: &DeploymentId) -> Result<LockHandle, StateError> {
        self.calls.locks.fetch_add(1, Ordering::SeqCst);
        self.inner.acquire_lock(deployment).await
    }

    async fn read(&self, deployment: &DeploymentId) -> Result<StateSnapshot, StateError> {
        self.calls.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(deployment).await
    }

    async fn write(
        &self,
        deployment: &DeploymentId,
        snapshot: &StateSnapshot,
        expected_serial: u64,
    ) -> Result<u64, StateError> {
        self.calls.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(deployment, snapshot, expected_serial).await
    }

    async fn release_lock(&self, handle: LockHandle) -> Result<(), StateError> {
        self.calls.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release_lock(handle).await
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
