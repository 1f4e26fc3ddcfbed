//! In-memory store implementations for tests and local experimentation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use shipshape_core::audit::StepLog;
use shipshape_core::domain::approval::{ApprovalItemId, ApprovalQueueItem, ApprovalStatus};
use shipshape_core::domain::execution::ExecutionId;
use shipshape_core::domain::rules::{AgentRule, AgentType};
use shipshape_core::stores::{
    AgentRuleStore, ApprovalQueueStore, AuditLogStore, MetricsStore, PersistedRun, RunOutcome,
    RunStore, StoreError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRunStore {
    runs: Arc<Mutex<Vec<PersistedRun>>>,
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn insert_run(&self, run: PersistedRun) -> Result<(), StoreError> {
        let mut runs = lock(&self.runs);
        if runs.iter().any(|r| r.user_id == run.user_id && r.message_id == run.message_id) {
            return Err(StoreError::Conflict(format!(
                "run already recorded for user {} message {}",
                run.user_id, run.message_id
            )));
        }
        runs.push(run);
        Ok(())
    }

    async fn find_run(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<PersistedRun>, StoreError> {
        let runs = lock(&self.runs);
        Ok(runs.iter().find(|r| r.user_id == user_id && r.message_id == message_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryAuditLogStore {
    logs: Arc<Mutex<Vec<StepLog>>>,
}

impl InMemoryAuditLogStore {
    pub fn all(&self) -> Vec<StepLog> {
        lock(&self.logs).clone()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append(&self, log: StepLog) -> Result<(), StoreError> {
        lock(&self.logs).push(log);
        Ok(())
    }

    async fn trail_for(&self, execution_id: &ExecutionId) -> Result<Vec<StepLog>, StoreError> {
        let mut trail: Vec<StepLog> = lock(&self.logs)
            .iter()
            .filter(|log| &log.execution_id == execution_id)
            .cloned()
            .collect();
        trail.sort_by_key(|log| log.ordinal);
        Ok(trail)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryApprovalQueueStore {
    items: Arc<Mutex<HashMap<String, ApprovalQueueItem>>>,
}

impl InMemoryApprovalQueueStore {
    pub fn all(&self) -> Vec<ApprovalQueueItem> {
        lock(&self.items).values().cloned().collect()
    }
}

#[async_trait]
impl ApprovalQueueStore for InMemoryApprovalQueueStore {
    async fn create(&self, item: ApprovalQueueItem) -> Result<(), StoreError> {
        let mut items = lock(&self.items);
        if items.contains_key(&item.id.0) {
            return Err(StoreError::Conflict(format!("approval item {} exists", item.id.0)));
        }
        items.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn get(&self, id: &ApprovalItemId) -> Result<Option<ApprovalQueueItem>, StoreError> {
        Ok(lock(&self.items).get(&id.0).cloned())
    }

    async fn update_review(
        &self,
        id: &ApprovalItemId,
        status: ApprovalStatus,
        reviewer: &str,
    ) -> Result<(), StoreError> {
        let mut items = lock(&self.items);
        let item = items
            .get_mut(&id.0)
            .ok_or_else(|| StoreError::Conflict(format!("no approval item with id {}", id.0)))?;
        item.status = status;
        item.reviewer = Some(reviewer.to_string());
        item.reviewed_at = Some(chrono::Utc::now());
        item.updated_at = chrono::Utc::now();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRuleStore {
    rules: Arc<Mutex<HashMap<(String, AgentType), AgentRule>>>,
}

impl InMemoryRuleStore {
    pub fn with_rule(rule: AgentRule) -> Self {
        let store = Self::default();
        lock(&store.rules).insert((rule.user_id.clone(), rule.agent_type), rule);
        store
    }
}

#[async_trait]
impl AgentRuleStore for InMemoryRuleStore {
    async fn get_rule(
        &self,
        user_id: &str,
        agent_type: AgentType,
    ) -> Result<Option<AgentRule>, StoreError> {
        Ok(lock(&self.rules).get(&(user_id.to_string(), agent_type)).cloned())
    }

    async fn put_rule(&self, rule: AgentRule) -> Result<(), StoreError> {
        lock(&self.rules).insert((rule.user_id.clone(), rule.agent_type), rule);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Clone, Default)]
pub struct InMemoryMetricsStore {
    counters: Arc<Mutex<HashMap<(String, AgentType), Counters>>>,
}

impl InMemoryMetricsStore {
    pub fn counters(&self, user_id: &str, agent_type: AgentType) -> Counters {
        lock(&self.counters).get(&(user_id.to_string(), agent_type)).copied().unwrap_or_default()
    }
}

#[async_trait]
impl MetricsStore for InMemoryMetricsStore {
    async fn increment(
        &self,
        user_id: &str,
        agent_type: AgentType,
        outcome: RunOutcome,
    ) -> Result<(), StoreError> {
        let mut counters = lock(&self.counters);
        let entry = counters.entry((user_id.to_string(), agent_type)).or_default();
        entry.attempts += 1;
        match outcome {
            RunOutcome::Success => entry.successes += 1,
            RunOutcome::Failure => entry.failures += 1,
        }
        Ok(())
    }
}
