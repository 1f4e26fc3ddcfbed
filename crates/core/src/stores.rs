//! Port traits for the durable stores the pipeline writes to.
//!
//! Implementations live in `shipshape-db`; tests substitute in-memory
//! doubles. All ports share one error type so callers stay storage-agnostic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::StepLog;
use crate::domain::approval::{ApprovalItemId, ApprovalQueueItem, ApprovalStatus};
use crate::domain::execution::ExecutionId;
use crate::domain::rules::{AgentRule, AgentType};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored value could not be decoded: {0}")]
    Decode(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    Failure,
}

/// Summary row for one completed run, keyed by `(user_id, message_id)` for
/// dedup-on-replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersistedRun {
    pub execution_id: ExecutionId,
    pub user_id: String,
    pub message_id: String,
    pub from_address: String,
    pub subject: String,
    pub success: bool,
    pub reply: Option<String>,
    pub escalation_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn insert_run(&self, run: PersistedRun) -> Result<(), StoreError>;
    async fn find_run(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<PersistedRun>, StoreError>;
}

/// Append-only audit log, keyed by execution id and step ordinal. Supports
/// concurrent writers: inserts only, no read-modify-write.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, log: StepLog) -> Result<(), StoreError>;
    async fn trail_for(&self, execution_id: &ExecutionId) -> Result<Vec<StepLog>, StoreError>;
}

#[async_trait]
pub trait ApprovalQueueStore: Send + Sync {
    async fn create(&self, item: ApprovalQueueItem) -> Result<(), StoreError>;
    async fn get(&self, id: &ApprovalItemId) -> Result<Option<ApprovalQueueItem>, StoreError>;
    async fn update_review(
        &self,
        id: &ApprovalItemId,
        status: ApprovalStatus,
        reviewer: &str,
    ) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AgentRuleStore: Send + Sync {
    async fn get_rule(
        &self,
        user_id: &str,
        agent_type: AgentType,
    ) -> Result<Option<AgentRule>, StoreError>;
    async fn put_rule(&self, rule: AgentRule) -> Result<(), StoreError>;
}

/// Advisory per-user, per-agent counters. Increments must be atomic so
/// concurrent runs never lose updates; a missed increment on crash is
/// acceptable because the audit trail stays authoritative.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    async fn increment(
        &self,
        user_id: &str,
        agent_type: AgentType,
        outcome: RunOutcome,
    ) -> Result<(), StoreError>;
}
