use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::StepLog;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// One inbound inquiry, owned by the orchestrator for the duration of a
/// single run and discarded once the run terminates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionContext {
    pub execution_id: ExecutionId,
    pub user_id: String,
    pub message_id: String,
    pub from_address: String,
    pub subject: String,
    pub body: String,
    pub started_at: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(
        user_id: impl Into<String>,
        message_id: impl Into<String>,
        from_address: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: ExecutionId::generate(),
            user_id: user_id.into(),
            message_id: message_id.into(),
            from_address: from_address.into(),
            subject: subject.into(),
            body: body.into(),
            started_at: Utc::now(),
        }
    }
}

/// Structured outcome of a run. The pipeline always returns one of these;
/// it never lets an error escape its boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub success: bool,
    pub reply: Option<String>,
    pub escalation_reason: Option<String>,
    pub audit_trail: Vec<StepLog>,
}

impl ExecutionResult {
    pub fn replied(
        execution_id: ExecutionId,
        reply: impl Into<String>,
        audit_trail: Vec<StepLog>,
    ) -> Self {
        Self {
            execution_id,
            success: true,
            reply: Some(reply.into()),
            escalation_reason: None,
            audit_trail,
        }
    }

    pub fn escalated(
        execution_id: ExecutionId,
        reason: impl Into<String>,
        audit_trail: Vec<StepLog>,
    ) -> Self {
        Self {
            execution_id,
            success: false,
            reply: None,
            escalation_reason: Some(reason.into()),
            audit_trail,
        }
    }
}
