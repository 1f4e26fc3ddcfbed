use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::rules::AgentType;
use crate::escalation::EscalationPriority;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalItemId(pub String);

impl ApprovalItemId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// A queued decision artifact awaiting human review. Immutable once created
/// except for the status/reviewer fields set by a reviewer. Carries a
/// denormalized copy of the audit trail so the reviewer has full provenance
/// without re-running the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalQueueItem {
    pub id: ApprovalItemId,
    pub user_id: String,
    pub agent_type: AgentType,
    pub customer_address: String,
    pub subject: String,
    pub proposed_reply: String,
    pub confidence_pct: u8,
    pub priority: EscalationPriority,
    pub status: ApprovalStatus,
    pub reviewer: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub audit_trail_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::ApprovalStatus;

    #[test]
    fn approval_status_round_trips_from_storage_encoding() {
        for status in
            [ApprovalStatus::Pending, ApprovalStatus::Approved, ApprovalStatus::Rejected]
        {
            assert_eq!(ApprovalStatus::parse(status.as_str()), Some(status));
        }
    }
}
