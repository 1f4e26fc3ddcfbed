use chrono::Utc;
use sqlx::Row;

use shipshape_core::domain::approval::{ApprovalItemId, ApprovalQueueItem, ApprovalStatus};
use shipshape_core::domain::rules::AgentType;
use shipshape_core::escalation::EscalationPriority;
use shipshape_core::stores::{ApprovalQueueStore, StoreError};

use super::{db_err, decode_err, parse_timestamp};
use crate::DbPool;

pub struct SqlApprovalQueueStore {
    pool: DbPool,
}

impl SqlApprovalQueueStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Pending items for operator tooling, oldest first.
    pub async fn list_pending(&self, limit: u32) -> Result<Vec<ApprovalQueueItem>, StoreError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, user_id, agent_type, customer_address, subject, proposed_reply,
                    confidence_pct, priority, status, reviewer, reviewed_at,
                    audit_trail_json, created_at, updated_at
             FROM approval_queue_item
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_item).collect()
    }
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<ApprovalQueueItem, StoreError> {
    let id: String = row.try_get("id").map_err(|e| decode_err(e.to_string()))?;
    let user_id: String = row.try_get("user_id").map_err(|e| decode_err(e.to_string()))?;
    let agent_type_str: String =
        row.try_get("agent_type").map_err(|e| decode_err(e.to_string()))?;
    let customer_address: String =
        row.try_get("customer_address").map_err(|e| decode_err(e.to_string()))?;
    let subject: String = row.try_get("subject").map_err(|e| decode_err(e.to_string()))?;
    let proposed_reply: String =
        row.try_get("proposed_reply").map_err(|e| decode_err(e.to_string()))?;
    let confidence_pct: i64 =
        row.try_get("confidence_pct").map_err(|e| decode_err(e.to_string()))?;
    let priority_str: String = row.try_get("priority").map_err(|e| decode_err(e.to_string()))?;
    let status_str: String = row.try_get("status").map_err(|e| decode_err(e.to_string()))?;
    let reviewer: Option<String> =
        row.try_get("reviewer").map_err(|e| decode_err(e.to_string()))?;
    let reviewed_at: Option<String> =
        row.try_get("reviewed_at").map_err(|e| decode_err(e.to_string()))?;
    let audit_trail_json: String =
        row.try_get("audit_trail_json").map_err(|e| decode_err(e.to_string()))?;
    let created_at: String = row.try_get("created_at").map_err(|e| decode_err(e.to_string()))?;
    let updated_at: String = row.try_get("updated_at").map_err(|e| decode_err(e.to_string()))?;

    Ok(ApprovalQueueItem {
        id: ApprovalItemId(id),
        user_id,
        agent_type: AgentType::parse(&agent_type_str)
            .ok_or_else(|| decode_err(format!("unknown agent type `{agent_type_str}`")))?,
        customer_address,
        subject,
        proposed_reply,
        confidence_pct: u8::try_from(confidence_pct)
            .map_err(|_| decode_err(format!("confidence out of range: {confidence_pct}")))?,
        priority: EscalationPriority::parse(&priority_str)
            .ok_or_else(|| decode_err(format!("unknown priority `{priority_str}`")))?,
        status: ApprovalStatus::parse(&status_str)
            .ok_or_else(|| decode_err(format!("unknown approval status `{status_str}`")))?,
        reviewer,
        reviewed_at: reviewed_at.map(|raw| parse_timestamp(&raw, "reviewed_at")).transpose()?,
        audit_trail_json,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

#[async_trait::async_trait]
impl ApprovalQueueStore for SqlApprovalQueueStore {
    async fn create(&self, item: ApprovalQueueItem) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO approval_queue_item (id, user_id, agent_type, customer_address, subject,
                                              proposed_reply, confidence_pct, priority, status,
                                              reviewer, reviewed_at, audit_trail_json,
                                              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&item.id.0)
        .bind(&item.user_id)
        .bind(item.agent_type.as_str())
        .bind(&item.customer_address)
        .bind(&item.subject)
        .bind(&item.proposed_reply)
        .bind(i64::from(item.confidence_pct))
        .bind(item.priority.as_str())
        .bind(item.status.as_str())
        .bind(&item.reviewer)
        .bind(item.reviewed_at.map(|ts| ts.to_rfc3339()))
        .bind(&item.audit_trail_json)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn get(&self, id: &ApprovalItemId) -> Result<Option<ApprovalQueueItem>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, agent_type, customer_address, subject, proposed_reply,
                    confidence_pct, priority, status, reviewer, reviewed_at,
                    audit_trail_json, created_at, updated_at
             FROM approval_queue_item WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(ref r) => Ok(Some(row_to_item(r)?)),
            None => Ok(None),
        }
    }

    async fn update_review(
        &self,
        id: &ApprovalItemId,
        status: ApprovalStatus,
        reviewer: &str,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE approval_queue_item
             SET status = ?, reviewer = ?, reviewed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(reviewer)
        .bind(&now)
        .bind(&now)
        .bind(&id.0)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("no approval item with id {}", id.0)));
        }
        Ok(())
    }
}
