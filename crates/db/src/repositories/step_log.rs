use std::collections::BTreeMap;

use sqlx::Row;

use shipshape_core::audit::{StepLog, StepStatus};
use shipshape_core::domain::execution::ExecutionId;
use shipshape_core::stores::{AuditLogStore, StoreError};

use super::{db_err, decode_err, parse_timestamp};
use crate::DbPool;

/// Insert-only store for the audit trail. Rows are keyed by
/// `(execution_id, ordinal)`; concurrent runs never contend because each
/// owns a distinct execution id.
pub struct SqlAuditLogStore {
    pool: DbPool,
}

impl SqlAuditLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_step_log(row: &sqlx::sqlite::SqliteRow) -> Result<StepLog, StoreError> {
    let execution_id: String =
        row.try_get("execution_id").map_err(|e| decode_err(e.to_string()))?;
    let step_name: String = row.try_get("step_name").map_err(|e| decode_err(e.to_string()))?;
    let ordinal: i64 = row.try_get("ordinal").map_err(|e| decode_err(e.to_string()))?;
    let status_str: String = row.try_get("status").map_err(|e| decode_err(e.to_string()))?;
    let input_json: String = row.try_get("input_json").map_err(|e| decode_err(e.to_string()))?;
    let output_json: Option<String> =
        row.try_get("output_json").map_err(|e| decode_err(e.to_string()))?;
    let error: Option<String> = row.try_get("error").map_err(|e| decode_err(e.to_string()))?;
    let metadata_json: String =
        row.try_get("metadata_json").map_err(|e| decode_err(e.to_string()))?;
    let started_at: String = row.try_get("started_at").map_err(|e| decode_err(e.to_string()))?;
    let ended_at: Option<String> =
        row.try_get("ended_at").map_err(|e| decode_err(e.to_string()))?;

    let status = StepStatus::parse(&status_str)
        .ok_or_else(|| decode_err(format!("unknown step status `{status_str}`")))?;
    let input = serde_json::from_str(&input_json)
        .map_err(|e| decode_err(format!("invalid input_json: {e}")))?;
    let output = output_json
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| decode_err(format!("invalid output_json: {e}")))?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| decode_err(format!("invalid metadata_json: {e}")))?;

    Ok(StepLog {
        execution_id: ExecutionId(execution_id),
        step_name,
        ordinal: u32::try_from(ordinal)
            .map_err(|_| decode_err(format!("ordinal out of range: {ordinal}")))?,
        status,
        input,
        output,
        error,
        metadata,
        started_at: parse_timestamp(&started_at, "started_at")?,
        ended_at: ended_at.map(|raw| parse_timestamp(&raw, "ended_at")).transpose()?,
    })
}

#[async_trait::async_trait]
impl AuditLogStore for SqlAuditLogStore {
    async fn append(&self, log: StepLog) -> Result<(), StoreError> {
        let input_json = log.input.to_string();
        let output_json = log.output.as_ref().map(|value| value.to_string());
        let metadata_json = serde_json::to_string(&log.metadata)
            .map_err(|e| decode_err(format!("metadata not serializable: {e}")))?;

        sqlx::query(
            "INSERT INTO step_log (execution_id, ordinal, step_name, status, input_json,
                                   output_json, error, metadata_json, started_at, ended_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.execution_id.0)
        .bind(i64::from(log.ordinal))
        .bind(&log.step_name)
        .bind(log.status.as_str())
        .bind(input_json)
        .bind(output_json)
        .bind(&log.error)
        .bind(metadata_json)
        .bind(log.started_at.to_rfc3339())
        .bind(log.ended_at.map(|ts| ts.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn trail_for(&self, execution_id: &ExecutionId) -> Result<Vec<StepLog>, StoreError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT execution_id, ordinal, step_name, status, input_json, output_json,
                    error, metadata_json, started_at, ended_at
             FROM step_log WHERE execution_id = ? ORDER BY ordinal ASC",
        )
        .bind(&execution_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(row_to_step_log).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use shipshape_core::audit::{StepRecorder, StepStatus};
    use shipshape_core::domain::execution::ExecutionId;
    use shipshape_core::stores::AuditLogStore;

    use super::SqlAuditLogStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn appended_trail_reads_back_in_ordinal_order() {
        let pool = setup().await;
        let store = SqlAuditLogStore::new(pool);
        let execution_id = ExecutionId("exec-1".to_string());

        let mut recorder = StepRecorder::new(execution_id.clone());
        let step = recorder.begin("resolve_order_identity", json!({"subject": "order #1"}));
        recorder.complete(step, json!({"found": true, "order_number": "1"}));
        let step = recorder.begin("fetch_tracking", json!({}));
        recorder.skip(step, "no_tracking_number");

        for log in recorder.into_trail() {
            store.append(log).await.expect("append");
        }

        let trail = store.trail_for(&execution_id).await.expect("read trail");
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].ordinal, 0);
        assert_eq!(trail[0].status, StepStatus::Completed);
        assert_eq!(trail[1].status, StepStatus::Skipped);
        assert_eq!(
            trail[1].metadata.get("reason").map(String::as_str),
            Some("no_tracking_number")
        );
    }

    #[tokio::test]
    async fn trails_from_concurrent_runs_do_not_interfere() {
        let pool = setup().await;
        let store = SqlAuditLogStore::new(pool);

        for execution in ["exec-a", "exec-b"] {
            let mut recorder = StepRecorder::new(ExecutionId(execution.to_string()));
            let step = recorder.begin("fetch_order", json!({"run": execution}));
            recorder.complete(step, json!({}));
            for log in recorder.into_trail() {
                store.append(log).await.expect("append");
            }
        }

        let trail_a = store.trail_for(&ExecutionId("exec-a".to_string())).await.expect("trail a");
        assert_eq!(trail_a.len(), 1);
        assert_eq!(trail_a[0].input, json!({"run": "exec-a"}));
    }
}
