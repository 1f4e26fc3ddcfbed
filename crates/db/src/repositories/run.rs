use sqlx::Row;

use shipshape_core::domain::execution::ExecutionId;
use shipshape_core::stores::{PersistedRun, RunStore, StoreError};

use super::{db_err, decode_err, parse_timestamp};
use crate::DbPool;

pub struct SqlRunStore {
    pool: DbPool,
}

impl SqlRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<PersistedRun, StoreError> {
    let execution_id: String =
        row.try_get("execution_id").map_err(|e| decode_err(e.to_string()))?;
    let user_id: String = row.try_get("user_id").map_err(|e| decode_err(e.to_string()))?;
    let message_id: String = row.try_get("message_id").map_err(|e| decode_err(e.to_string()))?;
    let from_address: String =
        row.try_get("from_address").map_err(|e| decode_err(e.to_string()))?;
    let subject: String = row.try_get("subject").map_err(|e| decode_err(e.to_string()))?;
    let success: i64 = row.try_get("success").map_err(|e| decode_err(e.to_string()))?;
    let reply: Option<String> = row.try_get("reply").map_err(|e| decode_err(e.to_string()))?;
    let escalation_reason: Option<String> =
        row.try_get("escalation_reason").map_err(|e| decode_err(e.to_string()))?;
    let started_at: String = row.try_get("started_at").map_err(|e| decode_err(e.to_string()))?;
    let finished_at: String = row.try_get("finished_at").map_err(|e| decode_err(e.to_string()))?;

    Ok(PersistedRun {
        execution_id: ExecutionId(execution_id),
        user_id,
        message_id,
        from_address,
        subject,
        success: success != 0,
        reply,
        escalation_reason,
        started_at: parse_timestamp(&started_at, "started_at")?,
        finished_at: parse_timestamp(&finished_at, "finished_at")?,
    })
}

#[async_trait::async_trait]
impl RunStore for SqlRunStore {
    async fn insert_run(&self, run: PersistedRun) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO agent_run (execution_id, user_id, message_id, from_address, subject,
                                    success, reply, escalation_reason, started_at, finished_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.execution_id.0)
        .bind(&run.user_id)
        .bind(&run.message_id)
        .bind(&run.from_address)
        .bind(&run.subject)
        .bind(i64::from(run.success))
        .bind(&run.reply)
        .bind(&run.escalation_reason)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(StoreError::Conflict(format!(
                    "run already recorded for user {} message {}",
                    run.user_id, run.message_id
                )))
            }
            Err(error) => Err(db_err(error)),
        }
    }

    async fn find_run(
        &self,
        user_id: &str,
        message_id: &str,
    ) -> Result<Option<PersistedRun>, StoreError> {
        let row = sqlx::query(
            "SELECT execution_id, user_id, message_id, from_address, subject, success,
                    reply, escalation_reason, started_at, finished_at
             FROM agent_run WHERE user_id = ? AND message_id = ?",
        )
        .bind(user_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(ref r) => Ok(Some(row_to_run(r)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use shipshape_core::domain::execution::ExecutionId;
    use shipshape_core::stores::{PersistedRun, RunStore, StoreError};

    use super::SqlRunStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_run(execution_id: &str, user_id: &str, message_id: &str) -> PersistedRun {
        let now = Utc::now();
        PersistedRun {
            execution_id: ExecutionId(execution_id.to_string()),
            user_id: user_id.to_string(),
            message_id: message_id.to_string(),
            from_address: "customer@example.test".to_string(),
            subject: "Where is my order #12345?".to_string(),
            success: true,
            reply: Some("Your order 12345 is in transit.".to_string()),
            escalation_reason: None,
            started_at: now,
            finished_at: now,
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_user_and_message() {
        let pool = setup().await;
        let store = SqlRunStore::new(pool);

        store.insert_run(sample_run("exec-1", "user-1", "msg-1")).await.expect("insert");

        let found = store.find_run("user-1", "msg-1").await.expect("find").expect("exists");
        assert_eq!(found.execution_id.0, "exec-1");
        assert!(found.success);
        assert_eq!(found.reply.as_deref(), Some("Your order 12345 is in transit."));

        let missing = store.find_run("user-1", "msg-other").await.expect("find");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn duplicate_user_message_pair_is_a_conflict() {
        let pool = setup().await;
        let store = SqlRunStore::new(pool);

        store.insert_run(sample_run("exec-1", "user-1", "msg-1")).await.expect("first insert");
        let error = store
            .insert_run(sample_run("exec-2", "user-1", "msg-1"))
            .await
            .expect_err("second insert should conflict");

        assert!(matches!(error, StoreError::Conflict(_)));
    }
}
