use chrono::Utc;
use sqlx::Row;

use shipshape_core::domain::rules::AgentType;
use shipshape_core::stores::{MetricsStore, RunOutcome, StoreError};

use super::{db_err, decode_err};
use crate::DbPool;

pub struct SqlMetricsStore {
    pool: DbPool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricTotals {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

impl SqlMetricsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn totals(
        &self,
        user_id: &str,
        agent_type: AgentType,
    ) -> Result<MetricTotals, StoreError> {
        let row = sqlx::query(
            "SELECT attempts, successes, failures
             FROM agent_metric WHERE user_id = ? AND agent_type = ?",
        )
        .bind(user_id)
        .bind(agent_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(MetricTotals::default()) };

        let attempts: i64 = row.try_get("attempts").map_err(|e| decode_err(e.to_string()))?;
        let successes: i64 = row.try_get("successes").map_err(|e| decode_err(e.to_string()))?;
        let failures: i64 = row.try_get("failures").map_err(|e| decode_err(e.to_string()))?;

        Ok(MetricTotals {
            attempts: attempts.max(0) as u64,
            successes: successes.max(0) as u64,
            failures: failures.max(0) as u64,
        })
    }
}

#[async_trait::async_trait]
impl MetricsStore for SqlMetricsStore {
    /// Single-statement upsert so concurrent runs never lose an increment.
    async fn increment(
        &self,
        user_id: &str,
        agent_type: AgentType,
        outcome: RunOutcome,
    ) -> Result<(), StoreError> {
        let (success_delta, failure_delta) = match outcome {
            RunOutcome::Success => (1i64, 0i64),
            RunOutcome::Failure => (0i64, 1i64),
        };

        sqlx::query(
            "INSERT INTO agent_metric (user_id, agent_type, attempts, successes, failures, updated_at)
             VALUES (?, ?, 1, ?, ?, ?)
             ON CONFLICT(user_id, agent_type) DO UPDATE SET
                 attempts = attempts + 1,
                 successes = successes + excluded.successes,
                 failures = failures + excluded.failures,
                 updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(agent_type.as_str())
        .bind(success_delta)
        .bind(failure_delta)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
