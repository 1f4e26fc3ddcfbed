use sqlx::Row;

use shipshape_core::domain::rules::{AgentRule, AgentType};
use shipshape_core::stores::{AgentRuleStore, StoreError};

use super::{db_err, decode_err};
use crate::DbPool;

pub struct SqlAgentRuleStore {
    pool: DbPool,
}

impl SqlAgentRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AgentRuleStore for SqlAgentRuleStore {
    async fn get_rule(
        &self,
        user_id: &str,
        agent_type: AgentType,
    ) -> Result<Option<AgentRule>, StoreError> {
        let row = sqlx::query(
            "SELECT user_id, agent_type, enabled, requires_approval
             FROM agent_rule WHERE user_id = ? AND agent_type = ?",
        )
        .bind(user_id)
        .bind(agent_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };

        let user_id: String = row.try_get("user_id").map_err(|e| decode_err(e.to_string()))?;
        let agent_type_str: String =
            row.try_get("agent_type").map_err(|e| decode_err(e.to_string()))?;
        let enabled: i64 = row.try_get("enabled").map_err(|e| decode_err(e.to_string()))?;
        let requires_approval: i64 =
            row.try_get("requires_approval").map_err(|e| decode_err(e.to_string()))?;

        Ok(Some(AgentRule {
            user_id,
            agent_type: AgentType::parse(&agent_type_str)
                .ok_or_else(|| decode_err(format!("unknown agent type `{agent_type_str}`")))?,
            enabled: enabled != 0,
            requires_approval: requires_approval != 0,
        }))
    }

    async fn put_rule(&self, rule: AgentRule) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO agent_rule (user_id, agent_type, enabled, requires_approval)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(user_id, agent_type) DO UPDATE SET
                 enabled = excluded.enabled,
                 requires_approval = excluded.requires_approval",
        )
        .bind(&rule.user_id)
        .bind(rule.agent_type.as_str())
        .bind(i64::from(rule.enabled))
        .bind(i64::from(rule.requires_approval))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shipshape_core::domain::rules::{AgentRule, AgentType};
    use shipshape_core::stores::AgentRuleStore;

    use super::SqlAgentRuleStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn missing_rule_reads_as_none() {
        let pool = setup().await;
        let store = SqlAgentRuleStore::new(pool);

        let rule = store.get_rule("user-1", AgentType::OrderStatus).await.expect("get");
        assert!(rule.is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips_and_upserts() {
        let pool = setup().await;
        let store = SqlAgentRuleStore::new(pool);

        store
            .put_rule(AgentRule {
                user_id: "user-1".to_string(),
                agent_type: AgentType::OrderStatus,
                enabled: true,
                requires_approval: false,
            })
            .await
            .expect("put");

        let rule = store
            .get_rule("user-1", AgentType::OrderStatus)
            .await
            .expect("get")
            .expect("exists");
        assert!(!rule.requires_approval);

        store
            .put_rule(AgentRule {
                user_id: "user-1".to_string(),
                agent_type: AgentType::OrderStatus,
                enabled: true,
                requires_approval: true,
            })
            .await
            .expect("upsert");

        let rule = store
            .get_rule("user-1", AgentType::OrderStatus)
            .await
            .expect("get")
            .expect("exists");
        assert!(rule.requires_approval);
    }
}
