//! Advisory per-user success/failure counters.

use std::sync::Arc;

use shipshape_core::domain::rules::AgentType;
use shipshape_core::stores::{MetricsStore, RunOutcome, StoreError};

/// Thin wrapper over the metrics store. Failures here are advisory: the
/// caller logs the failed step and keeps going, because the audit trail
/// remains the authoritative record of the run.
pub struct MetricsRecorder {
    store: Arc<dyn MetricsStore>,
}

impl MetricsRecorder {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        user_id: &str,
        agent_type: AgentType,
        outcome: RunOutcome,
    ) -> Result<(), StoreError> {
        self.store.increment(user_id, agent_type, outcome).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use shipshape_core::domain::rules::AgentType;
    use shipshape_core::stores::RunOutcome;
    use shipshape_db::repositories::InMemoryMetricsStore;

    use super::MetricsRecorder;

    #[tokio::test]
    async fn records_attempts_and_outcomes() {
        let store = InMemoryMetricsStore::default();
        let recorder = MetricsRecorder::new(Arc::new(store.clone()));

        recorder
            .record("user-1", AgentType::OrderStatus, RunOutcome::Success)
            .await
            .expect("record success");
        recorder
            .record("user-1", AgentType::OrderStatus, RunOutcome::Failure)
            .await
            .expect("record failure");

        let counters = store.counters("user-1", AgentType::OrderStatus);
        assert_eq!(counters.attempts, 2);
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.failures, 1);
    }
}
