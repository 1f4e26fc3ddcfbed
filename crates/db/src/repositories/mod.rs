use chrono::{DateTime, Utc};

use shipshape_core::stores::StoreError;

pub mod approval;
pub mod memory;
pub mod metrics;
pub mod rules;
pub mod run;
pub mod step_log;

pub use approval::SqlApprovalQueueStore;
pub use memory::{
    InMemoryApprovalQueueStore, InMemoryAuditLogStore, InMemoryMetricsStore, InMemoryRuleStore,
    InMemoryRunStore,
};
pub use metrics::SqlMetricsStore;
pub use rules::SqlAgentRuleStore;
pub use run::SqlRunStore;
pub use step_log::SqlAuditLogStore;

pub(crate) fn db_err(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

pub(crate) fn decode_err(detail: impl Into<String>) -> StoreError {
    StoreError::Decode(detail.into())
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| decode_err(format!("invalid timestamp in `{column}`: {error}")))
}
