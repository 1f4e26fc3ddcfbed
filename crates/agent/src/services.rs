//! Trait seams for the external collaborators the pipeline consumes.
//!
//! Production backends live behind these traits; tests substitute doubles.
//! A timeout is treated identically to any other collaborator failure under
//! the halt/continue/fallback policy of the step that issued the call.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use shipshape_core::domain::order::{OrderRecord, TrackingSnapshot};
use shipshape_core::escalation::SentimentScore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("collaborator timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator usage limit exceeded")]
    UsageLimitExceeded,
    #[error("malformed collaborator response: {0}")]
    Malformed(String),
}

/// The order-management system. Lookup by number for extracted identities;
/// lookup by customer for the history fallback.
#[async_trait]
pub trait OrderManagement: Send + Sync {
    async fn lookup_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderRecord>, ServiceError>;

    async fn lookup_by_customer(&self, address: &str) -> Result<Vec<OrderRecord>, ServiceError>;
}

/// The carrier tracking service. The provider's usage-limit signal surfaces
/// as `ServiceError::UsageLimitExceeded`.
#[async_trait]
pub trait CarrierTracking: Send + Sync {
    async fn get_tracking(
        &self,
        tracking_number: &str,
        carrier_hint: Option<&str>,
    ) -> Result<TrackingSnapshot, ServiceError>;
}

#[async_trait]
pub trait SentimentAnalyzer: Send + Sync {
    async fn score(&self, text: &str) -> Result<SentimentScore, ServiceError>;
}

/// Outbound customer-facing delivery. Only invoked after the approval gate
/// allows an autonomous send.
#[async_trait]
pub trait ReplyTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), ServiceError>;
}

/// Bound a collaborator call; an elapsed timer becomes a `ServiceError`
/// indistinguishable in policy terms from the collaborator failing.
pub(crate) async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, ServiceError>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout { timeout_secs: timeout.as_secs() }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{bounded, ServiceError};

    #[tokio::test]
    async fn bounded_passes_through_quick_results() {
        let result = bounded(Duration::from_secs(1), async { Ok::<_, ServiceError>(42) }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn bounded_converts_elapsed_timers_into_timeouts() {
        let result = bounded(Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, ServiceError>(42)
        })
        .await;
        assert_eq!(result, Err(ServiceError::Timeout { timeout_secs: 1 }));
    }
}
