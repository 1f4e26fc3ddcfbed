//! Enrichment adapters over the order-management and carrier collaborators.

use std::sync::Arc;
use std::time::Duration;

use shipshape_core::domain::order::{
    EnrichedOrder, OrderLookupResult, OrderProvenance, TrackingSnapshot,
};
use shipshape_core::errors::PipelineError;

use crate::services::{bounded, CarrierTracking, OrderManagement, ServiceError};

/// Fetches the canonical order. A miss here is terminal for the run: the
/// pipeline cannot proceed without the order, so both not-found and
/// transport errors halt (with distinct reasons).
pub struct OrderEnrichment {
    orders: Arc<dyn OrderManagement>,
    call_timeout: Duration,
}

impl OrderEnrichment {
    pub fn new(orders: Arc<dyn OrderManagement>, call_timeout: Duration) -> Self {
        Self { orders, call_timeout }
    }

    pub async fn fetch(
        &self,
        lookup: &OrderLookupResult,
        from_address: &str,
    ) -> Result<EnrichedOrder, PipelineError> {
        match &lookup.order_number {
            Some(order_number) => {
                let record =
                    bounded(self.call_timeout, self.orders.lookup_by_number(order_number))
                        .await
                        .map_err(|error| PipelineError::OrderLookup(error.to_string()))?;
                match record {
                    Some(order) => Ok(EnrichedOrder::new(order, OrderProvenance::Extracted)),
                    None => Err(PipelineError::OrderNotFound {
                        order_number: order_number.clone(),
                    }),
                }
            }
            None => {
                let mut orders =
                    bounded(self.call_timeout, self.orders.lookup_by_customer(from_address))
                        .await
                        .map_err(|error| PipelineError::OrderLookup(error.to_string()))?;
                // Most recent order wins the history fallback.
                orders.sort_by_key(|order| std::cmp::Reverse(order.placed_at));
                match orders.into_iter().next() {
                    Some(order) => {
                        Ok(EnrichedOrder::new(order, OrderProvenance::CustomerLookup))
                    }
                    None => Err(PipelineError::CustomerHistoryEmpty {
                        address: from_address.to_string(),
                    }),
                }
            }
        }
    }
}

/// Best-effort carrier tracking. Failures degrade the run, never halt it.
pub struct TrackingEnrichment {
    tracking: Arc<dyn CarrierTracking>,
    call_timeout: Duration,
}

impl TrackingEnrichment {
    pub fn new(tracking: Arc<dyn CarrierTracking>, call_timeout: Duration) -> Self {
        Self { tracking, call_timeout }
    }

    pub async fn fetch(
        &self,
        tracking_number: &str,
        carrier_hint: Option<&str>,
    ) -> Result<TrackingSnapshot, PipelineError> {
        bounded(self.call_timeout, self.tracking.get_tracking(tracking_number, carrier_hint))
            .await
            .map_err(|error| match error {
                ServiceError::UsageLimitExceeded => PipelineError::TrackingUsageLimit,
                other => PipelineError::Tracking(other.to_string()),
            })
    }
}
