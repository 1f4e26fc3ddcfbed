use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an order identity was established for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderProvenance {
    /// An order number was extracted from the message text.
    Extracted,
    /// No number in the text; resolution falls back to the sender's
    /// most recent order.
    CustomerLookup,
}

impl OrderProvenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extracted => "extracted",
            Self::CustomerLookup => "customer_lookup",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "extracted" => Some(Self::Extracted),
            "customer_lookup" => Some(Self::CustomerLookup),
            _ => None,
        }
    }
}

/// Resolved order identity. Not finding a number is a valid terminal
/// value, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderLookupResult {
    pub order_number: Option<String>,
    pub provenance: OrderProvenance,
}

impl OrderLookupResult {
    pub fn extracted(order_number: impl Into<String>) -> Self {
        Self { order_number: Some(order_number.into()), provenance: OrderProvenance::Extracted }
    }

    pub fn customer_lookup() -> Self {
        Self { order_number: None, provenance: OrderProvenance::CustomerLookup }
    }

    pub fn found(&self) -> bool {
        self.order_number.is_some()
    }
}

/// Canonical order data as reported by the order-management system.
/// Status is an open vocabulary owned by that system, so it stays a string.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_number: String,
    pub customer_address: String,
    pub status: String,
    pub placed_at: DateTime<Utc>,
    pub items: Vec<OrderLineItem>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub name: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingCheckpoint {
    pub description: String,
    pub location: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Carrier-side view of a shipment. Optional by design: its absence must
/// never invalidate an otherwise-successful run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSnapshot {
    pub carrier: String,
    pub delivery_status: String,
    pub predicted_delivery: Option<DateTime<Utc>>,
    pub checkpoints: Vec<TrackingCheckpoint>,
}

/// Order data after enrichment, carried through composition and gating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichedOrder {
    pub order: OrderRecord,
    pub provenance: OrderProvenance,
    pub tracking: Option<TrackingSnapshot>,
}

impl EnrichedOrder {
    pub fn new(order: OrderRecord, provenance: OrderProvenance) -> Self {
        Self { order, provenance, tracking: None }
    }

    pub fn with_tracking(mut self, tracking: TrackingSnapshot) -> Self {
        self.tracking = Some(tracking);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::OrderProvenance;

    #[test]
    fn provenance_round_trips_from_storage_encoding() {
        for provenance in [OrderProvenance::Extracted, OrderProvenance::CustomerLookup] {
            assert_eq!(OrderProvenance::parse(provenance.as_str()), Some(provenance));
        }
    }
}
