use thiserror::Error;

/// Error taxonomy for pipeline steps. Steps never let these escape past the
/// orchestrator; the orchestrator converts them into an escalation result.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("order {order_number} not found in store system")]
    OrderNotFound { order_number: String },
    #[error("no order history found for {address}")]
    CustomerHistoryEmpty { address: String },
    #[error("order lookup failed: {0}")]
    OrderLookup(String),
    #[error("tracking lookup failed: {0}")]
    Tracking(String),
    #[error("tracking usage limit exceeded")]
    TrackingUsageLimit,
    #[error("text generation failed: {0}")]
    Generation(String),
    #[error("run exceeded its wall-clock budget of {budget_secs}s")]
    BudgetExceeded { budget_secs: u64 },
    #[error("unexpected pipeline failure: {0}")]
    Fatal(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    DegradedEnrichment,
    GenerationFailure,
    FatalError,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::DegradedEnrichment => "degraded_enrichment",
            Self::GenerationFailure => "generation_failure",
            Self::FatalError => "fatal_error",
        }
    }
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::OrderNotFound { .. } | Self::CustomerHistoryEmpty { .. } => ErrorClass::NotFound,
            Self::Tracking(_) | Self::TrackingUsageLimit => ErrorClass::DegradedEnrichment,
            Self::Generation(_) => ErrorClass::GenerationFailure,
            Self::OrderLookup(_) | Self::BudgetExceeded { .. } | Self::Fatal(_) => {
                ErrorClass::FatalError
            }
        }
    }

    /// Reason string surfaced to support operators. Specific enough to act
    /// on without inspecting the full audit trail.
    pub fn escalation_reason(&self) -> String {
        match self {
            Self::OrderNotFound { order_number } => {
                format!("Order {order_number} not found in store system")
            }
            Self::CustomerHistoryEmpty { address } => format!(
                "Could not identify an order: no number in the message and no order history for {address}"
            ),
            Self::OrderLookup(detail) => {
                format!("Order store lookup failed before the order could be identified: {detail}")
            }
            Self::Tracking(detail) => format!("Carrier tracking unavailable: {detail}"),
            Self::TrackingUsageLimit => {
                "Carrier tracking unavailable: usage limit exceeded".to_string()
            }
            Self::Generation(detail) => format!("Reply generation failed: {detail}"),
            Self::BudgetExceeded { budget_secs } => {
                format!("Run abandoned after exceeding the {budget_secs}s processing budget")
            }
            Self::Fatal(detail) => format!("Unexpected pipeline failure: {detail}"),
        }
    }
}
