pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod resolver;
pub mod stores;

pub use audit::{OpenStep, StepLog, StepRecorder, StepStatus};
pub use domain::approval::{ApprovalItemId, ApprovalQueueItem, ApprovalStatus};
pub use domain::execution::{ExecutionContext, ExecutionId, ExecutionResult};
pub use domain::order::{
    EnrichedOrder, OrderLineItem, OrderLookupResult, OrderProvenance, OrderRecord,
    TrackingCheckpoint, TrackingSnapshot,
};
pub use domain::rules::{AgentRule, AgentType};
pub use errors::{ErrorClass, PipelineError};
pub use escalation::{EscalationPriority, PriorityThresholds, SentimentScore};
pub use resolver::OrderIdentityResolver;
pub use stores::{PersistedRun, RunOutcome, StoreError};
