//! Stepped agent execution engine for order-status inquiries.
//!
//! One inbound "where is my order" message becomes one run of a strictly
//! sequential pipeline:
//!
//! 1. **Identity resolution** (`shipshape_core::resolver`): find an order
//!    number in the message text, or fall back to the sender's history.
//! 2. **Enrichment** (`enrichment`): canonical order data from the order
//!    store (halt on failure), then carrier tracking (best effort).
//! 3. **Composition** (`composer`): an LLM-drafted reply with a
//!    deterministic template fallback.
//! 4. **Gating** (`gate`): auto-send only on explicit per-user opt-in;
//!    everything else lands in the human approval queue.
//! 5. **Metrics** (`metrics`): advisory per-user counters.
//!
//! The orchestrator (`pipeline`) owns the continue/halt policy per step and
//! guarantees the audit trail is flushed exactly once per run, whatever the
//! outcome. Every collaborator is an injected trait object, so tests swap
//! in doubles and nothing hides behind a global.

pub mod composer;
pub mod enrichment;
pub mod gate;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod services;

pub use composer::{ComposedReply, ReplySource, ResponseComposer};
pub use gate::{ApprovalGate, GateOutcome};
pub use pipeline::{AgentPipeline, PipelineStores, PipelineServices};
pub use services::{
    CarrierTracking, OrderManagement, ReplyTransport, SentimentAnalyzer, ServiceError,
};
