//! The approval gate: autonomous send vs. human-reviewed queuing.

use std::sync::Arc;

use chrono::Utc;

use shipshape_core::domain::approval::{ApprovalItemId, ApprovalQueueItem, ApprovalStatus};
use shipshape_core::domain::execution::ExecutionContext;
use shipshape_core::domain::rules::{AgentRule, AgentType};
use shipshape_core::errors::PipelineError;
use shipshape_core::escalation::EscalationPriority;
use shipshape_core::stores::{AgentRuleStore, ApprovalQueueStore};

use crate::composer::ComposedReply;
use crate::services::ReplyTransport;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    AutoSent,
    Queued { item_id: ApprovalItemId },
}

impl GateOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoSent => "auto_sent",
            Self::Queued { .. } => "queued",
        }
    }
}

pub struct ApprovalGate {
    rules: Arc<dyn AgentRuleStore>,
    queue: Arc<dyn ApprovalQueueStore>,
    transport: Arc<dyn ReplyTransport>,
}

impl ApprovalGate {
    pub fn new(
        rules: Arc<dyn AgentRuleStore>,
        queue: Arc<dyn ApprovalQueueStore>,
        transport: Arc<dyn ReplyTransport>,
    ) -> Self {
        Self { rules, queue, transport }
    }

    /// Decide and act. No rule means approval required; a disabled agent is
    /// likewise never allowed to send on its own. A transport failure after
    /// an auto-send decision downgrades to queuing rather than losing the
    /// reply.
    pub async fn apply(
        &self,
        context: &ExecutionContext,
        agent_type: AgentType,
        reply: &ComposedReply,
        priority: EscalationPriority,
        audit_trail_json: String,
    ) -> Result<GateOutcome, PipelineError> {
        let rule = self
            .rules
            .get_rule(&context.user_id, agent_type)
            .await
            .map_err(|error| PipelineError::Fatal(format!("agent rule read failed: {error}")))?
            .unwrap_or_else(|| AgentRule::default_for(context.user_id.clone(), agent_type));

        if rule.requires_approval || !rule.enabled {
            let item_id = self.enqueue(context, agent_type, reply, priority, audit_trail_json).await?;
            return Ok(GateOutcome::Queued { item_id });
        }

        match self
            .transport
            .send(&context.from_address, &format!("Re: {}", context.subject), &reply.text)
            .await
        {
            Ok(()) => Ok(GateOutcome::AutoSent),
            Err(error) => {
                tracing::warn!(
                    event_name = "gate.send_failed",
                    execution_id = %context.execution_id.0,
                    error = %error,
                    "auto-send failed; queuing reply for review instead"
                );
                let item_id =
                    self.enqueue(context, agent_type, reply, priority, audit_trail_json).await?;
                Ok(GateOutcome::Queued { item_id })
            }
        }
    }

    async fn enqueue(
        &self,
        context: &ExecutionContext,
        agent_type: AgentType,
        reply: &ComposedReply,
        priority: EscalationPriority,
        audit_trail_json: String,
    ) -> Result<ApprovalItemId, PipelineError> {
        let now = Utc::now();
        let item = ApprovalQueueItem {
            id: ApprovalItemId::generate(),
            user_id: context.user_id.clone(),
            agent_type,
            customer_address: context.from_address.clone(),
            subject: context.subject.clone(),
            proposed_reply: reply.text.clone(),
            confidence_pct: reply.confidence_pct,
            priority,
            status: ApprovalStatus::Pending,
            reviewer: None,
            reviewed_at: None,
            audit_trail_json,
            created_at: now,
            updated_at: now,
        };
        let item_id = item.id.clone();

        self.queue
            .create(item)
            .await
            .map_err(|error| PipelineError::Fatal(format!("approval queue write failed: {error}")))?;

        Ok(item_id)
    }
}
