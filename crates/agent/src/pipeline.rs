//! The pipeline orchestrator.
//!
//! One call to [`AgentPipeline::run`] turns one inbound inquiry into one
//! `ExecutionResult`. The orchestrator owns the continue/halt policy per
//! step, converts every failure into a structured escalation, and flushes
//! the audit trail exactly once on every exit path. Nothing escapes its
//! boundary as an error.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use shipshape_core::audit::StepRecorder;
use shipshape_core::config::PipelineConfig;
use shipshape_core::domain::execution::{ExecutionContext, ExecutionResult};
use shipshape_core::domain::rules::AgentType;
use shipshape_core::errors::PipelineError;
use shipshape_core::escalation::{EscalationPriority, PriorityThresholds};
use shipshape_core::resolver::OrderIdentityResolver;
use shipshape_core::stores::{
    AgentRuleStore, ApprovalQueueStore, AuditLogStore, MetricsStore, PersistedRun, RunOutcome,
    RunStore, StoreError,
};

use crate::composer::ResponseComposer;
use crate::enrichment::{OrderEnrichment, TrackingEnrichment};
use crate::gate::{ApprovalGate, GateOutcome};
use crate::llm::TextGenerator;
use crate::metrics::MetricsRecorder;
use crate::services::{
    bounded, CarrierTracking, OrderManagement, ReplyTransport, SentimentAnalyzer,
};

/// External collaborators, injected at construction time.
pub struct PipelineServices {
    pub orders: Arc<dyn OrderManagement>,
    pub tracking: Arc<dyn CarrierTracking>,
    pub generator: Arc<dyn TextGenerator>,
    pub sentiment: Arc<dyn SentimentAnalyzer>,
    pub transport: Arc<dyn ReplyTransport>,
}

/// Durable stores, injected at construction time.
pub struct PipelineStores {
    pub runs: Arc<dyn RunStore>,
    pub audit: Arc<dyn AuditLogStore>,
    pub rules: Arc<dyn AgentRuleStore>,
    pub queue: Arc<dyn ApprovalQueueStore>,
    pub metrics: Arc<dyn MetricsStore>,
}

enum Disposition {
    Replied { reply: String },
    Escalated { reason: String },
}

pub struct AgentPipeline {
    resolver: OrderIdentityResolver,
    order_enrichment: OrderEnrichment,
    tracking_enrichment: TrackingEnrichment,
    composer: ResponseComposer,
    gate: ApprovalGate,
    metrics: MetricsRecorder,
    sentiment: Arc<dyn SentimentAnalyzer>,
    runs: Arc<dyn RunStore>,
    audit: Arc<dyn AuditLogStore>,
    run_budget: Duration,
    call_timeout: Duration,
    thresholds: PriorityThresholds,
}

impl AgentPipeline {
    pub fn new(
        services: PipelineServices,
        stores: PipelineStores,
        config: PipelineConfig,
        reply_max_tokens: u32,
    ) -> Self {
        let call_timeout = Duration::from_secs(config.call_timeout_secs);
        Self {
            resolver: OrderIdentityResolver::new(),
            order_enrichment: OrderEnrichment::new(services.orders, call_timeout),
            tracking_enrichment: TrackingEnrichment::new(services.tracking, call_timeout),
            composer: ResponseComposer::new(services.generator, reply_max_tokens, call_timeout),
            gate: ApprovalGate::new(stores.rules, stores.queue, services.transport),
            metrics: MetricsRecorder::new(stores.metrics),
            sentiment: services.sentiment,
            runs: stores.runs,
            audit: stores.audit,
            run_budget: Duration::from_secs(config.run_budget_secs),
            call_timeout,
            thresholds: config.priority_thresholds,
        }
    }

    /// Process one inbound inquiry. Always returns a structured result.
    ///
    /// A previously persisted run for the same `(user_id, message_id)` pair
    /// is returned as-is instead of starting a duplicate run.
    pub async fn run(
        &self,
        user_id: impl Into<String>,
        message_id: impl Into<String>,
        from_address: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> ExecutionResult {
        let context = ExecutionContext::new(user_id, message_id, from_address, subject, body);

        match self.runs.find_run(&context.user_id, &context.message_id).await {
            Ok(Some(previous)) => return self.replay(previous).await,
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.dedup_check_failed",
                    execution_id = %context.execution_id.0,
                    error = %error,
                    "dedup lookup failed; proceeding with a fresh run"
                );
            }
        }

        tracing::info!(
            event_name = "pipeline.run_started",
            execution_id = %context.execution_id.0,
            user_id = %context.user_id,
            message_id = %context.message_id,
            "agent run started"
        );

        let mut recorder = StepRecorder::new(context.execution_id.clone());

        let disposition =
            match tokio::time::timeout(self.run_budget, self.execute(&context, &mut recorder))
                .await
            {
                Ok(disposition) => disposition,
                Err(_) => {
                    let error =
                        PipelineError::BudgetExceeded { budget_secs: self.run_budget.as_secs() };
                    // The dropped step future may have left a step in flight;
                    // close it out so the attempt stays on the trail.
                    recorder.fail_unfinished(error.to_string());
                    let step =
                        recorder.begin("fatal_error", json!({ "class": error.class().as_str() }));
                    recorder.fail(step, error.to_string());
                    Disposition::Escalated { reason: error.escalation_reason() }
                }
            };

        self.finish(&context, recorder, disposition).await
    }

    async fn execute(
        &self,
        context: &ExecutionContext,
        recorder: &mut StepRecorder,
    ) -> Disposition {
        match self.try_execute(context, recorder).await {
            Ok(disposition) => disposition,
            Err(error) => {
                let step =
                    recorder.begin("fatal_error", json!({ "class": error.class().as_str() }));
                recorder.fail(step, error.to_string());
                self.record_metrics(context, recorder, RunOutcome::Failure).await;
                Disposition::Escalated { reason: error.escalation_reason() }
            }
        }
    }

    async fn try_execute(
        &self,
        context: &ExecutionContext,
        recorder: &mut StepRecorder,
    ) -> Result<Disposition, PipelineError> {
        let step =
            recorder.begin("resolve_order_identity", json!({ "subject": context.subject }));
        let lookup = self.resolver.resolve(&context.subject, &context.body);
        recorder.complete(
            step,
            json!({
                "order_number": lookup.order_number,
                "provenance": lookup.provenance.as_str(),
            }),
        );

        let step = recorder.begin(
            "fetch_order",
            json!({
                "order_number": lookup.order_number,
                "provenance": lookup.provenance.as_str(),
            }),
        );
        let mut enriched =
            match self.order_enrichment.fetch(&lookup, &context.from_address).await {
                Ok(enriched) => {
                    recorder.complete(
                        step,
                        json!({
                            "order_number": enriched.order.order_number,
                            "status": enriched.order.status,
                            "tracking_number": enriched.order.tracking_number,
                        }),
                    );
                    enriched
                }
                Err(error) => {
                    recorder.fail(step, error.to_string());
                    return Ok(self.escalate(context, recorder, &error).await);
                }
            };

        let tracking_number = enriched.order.tracking_number.clone();
        let step =
            recorder.begin("fetch_tracking", json!({ "tracking_number": tracking_number }));
        match tracking_number {
            None => recorder.skip(step, "no_tracking_number"),
            Some(tracking_number) => {
                match self
                    .tracking_enrichment
                    .fetch(&tracking_number, enriched.order.carrier.as_deref())
                    .await
                {
                    Ok(snapshot) => {
                        recorder.complete(
                            step,
                            json!({
                                "carrier": snapshot.carrier,
                                "delivery_status": snapshot.delivery_status,
                                "predicted_delivery": snapshot.predicted_delivery,
                                "checkpoints": snapshot.checkpoints.len(),
                            }),
                        );
                        enriched.tracking = Some(snapshot);
                    }
                    Err(error) => {
                        tracing::warn!(
                            event_name = "pipeline.tracking_degraded",
                            execution_id = %context.execution_id.0,
                            error = %error,
                            "continuing without tracking data"
                        );
                        recorder.fail(step, error.to_string());
                    }
                }
            }
        }

        let step = recorder.begin(
            "compose_reply",
            json!({
                "order_number": enriched.order.order_number,
                "has_tracking": enriched.tracking.is_some(),
            }),
        );
        let reply = self.composer.compose(context, &enriched).await;
        let metadata = BTreeMap::from([
            ("source".to_string(), reply.source.as_str().to_string()),
            ("confidence_pct".to_string(), reply.confidence_pct.to_string()),
        ]);
        recorder.complete_with_metadata(step, json!({ "reply": reply.text }), metadata);

        let priority = self.assess_sentiment(context, recorder).await;

        let step = recorder.begin(
            "approval_gate",
            json!({
                "agent_type": AgentType::OrderStatus.as_str(),
                "priority": priority.as_str(),
            }),
        );
        // Queued items carry the trail accumulated so far, so a reviewer
        // sees provenance without re-running the pipeline.
        let trail_json =
            serde_json::to_string(recorder.trail()).unwrap_or_else(|_| "[]".to_string());
        match self
            .gate
            .apply(context, AgentType::OrderStatus, &reply, priority, trail_json)
            .await
        {
            Ok(outcome) => {
                let metadata =
                    BTreeMap::from([("decision".to_string(), outcome.as_str().to_string())]);
                let output = match &outcome {
                    GateOutcome::AutoSent => json!({ "decision": outcome.as_str() }),
                    GateOutcome::Queued { item_id } => {
                        json!({ "decision": outcome.as_str(), "item_id": item_id.0 })
                    }
                };
                recorder.complete_with_metadata(step, output, metadata);
            }
            Err(error) => {
                recorder.fail(step, error.to_string());
                return Err(error);
            }
        }

        self.record_metrics(context, recorder, RunOutcome::Success).await;

        Ok(Disposition::Replied { reply: reply.text })
    }

    /// Non-fatal halt: assess how urgently a human should look, count the
    /// failure, and surface the specific reason.
    async fn escalate(
        &self,
        context: &ExecutionContext,
        recorder: &mut StepRecorder,
        error: &PipelineError,
    ) -> Disposition {
        self.assess_sentiment(context, recorder).await;
        self.record_metrics(context, recorder, RunOutcome::Failure).await;
        Disposition::Escalated { reason: error.escalation_reason() }
    }

    /// Best-effort sentiment scoring of the customer's message. A scoring
    /// failure records a failed step and falls back to normal priority.
    async fn assess_sentiment(
        &self,
        context: &ExecutionContext,
        recorder: &mut StepRecorder,
    ) -> EscalationPriority {
        let step = recorder.begin("assess_sentiment", json!({ "subject": context.subject }));
        let text = format!("{}\n{}", context.subject, context.body);
        match bounded(self.call_timeout, self.sentiment.score(&text)).await {
            Ok(score) => {
                let priority = self.thresholds.elevate(&score);
                let metadata =
                    BTreeMap::from([("priority".to_string(), priority.as_str().to_string())]);
                recorder.complete_with_metadata(
                    step,
                    json!({
                        "label": score.label,
                        "confidence_pct": score.confidence_pct,
                    }),
                    metadata,
                );
                priority
            }
            Err(error) => {
                recorder.fail(step, error.to_string());
                EscalationPriority::Normal
            }
        }
    }

    async fn record_metrics(
        &self,
        context: &ExecutionContext,
        recorder: &mut StepRecorder,
        outcome: RunOutcome,
    ) {
        let success = outcome == RunOutcome::Success;
        let step = recorder.begin("metrics_updated", json!({ "success": success }));
        match self.metrics.record(&context.user_id, AgentType::OrderStatus, outcome).await {
            Ok(()) => recorder.complete(step, json!({ "recorded": true })),
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.metrics_failed",
                    execution_id = %context.execution_id.0,
                    error = %error,
                    "metric increment failed; counters are advisory"
                );
                recorder.fail(step, error.to_string());
            }
        }
    }

    /// Flush the audit trail and persist the run summary. Storage failures
    /// here are logged but never change the result already decided.
    async fn finish(
        &self,
        context: &ExecutionContext,
        recorder: StepRecorder,
        disposition: Disposition,
    ) -> ExecutionResult {
        let trail = recorder.into_trail();
        for log in &trail {
            if let Err(error) = self.audit.append(log.clone()).await {
                tracing::error!(
                    event_name = "pipeline.audit_flush_failed",
                    execution_id = %context.execution_id.0,
                    step_name = %log.step_name,
                    ordinal = log.ordinal,
                    error = %error,
                    "audit step could not be persisted"
                );
            }
        }

        let result = match disposition {
            Disposition::Replied { reply } => {
                ExecutionResult::replied(context.execution_id.clone(), reply, trail)
            }
            Disposition::Escalated { reason } => {
                ExecutionResult::escalated(context.execution_id.clone(), reason, trail)
            }
        };

        let run = PersistedRun {
            execution_id: context.execution_id.clone(),
            user_id: context.user_id.clone(),
            message_id: context.message_id.clone(),
            from_address: context.from_address.clone(),
            subject: context.subject.clone(),
            success: result.success,
            reply: result.reply.clone(),
            escalation_reason: result.escalation_reason.clone(),
            started_at: context.started_at,
            finished_at: Utc::now(),
        };
        match self.runs.insert_run(run).await {
            Ok(()) => {}
            Err(StoreError::Conflict(detail)) => {
                tracing::warn!(
                    event_name = "pipeline.run_already_recorded",
                    execution_id = %context.execution_id.0,
                    detail = %detail,
                    "a concurrent run for this message finished first"
                );
            }
            Err(error) => {
                tracing::error!(
                    event_name = "pipeline.run_persist_failed",
                    execution_id = %context.execution_id.0,
                    error = %error,
                    "run summary could not be persisted"
                );
            }
        }

        tracing::info!(
            event_name = "pipeline.run_finished",
            execution_id = %context.execution_id.0,
            success = result.success,
            "agent run finished"
        );

        result
    }

    /// Reconstruct the result of a previously persisted run.
    async fn replay(&self, previous: PersistedRun) -> ExecutionResult {
        tracing::info!(
            event_name = "pipeline.replayed",
            execution_id = %previous.execution_id.0,
            user_id = %previous.user_id,
            message_id = %previous.message_id,
            "message already processed; returning the recorded result"
        );

        let audit_trail = match self.audit.trail_for(&previous.execution_id).await {
            Ok(trail) => trail,
            Err(error) => {
                tracing::warn!(
                    event_name = "pipeline.replay_trail_unavailable",
                    execution_id = %previous.execution_id.0,
                    error = %error,
                    "stored audit trail could not be loaded"
                );
                Vec::new()
            }
        };

        ExecutionResult {
            execution_id: previous.execution_id,
            success: previous.success,
            reply: previous.reply,
            escalation_reason: previous.escalation_reason,
            audit_trail,
        }
    }
}
