//! End-to-end pipeline scenarios over in-memory stores and fake
//! collaborators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use shipshape_agent::llm::TextGenerator;
use shipshape_agent::{
    AgentPipeline, CarrierTracking, OrderManagement, PipelineServices, PipelineStores,
    ReplyTransport, SentimentAnalyzer, ServiceError,
};
use shipshape_core::audit::StepStatus;
use shipshape_core::config::PipelineConfig;
use shipshape_core::domain::order::{OrderRecord, TrackingCheckpoint, TrackingSnapshot};
use shipshape_core::domain::rules::{AgentRule, AgentType};
use shipshape_core::escalation::{EscalationPriority, PriorityThresholds, SentimentScore};
use shipshape_core::stores::RunStore;
use shipshape_db::repositories::{
    InMemoryApprovalQueueStore, InMemoryAuditLogStore, InMemoryMetricsStore, InMemoryRuleStore,
    InMemoryRunStore,
};

struct FakeOrders {
    orders: Vec<OrderRecord>,
    delay: Option<Duration>,
}

#[async_trait]
impl OrderManagement for FakeOrders {
    async fn lookup_by_number(
        &self,
        order_number: &str,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.orders.iter().find(|order| order.order_number == order_number).cloned())
    }

    async fn lookup_by_customer(&self, address: &str) -> Result<Vec<OrderRecord>, ServiceError> {
        Ok(self.orders.iter().filter(|order| order.customer_address == address).cloned().collect())
    }
}

struct FakeTracking {
    result: Result<TrackingSnapshot, ServiceError>,
}

#[async_trait]
impl CarrierTracking for FakeTracking {
    async fn get_tracking(
        &self,
        _tracking_number: &str,
        _carrier_hint: Option<&str>,
    ) -> Result<TrackingSnapshot, ServiceError> {
        self.result.clone()
    }
}

struct FakeGenerator {
    result: Result<String, ServiceError>,
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ServiceError> {
        self.result.clone()
    }
}

struct FixedSentiment {
    label: &'static str,
    confidence_pct: u8,
}

#[async_trait]
impl SentimentAnalyzer for FixedSentiment {
    async fn score(&self, _text: &str) -> Result<SentimentScore, ServiceError> {
        Ok(SentimentScore {
            label: self.label.to_string(),
            confidence_pct: self.confidence_pct,
            per_class: BTreeMap::new(),
        })
    }
}

#[derive(Default)]
struct CountingTransport {
    sends: AtomicU32,
}

#[async_trait]
impl ReplyTransport for CountingTransport {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), ServiceError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    pipeline: AgentPipeline,
    runs: InMemoryRunStore,
    audit: InMemoryAuditLogStore,
    queue: InMemoryApprovalQueueStore,
    metrics: InMemoryMetricsStore,
    transport: Arc<CountingTransport>,
}

struct Setup {
    orders: FakeOrders,
    tracking: FakeTracking,
    generator: FakeGenerator,
    sentiment: FixedSentiment,
    rules: InMemoryRuleStore,
    run_budget_secs: u64,
    call_timeout_secs: u64,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            orders: FakeOrders { orders: vec![shipped_order()], delay: None },
            tracking: FakeTracking { result: Ok(in_transit_snapshot()) },
            generator: FakeGenerator {
                result: Ok("Good news: order 12345 is on its way!".to_string()),
            },
            sentiment: FixedSentiment { label: "neutral", confidence_pct: 55 },
            rules: InMemoryRuleStore::default(),
            run_budget_secs: 30,
            call_timeout_secs: 5,
        }
    }
}

impl Setup {
    fn build(self) -> Harness {
        let runs = InMemoryRunStore::default();
        let audit = InMemoryAuditLogStore::default();
        let queue = InMemoryApprovalQueueStore::default();
        let metrics = InMemoryMetricsStore::default();
        let transport = Arc::new(CountingTransport::default());

        let pipeline = AgentPipeline::new(
            PipelineServices {
                orders: Arc::new(self.orders),
                tracking: Arc::new(self.tracking),
                generator: Arc::new(self.generator),
                sentiment: Arc::new(self.sentiment),
                transport: transport.clone(),
            },
            PipelineStores {
                runs: Arc::new(runs.clone()),
                audit: Arc::new(audit.clone()),
                rules: Arc::new(self.rules),
                queue: Arc::new(queue.clone()),
                metrics: Arc::new(metrics.clone()),
            },
            PipelineConfig {
                run_budget_secs: self.run_budget_secs,
                call_timeout_secs: self.call_timeout_secs,
                priority_thresholds: PriorityThresholds::default(),
            },
            400,
        );

        Harness { pipeline, runs, audit, queue, metrics, transport }
    }
}

fn shipped_order() -> OrderRecord {
    OrderRecord {
        order_number: "12345".to_string(),
        customer_address: "customer@example.test".to_string(),
        status: "shipped".to_string(),
        placed_at: Utc::now() - ChronoDuration::days(3),
        items: vec![],
        tracking_number: Some("1Z999AA1".to_string()),
        carrier: Some("ups".to_string()),
    }
}

fn in_transit_snapshot() -> TrackingSnapshot {
    TrackingSnapshot {
        carrier: "UPS".to_string(),
        delivery_status: "in_transit".to_string(),
        predicted_delivery: Some(Utc::now() + ChronoDuration::days(2)),
        checkpoints: vec![TrackingCheckpoint {
            description: "Departed facility".to_string(),
            location: Some("Louisville KY".to_string()),
            occurred_at: Utc::now() - ChronoDuration::hours(6),
        }],
    }
}

#[tokio::test]
async fn happy_path_replies_queues_and_audits() {
    let harness = Setup::default().build();

    let result = harness
        .pipeline
        .run("user-1", "msg-1", "customer@example.test", "Where is my order #12345?", "Thanks!")
        .await;

    assert!(result.success);
    assert!(result.reply.as_deref().unwrap_or_default().contains("12345"));
    assert!(result.escalation_reason.is_none());

    let trail = &result.audit_trail;
    assert!((5..=7).contains(&trail.len()), "unexpected trail length {}", trail.len());
    assert_eq!(trail.last().map(|log| log.step_name.as_str()), Some("metrics_updated"));
    assert!(trail.iter().all(|log| log.status.is_terminal()));

    // Default deny: the reply is queued for review, never sent directly.
    assert_eq!(harness.transport.sends.load(Ordering::SeqCst), 0);
    assert_eq!(harness.queue.all().len(), 1);

    // The flush persisted the whole trail and the run summary.
    assert_eq!(harness.audit.all().len(), trail.len());
    let persisted = harness
        .runs
        .find_run("user-1", "msg-1")
        .await
        .expect("find run")
        .expect("run recorded");
    assert!(persisted.success);

    let counters = harness.metrics.counters("user-1", AgentType::OrderStatus);
    assert_eq!(counters.attempts, 1);
    assert_eq!(counters.successes, 1);
}

#[tokio::test]
async fn unidentifiable_order_escalates_with_specific_reason() {
    let mut setup = Setup::default();
    setup.orders = FakeOrders { orders: vec![], delay: None };
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-2", "stranger@example.test", "Where is my package?", "It never came.")
        .await;

    assert!(!result.success);
    assert!(result.reply.is_none());
    let reason = result.escalation_reason.expect("escalation reason");
    assert!(reason.contains("Could not identify an order"), "reason was: {reason}");

    let failed = result
        .audit_trail
        .iter()
        .find(|log| log.status == StepStatus::Failed)
        .expect("a failed step");
    assert_eq!(failed.step_name, "fetch_order");

    let counters = harness.metrics.counters("user-1", AgentType::OrderStatus);
    assert_eq!(counters.failures, 1);
}

#[tokio::test]
async fn missing_order_number_falls_back_to_customer_history() {
    let harness = Setup::default().build();

    let result = harness
        .pipeline
        .run("user-1", "msg-3", "customer@example.test", "Where is my package?", "No number here.")
        .await;

    assert!(result.success);
    assert!(result.reply.as_deref().unwrap_or_default().contains("12345"));
}

#[tokio::test]
async fn degraded_tracking_still_succeeds_without_fabrication() {
    let mut setup = Setup::default();
    setup.tracking =
        FakeTracking { result: Err(ServiceError::Unavailable("carrier 503".to_string())) };
    setup.generator = FakeGenerator { result: Err(ServiceError::Unavailable("llm down".into())) };
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-4", "customer@example.test", "Where is my order #12345?", "")
        .await;

    assert!(result.success);
    let reply = result.reply.expect("reply");
    assert!(!reply.contains("Estimated delivery"));
    assert!(!reply.to_lowercase().contains("http"));

    let tracking_step = result
        .audit_trail
        .iter()
        .find(|log| log.step_name == "fetch_tracking")
        .expect("tracking step");
    assert_eq!(tracking_step.status, StepStatus::Failed);
}

#[tokio::test]
async fn absent_tracking_number_is_a_skip_not_a_failure() {
    let mut setup = Setup::default();
    let mut order = shipped_order();
    order.tracking_number = None;
    order.carrier = None;
    setup.orders = FakeOrders { orders: vec![order], delay: None };
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-5", "customer@example.test", "Where is my order #12345?", "")
        .await;

    assert!(result.success);
    let tracking_step = result
        .audit_trail
        .iter()
        .find(|log| log.step_name == "fetch_tracking")
        .expect("tracking step");
    assert_eq!(tracking_step.status, StepStatus::Skipped);
    assert_eq!(
        tracking_step.metadata.get("reason").map(String::as_str),
        Some("no_tracking_number")
    );
}

#[tokio::test]
async fn generator_failure_uses_template_instead_of_escalating() {
    let mut setup = Setup::default();
    setup.generator = FakeGenerator { result: Err(ServiceError::Unavailable("llm down".into())) };
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-6", "customer@example.test", "Where is my order #12345?", "")
        .await;

    assert!(result.success);
    let compose_step = result
        .audit_trail
        .iter()
        .find(|log| log.step_name == "compose_reply")
        .expect("compose step");
    assert_eq!(compose_step.status, StepStatus::Completed);
    assert_eq!(compose_step.metadata.get("source").map(String::as_str), Some("template"));
}

#[tokio::test]
async fn explicit_opt_in_auto_sends_without_queuing() {
    let mut setup = Setup::default();
    setup.rules = InMemoryRuleStore::with_rule(AgentRule {
        user_id: "user-1".to_string(),
        agent_type: AgentType::OrderStatus,
        enabled: true,
        requires_approval: false,
    });
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-7", "customer@example.test", "Where is my order #12345?", "")
        .await;

    assert!(result.success);
    assert_eq!(harness.transport.sends.load(Ordering::SeqCst), 1);
    assert!(harness.queue.all().is_empty());
}

#[tokio::test]
async fn angry_customer_elevates_queue_priority() {
    let mut setup = Setup::default();
    setup.sentiment = FixedSentiment { label: "negative", confidence_pct: 90 };
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-8", "customer@example.test", "WHERE is order #12345?!", "Furious.")
        .await;

    assert!(result.success);
    let items = harness.queue.all();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].priority, EscalationPriority::Urgent);
}

#[tokio::test]
async fn replaying_a_processed_message_returns_the_recorded_run() {
    let harness = Setup::default().build();

    let first = harness
        .pipeline
        .run("user-1", "msg-9", "customer@example.test", "Where is my order #12345?", "")
        .await;
    let second = harness
        .pipeline
        .run("user-1", "msg-9", "customer@example.test", "Where is my order #12345?", "")
        .await;

    assert_eq!(second.execution_id, first.execution_id);
    assert_eq!(second.success, first.success);
    assert_eq!(second.reply, first.reply);
    assert_eq!(second.audit_trail.len(), first.audit_trail.len());

    // No duplicate run or queue item was created.
    assert_eq!(harness.queue.all().len(), 1);
    assert_eq!(harness.audit.all().len(), first.audit_trail.len());
    let counters = harness.metrics.counters("user-1", AgentType::OrderStatus);
    assert_eq!(counters.attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn budget_expiry_abandons_the_run_but_keeps_the_trail() {
    let mut setup = Setup::default();
    setup.orders =
        FakeOrders { orders: vec![shipped_order()], delay: Some(Duration::from_secs(120)) };
    setup.run_budget_secs = 2;
    setup.call_timeout_secs = 300;
    let harness = setup.build();

    let result = harness
        .pipeline
        .run("user-1", "msg-10", "customer@example.test", "Where is my order #12345?", "")
        .await;

    assert!(!result.success);
    let reason = result.escalation_reason.expect("escalation reason");
    assert!(reason.contains("budget"), "reason was: {reason}");

    let fatal = result
        .audit_trail
        .iter()
        .find(|log| log.step_name == "fatal_error")
        .expect("fatal step");
    assert_eq!(fatal.status, StepStatus::Failed);

    // The order lookup was in flight when the budget ran out; the attempt
    // still shows up as a failed step and the ordinals stay gapless.
    let abandoned = result
        .audit_trail
        .iter()
        .find(|log| log.step_name == "fetch_order")
        .expect("in-flight step on the trail");
    assert_eq!(abandoned.status, StepStatus::Failed);
    assert!(abandoned.error.as_deref().unwrap_or_default().contains("budget"));
    assert!(abandoned.ended_at.is_some());
    for (index, log) in result.audit_trail.iter().enumerate() {
        assert_eq!(log.ordinal as usize, index);
        assert!(log.status.is_terminal());
    }

    // The partial trail was still flushed.
    assert_eq!(harness.audit.all().len(), result.audit_trail.len());
    assert!(harness
        .runs
        .find_run("user-1", "msg-10")
        .await
        .expect("find run")
        .is_some());
}
