//! Reply composition with a deterministic template fallback.
//!
//! The generator drafts the customer-facing text; if it fails or returns
//! unusable output, the composer falls back to a fixed template assembled
//! only from fields that were actually obtained. The fallback never invents
//! a tracking link or a delivery date.

use std::sync::Arc;
use std::time::Duration;

use shipshape_core::domain::execution::ExecutionContext;
use shipshape_core::domain::order::EnrichedOrder;

use crate::llm::TextGenerator;
use crate::services::bounded;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplySource {
    Generated,
    Template,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Template => "template",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedReply {
    pub text: String,
    pub source: ReplySource,
    pub confidence_pct: u8,
}

pub struct ResponseComposer {
    generator: Arc<dyn TextGenerator>,
    max_tokens: u32,
    call_timeout: Duration,
}

impl ResponseComposer {
    pub fn new(generator: Arc<dyn TextGenerator>, max_tokens: u32, call_timeout: Duration) -> Self {
        Self { generator, max_tokens, call_timeout }
    }

    /// Compose a reply. Infallible by contract: generation failure selects
    /// the template path instead of surfacing an error.
    pub async fn compose(
        &self,
        context: &ExecutionContext,
        enriched: &EnrichedOrder,
    ) -> ComposedReply {
        let prompt = build_prompt(context, enriched);

        match bounded(self.call_timeout, self.generator.generate(&prompt, self.max_tokens)).await {
            Ok(text) if !text.trim().is_empty() => ComposedReply {
                text: text.trim().to_string(),
                source: ReplySource::Generated,
                confidence_pct: confidence(ReplySource::Generated, enriched),
            },
            Ok(_) => {
                tracing::warn!(
                    event_name = "composer.empty_generation",
                    execution_id = %context.execution_id.0,
                    "generator returned empty output; using template fallback"
                );
                self.fallback(enriched)
            }
            Err(error) => {
                tracing::warn!(
                    event_name = "composer.generation_failed",
                    execution_id = %context.execution_id.0,
                    error = %error,
                    "generator unavailable; using template fallback"
                );
                self.fallback(enriched)
            }
        }
    }

    fn fallback(&self, enriched: &EnrichedOrder) -> ComposedReply {
        ComposedReply {
            text: fallback_template(enriched),
            source: ReplySource::Template,
            confidence_pct: confidence(ReplySource::Template, enriched),
        }
    }
}

fn build_prompt(context: &ExecutionContext, enriched: &EnrichedOrder) -> String {
    let order = &enriched.order;
    let mut prompt = String::new();
    prompt.push_str(
        "You are a customer support assistant answering a shipping inquiry. \
         Write a short, friendly reply using only the facts below. \
         Do not invent tracking links, dates, or other details.\n\n",
    );
    prompt.push_str(&format!("Customer subject: {}\n", context.subject));
    prompt.push_str(&format!("Order number: {}\n", order.order_number));
    prompt.push_str(&format!("Order status: {}\n", order.status));
    prompt.push_str(&format!("Order placed: {}\n", order.placed_at.format("%Y-%m-%d")));
    if !order.items.is_empty() {
        let items: Vec<String> =
            order.items.iter().map(|item| format!("{} x{}", item.name, item.quantity)).collect();
        prompt.push_str(&format!("Items: {}\n", items.join(", ")));
    }
    match (&order.tracking_number, &enriched.tracking) {
        (Some(tracking_number), Some(tracking)) => {
            prompt.push_str(&format!("Tracking number: {tracking_number}\n"));
            prompt.push_str(&format!("Carrier: {}\n", tracking.carrier));
            prompt.push_str(&format!("Delivery status: {}\n", tracking.delivery_status));
            if let Some(predicted) = tracking.predicted_delivery {
                prompt.push_str(&format!(
                    "Predicted delivery: {}\n",
                    predicted.format("%Y-%m-%d")
                ));
            }
            if let Some(latest) = tracking.checkpoints.last() {
                prompt.push_str(&format!("Latest checkpoint: {}\n", latest.description));
            }
        }
        (Some(tracking_number), None) => {
            prompt.push_str(&format!("Tracking number: {tracking_number}\n"));
            prompt.push_str("Delivery status: not currently available\n");
        }
        (None, _) => {
            prompt.push_str("Tracking: not yet assigned\n");
        }
    }
    prompt.push_str("\nReply:");
    prompt
}

/// Deterministic reply built only from fields that were actually obtained.
fn fallback_template(enriched: &EnrichedOrder) -> String {
    let order = &enriched.order;
    let mut reply = format!(
        "Hello,\n\nThank you for reaching out about order {}. Its current status is: {}.",
        order.order_number, order.status
    );

    match (&order.tracking_number, &enriched.tracking) {
        (Some(tracking_number), Some(tracking)) => {
            reply.push_str(&format!(
                "\n\nYour shipment is with {} under tracking number {} and is currently: {}.",
                tracking.carrier, tracking_number, tracking.delivery_status
            ));
            if let Some(predicted) = tracking.predicted_delivery {
                reply.push_str(&format!(
                    " Estimated delivery: {}.",
                    predicted.format("%Y-%m-%d")
                ));
            }
        }
        (Some(tracking_number), None) => {
            reply.push_str(&format!(
                "\n\nYour tracking number is {tracking_number}. We could not retrieve live carrier updates just now, so please check again shortly."
            ));
        }
        (None, _) => {
            reply.push_str(
                "\n\nA tracking number has not been assigned yet; we will share one as soon as the order ships.",
            );
        }
    }

    reply.push_str("\n\nBest regards,\nCustomer Support");
    reply
}

fn confidence(source: ReplySource, enriched: &EnrichedOrder) -> u8 {
    match (source, enriched.tracking.is_some()) {
        (ReplySource::Generated, true) => 90,
        (ReplySource::Generated, false) => 75,
        (ReplySource::Template, true) => 70,
        (ReplySource::Template, false) => 60,
    }
}
