use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use shipshape_agent::llm::HttpTextGenerator;
use shipshape_agent::{
    AgentPipeline, CarrierTracking, OrderManagement, PipelineServices, PipelineStores,
    ReplyTransport, SentimentAnalyzer, ServiceError,
};
use shipshape_core::config::{AppConfig, LoadOptions};
use shipshape_core::domain::execution::ExecutionResult;
use shipshape_core::domain::order::{OrderRecord, TrackingSnapshot};
use shipshape_core::escalation::SentimentScore;
use shipshape_db::repositories::{
    SqlAgentRuleStore, SqlApprovalQueueStore, SqlAuditLogStore, SqlMetricsStore, SqlRunStore,
};
use shipshape_db::{connect_with_settings, migrations};

use crate::commands::CommandResult;

/// Stand-in for collaborators without a bundled production backend. Every
/// call reports unavailability; the pipeline records that and escalates or
/// degrades per its step policy, so the audit trail still tells the truth.
struct Unintegrated(&'static str);

impl Unintegrated {
    fn unavailable(&self) -> ServiceError {
        ServiceError::Unavailable(format!("{} integration is not configured", self.0))
    }
}

#[async_trait]
impl OrderManagement for Unintegrated {
    async fn lookup_by_number(
        &self,
        _order_number: &str,
    ) -> Result<Option<OrderRecord>, ServiceError> {
        Err(self.unavailable())
    }

    async fn lookup_by_customer(&self, _address: &str) -> Result<Vec<OrderRecord>, ServiceError> {
        Err(self.unavailable())
    }
}

#[async_trait]
impl CarrierTracking for Unintegrated {
    async fn get_tracking(
        &self,
        _tracking_number: &str,
        _carrier_hint: Option<&str>,
    ) -> Result<TrackingSnapshot, ServiceError> {
        Err(self.unavailable())
    }
}

#[async_trait]
impl SentimentAnalyzer for Unintegrated {
    async fn score(&self, _text: &str) -> Result<SentimentScore, ServiceError> {
        Err(self.unavailable())
    }
}

#[async_trait]
impl ReplyTransport for Unintegrated {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), ServiceError> {
        Err(self.unavailable())
    }
}

#[derive(Debug, Serialize)]
struct StepSummary {
    name: String,
    ordinal: u32,
    status: &'static str,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RunReport {
    execution_id: String,
    success: bool,
    reply: Option<String>,
    escalation_reason: Option<String>,
    steps: Vec<StepSummary>,
}

fn init_logging(config: &AppConfig) {
    use shipshape_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

pub fn run(
    user: String,
    message_id: String,
    from: String,
    subject: String,
    body: String,
) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    init_logging(&config);

    let generator = match HttpTextGenerator::from_config(&config.llm) {
        Ok(generator) => generator,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "llm_init",
                format!("text generator could not be constructed: {error}"),
                3,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "run",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let pipeline = AgentPipeline::new(
            PipelineServices {
                orders: Arc::new(Unintegrated("order-management")),
                tracking: Arc::new(Unintegrated("carrier-tracking")),
                generator: Arc::new(generator),
                sentiment: Arc::new(Unintegrated("sentiment")),
                transport: Arc::new(Unintegrated("reply-transport")),
            },
            PipelineStores {
                runs: Arc::new(SqlRunStore::new(pool.clone())),
                audit: Arc::new(SqlAuditLogStore::new(pool.clone())),
                rules: Arc::new(SqlAgentRuleStore::new(pool.clone())),
                queue: Arc::new(SqlApprovalQueueStore::new(pool.clone())),
                metrics: Arc::new(SqlMetricsStore::new(pool.clone())),
            },
            config.pipeline.clone(),
            config.llm.max_tokens,
        );

        let result = pipeline.run(user, message_id, from, subject, body).await;
        pool.close().await;
        Ok::<ExecutionResult, (&'static str, String, u8)>(result)
    });

    match result {
        Ok(result) => {
            let report = RunReport {
                execution_id: result.execution_id.0,
                success: result.success,
                reply: result.reply,
                escalation_reason: result.escalation_reason,
                steps: result
                    .audit_trail
                    .iter()
                    .map(|log| StepSummary {
                        name: log.step_name.clone(),
                        ordinal: log.ordinal,
                        status: log.status.as_str(),
                        error: log.error.clone(),
                    })
                    .collect(),
            };
            let output = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|error| format!("run finished but report serialization failed: {error}"));
            CommandResult { exit_code: 0, output }
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("run", error_class, message, exit_code)
        }
    }
}
