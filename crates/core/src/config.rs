use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::escalation::PriorityThresholds;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub tracking: TrackingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TrackingConfig {
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

/// Budgets and decision thresholds for the execution engine itself.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Wall-clock budget for one whole run; expiry abandons the run with a
    /// fatal_error step.
    pub run_budget_secs: u64,
    /// Bound applied to each external call.
    pub call_timeout_secs: u64,
    pub priority_thresholds: PriorityThresholds,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub run_budget_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://shipshape.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.1".to_string(),
                max_tokens: 400,
                timeout_secs: 30,
            },
            tracking: TrackingConfig { api_key: None, base_url: None, timeout_secs: 10 },
            pipeline: PipelineConfig {
                run_budget_secs: 60,
                call_timeout_secs: 15,
                priority_thresholds: PriorityThresholds::default(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    tracking: Option<TrackingPatch>,
    pipeline: Option<PipelinePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TrackingPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelinePatch {
    run_budget_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
    priority_high_pct: Option<u8>,
    priority_urgent_pct: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("shipshape.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(api_key.into());
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(tracking) = patch.tracking {
            if let Some(api_key) = tracking.api_key {
                self.tracking.api_key = Some(api_key.into());
            }
            if let Some(base_url) = tracking.base_url {
                self.tracking.base_url = Some(base_url);
            }
            if let Some(timeout_secs) = tracking.timeout_secs {
                self.tracking.timeout_secs = timeout_secs;
            }
        }

        if let Some(pipeline) = patch.pipeline {
            if let Some(run_budget_secs) = pipeline.run_budget_secs {
                self.pipeline.run_budget_secs = run_budget_secs;
            }
            if let Some(call_timeout_secs) = pipeline.call_timeout_secs {
                self.pipeline.call_timeout_secs = call_timeout_secs;
            }
            if let Some(high_pct) = pipeline.priority_high_pct {
                self.pipeline.priority_thresholds.high_pct = high_pct;
            }
            if let Some(urgent_pct) = pipeline.priority_urgent_pct {
                self.pipeline.priority_thresholds.urgent_pct = urgent_pct;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SHIPSHAPE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SHIPSHAPE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SHIPSHAPE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SHIPSHAPE_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("SHIPSHAPE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("SHIPSHAPE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SHIPSHAPE_TRACKING_API_KEY") {
            self.tracking.api_key = Some(value.into());
        }
        if let Some(value) = read_env("SHIPSHAPE_TRACKING_BASE_URL") {
            self.tracking.base_url = Some(value);
        }
        if let Some(value) = read_env("SHIPSHAPE_RUN_BUDGET_SECS") {
            self.pipeline.run_budget_secs = parse_u64("SHIPSHAPE_RUN_BUDGET_SECS", &value)?;
        }
        if let Some(value) = read_env("SHIPSHAPE_CALL_TIMEOUT_SECS") {
            self.pipeline.call_timeout_secs = parse_u64("SHIPSHAPE_CALL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SHIPSHAPE_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("SHIPSHAPE_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(api_key.into());
        }
        if let Some(run_budget_secs) = overrides.run_budget_secs {
            self.pipeline.run_budget_secs = run_budget_secs;
        }
        if let Some(call_timeout_secs) = overrides.call_timeout_secs {
            self.pipeline.call_timeout_secs = call_timeout_secs;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.pipeline.run_budget_secs == 0 {
            return Err(ConfigError::Validation(
                "pipeline.run_budget_secs must be positive".to_string(),
            ));
        }
        if self.pipeline.call_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "pipeline.call_timeout_secs must be positive".to_string(),
            ));
        }
        if self.pipeline.call_timeout_secs > self.pipeline.run_budget_secs {
            return Err(ConfigError::Validation(
                "pipeline.call_timeout_secs must not exceed pipeline.run_budget_secs".to_string(),
            ));
        }
        let thresholds = &self.pipeline.priority_thresholds;
        if thresholds.high_pct > 100 || thresholds.urgent_pct > 100 {
            return Err(ConfigError::Validation(
                "pipeline priority thresholds are percentages (0-100)".to_string(),
            ));
        }
        if thresholds.high_pct > thresholds.urgent_pct {
            return Err(ConfigError::Validation(
                "pipeline.priority_high_pct must not exceed pipeline.priority_urgent_pct"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    let default = PathBuf::from("shipshape.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.into() })
}
