use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use shipshape_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: Option<&str>| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", Some("SHIPSHAPE_DATABASE_URL")),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", Some("SHIPSHAPE_DATABASE_MAX_CONNECTIONS")),
    ));

    lines.push(render_line(
        "llm.base_url",
        &config.llm.base_url,
        source("llm.base_url", Some("SHIPSHAPE_LLM_BASE_URL")),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", Some("SHIPSHAPE_LLM_MODEL")),
    ));
    lines.push(render_line(
        "llm.max_tokens",
        &config.llm.max_tokens.to_string(),
        source("llm.max_tokens", None),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", Some("SHIPSHAPE_LLM_API_KEY")),
    ));

    lines.push(render_line(
        "tracking.base_url",
        config.tracking.base_url.as_deref().unwrap_or("<unset>"),
        source("tracking.base_url", Some("SHIPSHAPE_TRACKING_BASE_URL")),
    ));
    let tracking_api_key = if config.tracking.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "tracking.api_key",
        tracking_api_key,
        source("tracking.api_key", Some("SHIPSHAPE_TRACKING_API_KEY")),
    ));

    lines.push(render_line(
        "pipeline.run_budget_secs",
        &config.pipeline.run_budget_secs.to_string(),
        source("pipeline.run_budget_secs", Some("SHIPSHAPE_RUN_BUDGET_SECS")),
    ));
    lines.push(render_line(
        "pipeline.call_timeout_secs",
        &config.pipeline.call_timeout_secs.to_string(),
        source("pipeline.call_timeout_secs", Some("SHIPSHAPE_CALL_TIMEOUT_SECS")),
    ));
    lines.push(render_line(
        "pipeline.priority_high_pct",
        &config.pipeline.priority_thresholds.high_pct.to_string(),
        source("pipeline.priority_high_pct", None),
    ));
    lines.push(render_line(
        "pipeline.priority_urgent_pct",
        &config.pipeline.priority_thresholds.urgent_pct.to_string(),
        source("pipeline.priority_urgent_pct", None),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", Some("SHIPSHAPE_LOG_LEVEL")),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", Some("SHIPSHAPE_LOG_FORMAT")),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("shipshape.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/shipshape.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
