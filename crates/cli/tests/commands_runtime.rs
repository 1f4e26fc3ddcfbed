use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use shipshape_cli::commands::{config, doctor, migrate};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("SHIPSHAPE_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");

        // A fresh in-memory database has everything pending; the payload
        // reports what was applied.
        let message = payload["message"].as_str().expect("message string");
        assert!(message.contains("applied 1 pending migration"), "message was: {message}");
    });
}

#[test]
fn migrate_reports_config_failure_on_bad_override() {
    with_env(&[("SHIPSHAPE_RUN_BUDGET_SECS", "not-a-number")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_passes_all_checks_with_valid_env() {
    with_env(&[("SHIPSHAPE_DATABASE_URL", "sqlite::memory:")], || {
        let output = doctor::run(true);
        let payload = parse_payload(&output);
        assert_eq!(payload["overall_status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        assert!(checks.iter().any(|check| check["name"] == "database_connectivity"
            && check["status"] == "pass"));
    });
}

#[test]
fn config_attributes_env_overrides_to_their_source() {
    with_env(&[("SHIPSHAPE_DATABASE_URL", "sqlite::memory:")], || {
        let output = config::run();
        assert!(output.contains("database.url = sqlite::memory:"));
        assert!(output.contains("env (SHIPSHAPE_DATABASE_URL)"));
        assert!(output.contains("pipeline.run_budget_secs = 60 (source: default)"));
    });
}

#[test]
fn config_never_prints_secret_values() {
    with_env(
        &[
            ("SHIPSHAPE_DATABASE_URL", "sqlite::memory:"),
            ("SHIPSHAPE_LLM_API_KEY", "sk-super-secret"),
        ],
        || {
            let output = config::run();
            assert!(!output.contains("sk-super-secret"));
            assert!(output.contains("llm.api_key = <redacted>"));
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "SHIPSHAPE_DATABASE_URL",
        "SHIPSHAPE_DATABASE_MAX_CONNECTIONS",
        "SHIPSHAPE_LLM_API_KEY",
        "SHIPSHAPE_LLM_BASE_URL",
        "SHIPSHAPE_LLM_MODEL",
        "SHIPSHAPE_TRACKING_API_KEY",
        "SHIPSHAPE_TRACKING_BASE_URL",
        "SHIPSHAPE_RUN_BUDGET_SECS",
        "SHIPSHAPE_CALL_TIMEOUT_SECS",
        "SHIPSHAPE_LOG_LEVEL",
        "SHIPSHAPE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
