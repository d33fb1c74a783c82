use std::env;
use std::sync::{Mutex, OnceLock};

use claimdesk_cli::commands::{config, migrate, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_database_url() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_returns_success_with_valid_env() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn seed_returns_deterministic_claim_summary() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected deterministic seed success");

        let payload = parse_payload(&result.output);
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains(
            "  - claim-demo-travel-001: under_review (High-value travel claim waiting on manager review)"
        ));
        assert!(message.contains("  - claim-demo-draft-001: draft (Editable draft)"));
        assert!(message.contains(
            "  - claim-demo-accom-001: reimbursed (Accommodation claim reimbursed end to end)"
        ));
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    with_env(&[("CLAIMDESK_DATABASE_URL", "sqlite::memory:")], || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let first_payload = parse_payload(&first.output);
        assert_eq!(first_payload["status"], "ok");

        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");
        let second_payload = parse_payload(&second.output);
        assert_eq!(second_payload["status"], "ok");

        assert_eq!(first_payload["message"], second_payload["message"]);
    });
}

#[test]
fn config_reports_env_sourced_values() {
    with_env(
        &[
            ("CLAIMDESK_DATABASE_URL", "sqlite::memory:"),
            ("CLAIMDESK_LOGGING_LEVEL", "debug"),
        ],
        || {
            let output = config::run();
            assert!(output.contains("- database.url = sqlite::memory: (source: env (CLAIMDESK_DATABASE_URL))"));
            assert!(output.contains("- logging.level = debug (source: env (CLAIMDESK_LOGGING_LEVEL))"));
            assert!(output.contains("- server.port = 8080 (source: default)"));
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
        "CLAIMDESK_DATABASE_URL",
        "CLAIMDESK_DATABASE_MAX_CONNECTIONS",
        "CLAIMDESK_DATABASE_TIMEOUT_SECS",
        "CLAIMDESK_SERVER_BIND_ADDRESS",
        "CLAIMDESK_SERVER_PORT",
        "CLAIMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "CLAIMDESK_CORS_ORIGIN",
        "CLAIMDESK_CORS_CREDENTIALS",
        "CLAIMDESK_CORS_COOKIE_SECURE",
        "CLAIMDESK_RECEIPTS_STORAGE_DIR",
        "CLAIMDESK_RECEIPTS_MAX_SIZE_BYTES",
        "CLAIMDESK_LOGGING_LEVEL",
        "CLAIMDESK_LOGGING_FORMAT",
        "CLAIMDESK_LOG_LEVEL",
        "CLAIMDESK_LOG_FORMAT",
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
