pub mod config;
pub mod doctor;
pub mod migrate;
pub mod seed;

use std::future::Future;

use claimdesk_core::config::{AppConfig, LoadOptions};
use claimdesk_db::{connect, DbPool};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum OutcomeStatus {
    Ok,
    Error,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: OutcomeStatus,
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: serialize_payload(CommandOutcome {
                command,
                status: OutcomeStatus::Ok,
                error_class: None,
                message: message.into(),
            }),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self {
            exit_code,
            output: serialize_payload(CommandOutcome {
                command,
                status: OutcomeStatus::Error,
                error_class: Some(error_class),
                message: message.into(),
            }),
        }
    }
}

fn serialize_payload(payload: CommandOutcome<'_>) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        serde_json::json!({
            "command": payload.command,
            "status": "error",
            "error_class": "serialization",
            "message": error.to_string(),
        })
        .to_string()
    })
}

/// Per-task failure: an error class for the JSON outcome plus the
/// process exit code.
pub(crate) type TaskError = (&'static str, String, u8);

/// Load config, bring up a current-thread runtime, open the claim
/// database, and run the task. The pool is closed before returning so
/// WAL files are checkpointed even on failure.
pub(crate) fn run_database_task<T, F, Fut>(command: &str, task: F) -> Result<T, CommandResult>
where
    F: FnOnce(DbPool) -> Fut,
    Fut: Future<Output = Result<T, TaskError>>,
{
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    runtime
        .block_on(async {
            let pool = connect(&config.database)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
            let outcome = task(pool.clone()).await;
            pool.close().await;
            outcome
        })
        .map_err(|(error_class, message, exit_code)| {
            CommandResult::failure(command, error_class, message, exit_code)
        })
}
