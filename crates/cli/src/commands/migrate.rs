use crate::commands::{run_database_task, CommandResult};
use claimdesk_db::migrations;

pub fn run() -> CommandResult {
    let applied = run_database_task("migrate", |pool| async move {
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))
    });

    match applied {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
