use quotedesk_core::config::LoadOptions;
use quotedesk_db::migrations;

use crate::commands::{block_on, load_config, open_database, CommandResult};

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match load_config("migrate", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let result = block_on("migrate", async {
        let pool = open_database(&config).await?;
        let pending = migrations::pending_versions(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8));
        pool.close().await;
        pending
    });

    match result {
        Ok(Ok(pending)) if pending.is_empty() => {
            CommandResult::success("migrate", "applied pending migrations")
        }
        Ok(Ok(pending)) => CommandResult::failure(
            "migrate",
            "migration",
            format!("migrations still pending after run: {pending:?}"),
            5,
        ),
        Ok(Err(failure)) => CommandResult::from_failure("migrate", failure),
        Err(result) => result,
    }
}
