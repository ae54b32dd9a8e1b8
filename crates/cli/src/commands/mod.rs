pub mod approve;
pub mod config;
pub mod doctor;
pub mod migrate;
pub mod reject;
pub mod seed;
pub mod totals;

use std::future::Future;

use quotedesk_core::config::{AppConfig, LoadOptions};
use quotedesk_core::errors::{ApplicationError, DomainError};
use quotedesk_core::{QuotationService, ServiceSettings, TracingAuditSink};
use quotedesk_db::repositories::SqlQuotationStore;
use quotedesk_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;

pub type CliQuotationService = QuotationService<SqlQuotationStore, TracingAuditSink>;

/// Error class, message and exit code of a failed step.
pub(crate) type Failure = (&'static str, String, u8);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 5);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: Some(data),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }

    pub(crate) fn from_application_error(command: &str, error: &ApplicationError) -> Self {
        let (error_class, exit_code) = match error {
            ApplicationError::NotFound { .. } => ("not_found", 5),
            ApplicationError::Domain(DomainError::Validation { .. }) => ("validation", 5),
            ApplicationError::Domain(DomainError::FrozenQuotation { .. }) => {
                ("frozen_quotation", 5)
            }
            ApplicationError::Domain(
                DomainError::InvalidTransition(_) | DomainError::InvalidRequestTransition { .. },
            ) => ("invalid_transition", 5),
            ApplicationError::Domain(DomainError::UnknownLine { .. }) => ("not_found", 5),
            ApplicationError::ConcurrencyConflict { .. } => ("concurrency_conflict", 5),
            ApplicationError::Persistence(_) => ("persistence", 5),
            ApplicationError::Configuration(_) => ("config_validation", 2),
        };
        Self::failure(command, error_class, error.to_string(), exit_code)
    }
}

pub(crate) fn load_config(command: &str, options: LoadOptions) -> Result<AppConfig, CommandResult> {
    AppConfig::load(options).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn block_on<F: Future>(command: &str, future: F) -> Result<F::Output, CommandResult> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(
        |error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        },
    )?;
    Ok(runtime.block_on(future))
}

/// Connects and brings the schema up to date.
pub(crate) async fn open_database(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_config(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

/// Runs one quotation operation against the configured database.
pub(crate) fn run_quotation_command<F, Fut>(
    command: &str,
    options: LoadOptions,
    operation: F,
) -> CommandResult
where
    F: FnOnce(CliQuotationService) -> Fut,
    Fut: Future<Output = CommandResult>,
{
    let config = match load_config(command, options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let outcome = block_on(command, async {
        let pool = match open_database(&config).await {
            Ok(pool) => pool,
            Err(failure) => return CommandResult::from_failure(command, failure),
        };
        let service = QuotationService::new(
            SqlQuotationStore::new(pool.clone()),
            TracingAuditSink,
            ServiceSettings::from_config(&config),
        );
        let result = operation(service).await;
        pool.close().await;
        result
    });

    outcome.unwrap_or_else(|result| result)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use quotedesk_core::domain::approval::{ApprovalStage, ApprovalState};
    use quotedesk_core::errors::{ApplicationError, DomainError};
    use quotedesk_core::flows::FlowTransitionError;
    use serde_json::Value;

    use super::CommandResult;

    #[test]
    fn data_is_omitted_from_plain_results() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        let payload: Value = serde_json::from_str(&result.output).expect("json");
        assert!(payload.get("data").is_none());
        assert_eq!(payload["error_class"], Value::Null);
    }

    #[test]
    fn application_errors_map_to_stable_classes() {
        let cases = [
            (ApplicationError::not_found("quotation", "qt-1"), "not_found", 5),
            (
                ApplicationError::Domain(DomainError::InvalidTransition(
                    FlowTransitionError::StageOutOfOrder {
                        state: ApprovalState::Draft,
                        stage: ApprovalStage::Final,
                        required: Some(ApprovalStage::Sales),
                    },
                )),
                "invalid_transition",
                5,
            ),
            (
                ApplicationError::ConcurrencyConflict { quotation_id: "qt-1".to_owned() },
                "concurrency_conflict",
                5,
            ),
            (ApplicationError::Configuration("bad".to_owned()), "config_validation", 2),
        ];

        for (error, class, exit_code) in cases {
            let result = CommandResult::from_application_error("approve", &error);
            let payload: Value = serde_json::from_str(&result.output).expect("json");
            assert_eq!(payload["error_class"], class);
            assert_eq!(payload["status"], "error");
            assert_eq!(result.exit_code, exit_code);
        }
    }
}
