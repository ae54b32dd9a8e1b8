use quotedesk_core::config::LoadOptions;
use quotedesk_core::domain::approval::ApprovalStage;
use quotedesk_core::domain::quotation::QuotationId;
use serde::Serialize;

use crate::commands::{run_quotation_command, CommandResult};

#[derive(Debug, Serialize)]
pub(crate) struct DecisionOutput {
    pub quotation_id: String,
    pub approval_state: &'static str,
    pub version: u32,
}

pub fn run(
    options: LoadOptions,
    quotation_id: &str,
    stage: &str,
    approver: &str,
) -> CommandResult {
    let stage = match stage.parse::<ApprovalStage>() {
        Ok(stage) => stage,
        Err(error) => {
            return CommandResult::failure("approve", "invalid_argument", error, 2);
        }
    };
    if approver.trim().is_empty() {
        let message = "approver must not be blank";
        return CommandResult::failure("approve", "invalid_argument", message, 2);
    }

    let quotation_id = QuotationId(quotation_id.to_owned());
    let approver = approver.to_owned();
    run_quotation_command("approve", options, |service| async move {
        match service.grant_approval(&quotation_id, stage, &approver).await {
            Ok(quotation) => CommandResult::success_with_data(
                "approve",
                format!("{} approval granted by {approver}", stage.as_str()),
                &DecisionOutput {
                    quotation_id: quotation.id.0.clone(),
                    approval_state: quotation.approval_state().as_str(),
                    version: quotation.version,
                },
            ),
            Err(error) => CommandResult::from_application_error("approve", &error),
        }
    })
}
