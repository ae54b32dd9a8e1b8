use quotedesk_core::config::LoadOptions;
use quotedesk_core::domain::quotation::QuotationId;

use crate::commands::approve::DecisionOutput;
use crate::commands::{run_quotation_command, CommandResult};

pub fn run(
    options: LoadOptions,
    quotation_id: &str,
    approver: &str,
    reason: Option<String>,
) -> CommandResult {
    if approver.trim().is_empty() {
        let message = "approver must not be blank";
        return CommandResult::failure("reject", "invalid_argument", message, 2);
    }

    let quotation_id = QuotationId(quotation_id.to_owned());
    let approver = approver.to_owned();
    let reason = reason.filter(|reason| !reason.trim().is_empty());
    run_quotation_command("reject", options, |service| async move {
        match service.reject(&quotation_id, &approver, reason).await {
            Ok(quotation) => CommandResult::success_with_data(
                "reject",
                format!("quotation rejected by {approver}"),
                &DecisionOutput {
                    quotation_id: quotation.id.0.clone(),
                    approval_state: quotation.approval_state().as_str(),
                    version: quotation.version,
                },
            ),
            Err(error) => CommandResult::from_application_error("reject", &error),
        }
    })
}
