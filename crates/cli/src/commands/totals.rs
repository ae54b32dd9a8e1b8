use quotedesk_core::config::LoadOptions;
use quotedesk_core::cpq::PricingTraceStep;
use quotedesk_core::domain::quotation::QuotationId;
use serde::Serialize;

use crate::commands::{run_quotation_command, CommandResult};

#[derive(Debug, Serialize)]
struct TotalsOutput {
    quotation_id: String,
    quotation_number: String,
    currency: String,
    approval_state: &'static str,
    hardware_lines: usize,
    personnel_lines: usize,
    markup_percentage: String,
    tax_percentage: String,
    hardware_total: String,
    personnel_total: String,
    subtotal_base: String,
    markup_amount: String,
    subtotal: String,
    tax_amount: String,
    total_amount: String,
    trace: Vec<PricingTraceStep>,
}

pub fn run(options: LoadOptions, quotation_id: &str) -> CommandResult {
    let quotation_id = QuotationId(quotation_id.to_owned());
    run_quotation_command("totals", options, |service| async move {
        let quotation = match service.get_quotation(&quotation_id).await {
            Ok(quotation) => quotation,
            Err(error) => return CommandResult::from_application_error("totals", &error),
        };
        let totals = quotation.totals();
        let output = TotalsOutput {
            quotation_id: quotation.id.0.clone(),
            quotation_number: quotation.quotation_number.clone(),
            currency: quotation.currency.clone(),
            approval_state: quotation.approval_state().as_str(),
            hardware_lines: quotation.hardware_lines().len(),
            personnel_lines: quotation.personnel_lines().len(),
            markup_percentage: quotation.markup_percentage().to_string(),
            tax_percentage: quotation.tax_percentage().to_string(),
            hardware_total: totals.hardware_total.to_string(),
            personnel_total: totals.personnel_total.to_string(),
            subtotal_base: totals.subtotal_base.to_string(),
            markup_amount: totals.markup_amount.to_string(),
            subtotal: totals.subtotal.to_string(),
            tax_amount: totals.tax_amount.to_string(),
            total_amount: totals.total_amount.to_string(),
            trace: quotation.pricing_trace().steps,
        };
        CommandResult::success_with_data(
            "totals",
            format!(
                "{} total {} {}",
                output.quotation_number, output.total_amount, output.currency
            ),
            &output,
        )
    })
}
