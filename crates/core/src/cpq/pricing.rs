use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cpq::valuation::round_money;
use crate::domain::quotation::QuotationId;
use crate::errors::DomainError;

/// Largest markup or tax percentage a quotation can store (`DECIMAL(5,2)`).
pub const MAX_PERCENTAGE: Decimal = Decimal::from_parts(99_999, 0, 0, false, 2);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationTotals {
    pub hardware_total: Decimal,
    pub personnel_total: Decimal,
    pub subtotal_base: Decimal,
    pub markup_amount: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTraceStep {
    pub stage: String,
    pub detail: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingTrace {
    pub quotation_id: QuotationId,
    pub currency: String,
    pub steps: Vec<PricingTraceStep>,
}

pub fn validate_percentage(field: &'static str, percentage: Decimal) -> Result<(), DomainError> {
    if percentage.is_sign_negative() && !percentage.is_zero() {
        return Err(DomainError::validation(field, "must not be negative"));
    }
    if percentage > MAX_PERCENTAGE {
        return Err(DomainError::validation(field, format!("must not exceed {MAX_PERCENTAGE}")));
    }
    Ok(())
}

/// Rolls valued lines up into quotation totals.
///
/// Markup applies to the line subtotal and tax applies to the marked-up subtotal, each
/// rounded to cents before the next step. The same inputs always produce the same totals.
pub fn aggregate(
    hardware_line_totals: &[Decimal],
    personnel_line_totals: &[Decimal],
    markup_percentage: Decimal,
    tax_percentage: Decimal,
) -> Result<QuotationTotals, DomainError> {
    validate_percentage("markup_percentage", markup_percentage)?;
    validate_percentage("tax_percentage", tax_percentage)?;

    let hardware_total = round_money(checked_sum(hardware_line_totals)?);
    let personnel_total = round_money(checked_sum(personnel_line_totals)?);
    let subtotal_base = checked_add(hardware_total, personnel_total)?;
    let markup_amount = percentage_of(subtotal_base, markup_percentage)?;
    let subtotal = checked_add(subtotal_base, markup_amount)?;
    let tax_amount = percentage_of(subtotal, tax_percentage)?;
    let total_amount = checked_add(subtotal, tax_amount)?;

    Ok(QuotationTotals {
        hardware_total,
        personnel_total,
        subtotal_base,
        markup_amount,
        subtotal,
        tax_amount,
        total_amount,
    })
}

impl QuotationTotals {
    pub fn trace(
        &self,
        quotation_id: &QuotationId,
        currency: &str,
        markup_percentage: Decimal,
        tax_percentage: Decimal,
    ) -> PricingTrace {
        let step = |stage: &str, detail: String, amount: Decimal| PricingTraceStep {
            stage: stage.to_owned(),
            detail,
            amount,
        };

        PricingTrace {
            quotation_id: quotation_id.clone(),
            currency: currency.to_owned(),
            steps: vec![
                step("hardware_total", "sum(hardware total_cost)".to_owned(), self.hardware_total),
                step(
                    "personnel_total",
                    "sum(personnel total_cost)".to_owned(),
                    self.personnel_total,
                ),
                step(
                    "subtotal_base",
                    "hardware_total + personnel_total".to_owned(),
                    self.subtotal_base,
                ),
                step(
                    "markup_amount",
                    format!("round(subtotal_base * {markup_percentage}%)"),
                    self.markup_amount,
                ),
                step("subtotal", "subtotal_base + markup_amount".to_owned(), self.subtotal),
                step(
                    "tax_amount",
                    format!("round(subtotal * {tax_percentage}%)"),
                    self.tax_amount,
                ),
                step("total_amount", "subtotal + tax_amount".to_owned(), self.total_amount),
            ],
        }
    }
}

fn checked_sum(amounts: &[Decimal]) -> Result<Decimal, DomainError> {
    amounts.iter().try_fold(Decimal::ZERO, |total, amount| checked_add(total, *amount))
}

fn checked_add(left: Decimal, right: Decimal) -> Result<Decimal, DomainError> {
    left.checked_add(right).ok_or_else(out_of_range)
}

fn percentage_of(amount: Decimal, percentage: Decimal) -> Result<Decimal, DomainError> {
    amount
        .checked_mul(percentage)
        .and_then(|scaled| scaled.checked_div(Decimal::ONE_HUNDRED))
        .map(round_money)
        .ok_or_else(out_of_range)
}

fn out_of_range() -> DomainError {
    DomainError::validation("total_amount", "quotation total is out of range")
}
