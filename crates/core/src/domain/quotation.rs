use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cpq::pricing::{self, PricingTrace, QuotationTotals};
use crate::cpq::valuation::value_line;
use crate::domain::approval::{
    ApprovalRecord, ApprovalStage, ApprovalState, ApprovalTrail, RejectionRecord,
};
use crate::domain::catalog::{
    validate_currency, CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
use crate::domain::request::CustomerRequestId;
use crate::errors::DomainError;

pub const MAX_QUOTATION_NUMBER_LEN: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationId(pub String);

impl QuotationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuotationLineId(pub String);

impl QuotationLineId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Hardware,
    Personnel,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Personnel => "personnel",
        }
    }
}

/// Hardware line; `total_cost` is only ever assigned by valuation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuotationHardwareLine {
    id: QuotationLineId,
    hardware_item_id: HardwareItemId,
    quantity: u32,
    unit_cost: Decimal,
    total_cost: Decimal,
    notes: String,
}

impl QuotationHardwareLine {
    pub fn new(
        hardware_item_id: HardwareItemId,
        quantity: u32,
        unit_cost: Decimal,
    ) -> Result<Self, DomainError> {
        Self::restore(QuotationLineId::generate(), hardware_item_id, quantity, unit_cost, "")
    }

    /// Rebuilds a stored line, revaluing it from its quantity and cost snapshot.
    pub fn restore(
        id: QuotationLineId,
        hardware_item_id: HardwareItemId,
        quantity: u32,
        unit_cost: Decimal,
        notes: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let total_cost = value_line(unit_cost, "unit_cost", Decimal::from(quantity), "quantity")?;
        Ok(Self { id, hardware_item_id, quantity, unit_cost, total_cost, notes: notes.into() })
    }

    fn reprice(&self, quantity: u32, unit_cost: Decimal) -> Result<Self, DomainError> {
        Self::restore(
            self.id.clone(),
            self.hardware_item_id.clone(),
            quantity,
            unit_cost,
            self.notes.clone(),
        )
    }

    pub fn id(&self) -> &QuotationLineId {
        &self.id
    }

    pub fn hardware_item_id(&self) -> &HardwareItemId {
        &self.hardware_item_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }
}

/// Personnel line; `total_cost` is only ever assigned by valuation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuotationPersonnelLine {
    id: QuotationLineId,
    rate_category_id: RateCategoryId,
    hours: Decimal,
    hourly_rate: Decimal,
    total_cost: Decimal,
    description: String,
}

impl QuotationPersonnelLine {
    pub fn new(
        rate_category_id: RateCategoryId,
        hours: Decimal,
        hourly_rate: Decimal,
    ) -> Result<Self, DomainError> {
        Self::restore(QuotationLineId::generate(), rate_category_id, hours, hourly_rate, "")
    }

    pub fn restore(
        id: QuotationLineId,
        rate_category_id: RateCategoryId,
        hours: Decimal,
        hourly_rate: Decimal,
        description: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let total_cost = value_line(hourly_rate, "hourly_rate", hours, "hours")?;
        Ok(Self {
            id,
            rate_category_id,
            hours,
            hourly_rate,
            total_cost,
            description: description.into(),
        })
    }

    fn reprice(&self, hours: Decimal, hourly_rate: Decimal) -> Result<Self, DomainError> {
        Self::restore(
            self.id.clone(),
            self.rate_category_id.clone(),
            hours,
            hourly_rate,
            self.description.clone(),
        )
    }

    pub fn id(&self) -> &QuotationLineId {
        &self.id
    }

    pub fn rate_category_id(&self) -> &RateCategoryId {
        &self.rate_category_id
    }

    pub fn hours(&self) -> Decimal {
        self.hours
    }

    pub fn hourly_rate(&self) -> Decimal {
        self.hourly_rate
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Everything a store persists for a quotation. Derived totals are not part of it.
#[derive(Clone, Debug)]
pub struct QuotationParts {
    pub id: QuotationId,
    pub quotation_number: String,
    pub customer_request_id: CustomerRequestId,
    pub created_by: String,
    pub currency: String,
    pub notes: String,
    pub valid_until: Option<NaiveDate>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub hardware_lines: Vec<QuotationHardwareLine>,
    pub personnel_lines: Vec<QuotationPersonnelLine>,
    pub markup_percentage: Decimal,
    pub tax_percentage: Decimal,
    pub approvals: Vec<ApprovalRecord>,
    pub rejection: Option<RejectionRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Quotation {
    pub id: QuotationId,
    pub quotation_number: String,
    pub customer_request_id: CustomerRequestId,
    pub created_by: String,
    pub currency: String,
    pub notes: String,
    pub valid_until: Option<NaiveDate>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    hardware_lines: Vec<QuotationHardwareLine>,
    personnel_lines: Vec<QuotationPersonnelLine>,
    markup_percentage: Decimal,
    tax_percentage: Decimal,
    totals: QuotationTotals,
    approvals: ApprovalTrail,
}

impl Quotation {
    pub fn new(
        quotation_number: impl Into<String>,
        customer_request_id: CustomerRequestId,
        created_by: impl Into<String>,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let quotation_number = quotation_number.into();
        let created_by = created_by.into();
        let currency = currency.into();
        validate_quotation_number(&quotation_number)?;
        if created_by.trim().is_empty() {
            return Err(DomainError::validation("created_by", "must identify the creator"));
        }
        validate_currency(&currency)?;

        Ok(Self {
            id: QuotationId::generate(),
            quotation_number,
            customer_request_id,
            created_by,
            currency,
            notes: String::new(),
            valid_until: None,
            version: 0,
            created_at: now,
            updated_at: now,
            hardware_lines: Vec::new(),
            personnel_lines: Vec::new(),
            markup_percentage: Decimal::ZERO,
            tax_percentage: Decimal::ZERO,
            totals: QuotationTotals::default(),
            approvals: ApprovalTrail::default(),
        })
    }

    /// Reassembles a stored quotation. Totals are recomputed from the lines and the approval
    /// state is replayed from the log, so nothing derived is trusted from storage.
    pub fn from_parts(parts: QuotationParts) -> Result<Self, DomainError> {
        let totals = totals_for(
            &parts.hardware_lines,
            &parts.personnel_lines,
            parts.markup_percentage,
            parts.tax_percentage,
        )?;
        let approvals = ApprovalTrail::replay(parts.approvals, parts.rejection)?;

        Ok(Self {
            id: parts.id,
            quotation_number: parts.quotation_number,
            customer_request_id: parts.customer_request_id,
            created_by: parts.created_by,
            currency: parts.currency,
            notes: parts.notes,
            valid_until: parts.valid_until,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            hardware_lines: parts.hardware_lines,
            personnel_lines: parts.personnel_lines,
            markup_percentage: parts.markup_percentage,
            tax_percentage: parts.tax_percentage,
            totals,
            approvals,
        })
    }

    pub fn hardware_lines(&self) -> &[QuotationHardwareLine] {
        &self.hardware_lines
    }

    pub fn personnel_lines(&self) -> &[QuotationPersonnelLine] {
        &self.personnel_lines
    }

    pub fn line_count(&self) -> usize {
        self.hardware_lines.len() + self.personnel_lines.len()
    }

    pub fn markup_percentage(&self) -> Decimal {
        self.markup_percentage
    }

    pub fn tax_percentage(&self) -> Decimal {
        self.tax_percentage
    }

    pub fn totals(&self) -> QuotationTotals {
        self.totals
    }

    pub fn pricing_trace(&self) -> PricingTrace {
        self.totals.trace(&self.id, &self.currency, self.markup_percentage, self.tax_percentage)
    }

    pub fn approval_state(&self) -> ApprovalState {
        self.approvals.state()
    }

    pub fn approval_trail(&self) -> &ApprovalTrail {
        &self.approvals
    }

    /// Open quotations can still be approved or rejected.
    pub fn is_open(&self) -> bool {
        !self.approvals.state().is_terminal()
    }

    pub fn ensure_editable(&self) -> Result<(), DomainError> {
        let state = self.approvals.state();
        if state.is_frozen() {
            return Err(DomainError::FrozenQuotation { quotation_id: self.id.clone(), state });
        }
        Ok(())
    }

    /// Adds a line for `item`, or updates the existing one in place.
    ///
    /// A new line snapshots the catalog cost unless `unit_cost_override` is given. An update
    /// keeps the line's existing snapshot unless an override is given, so catalog repricing
    /// never leaks into a quotation implicitly.
    pub fn upsert_hardware_line(
        &mut self,
        item: &CatalogHardwareItem,
        quantity: u32,
        unit_cost_override: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<QuotationHardwareLine, DomainError> {
        self.ensure_editable()?;

        let mut hardware_lines = self.hardware_lines.clone();
        let existing = hardware_lines.iter().position(|line| line.hardware_item_id == item.id);
        let line = match existing {
            Some(index) => {
                let current = &hardware_lines[index];
                let line =
                    current.reprice(quantity, unit_cost_override.unwrap_or(current.unit_cost))?;
                hardware_lines[index] = line.clone();
                line
            }
            None => {
                if !item.active {
                    return Err(DomainError::validation(
                        "hardware_item_id",
                        format!("hardware item `{}` is inactive", item.id.0),
                    ));
                }
                self.ensure_currency(&item.currency)?;
                let line = QuotationHardwareLine::new(
                    item.id.clone(),
                    quantity,
                    unit_cost_override.unwrap_or(item.unit_cost),
                )?;
                hardware_lines.push(line.clone());
                line
            }
        };

        self.commit_lines(hardware_lines, self.personnel_lines.clone(), now)?;
        Ok(line)
    }

    pub fn upsert_personnel_line(
        &mut self,
        category: &PersonnelRateCategory,
        hours: Decimal,
        hourly_rate_override: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<QuotationPersonnelLine, DomainError> {
        self.ensure_editable()?;

        let mut personnel_lines = self.personnel_lines.clone();
        let existing =
            personnel_lines.iter().position(|line| line.rate_category_id == category.id);
        let line = match existing {
            Some(index) => {
                let current = &personnel_lines[index];
                let line =
                    current.reprice(hours, hourly_rate_override.unwrap_or(current.hourly_rate))?;
                personnel_lines[index] = line.clone();
                line
            }
            None => {
                if !category.active {
                    return Err(DomainError::validation(
                        "rate_category_id",
                        format!("rate category `{}` is inactive", category.id.0),
                    ));
                }
                self.ensure_currency(&category.currency)?;
                let line = QuotationPersonnelLine::new(
                    category.id.clone(),
                    hours,
                    hourly_rate_override.unwrap_or(category.hourly_rate),
                )?;
                personnel_lines.push(line.clone());
                line
            }
        };

        self.commit_lines(self.hardware_lines.clone(), personnel_lines, now)?;
        Ok(line)
    }

    pub fn remove_line(
        &mut self,
        line_id: &QuotationLineId,
        now: DateTime<Utc>,
    ) -> Result<LineKind, DomainError> {
        self.ensure_editable()?;

        let mut hardware_lines = self.hardware_lines.clone();
        let mut personnel_lines = self.personnel_lines.clone();
        let kind = if let Some(index) = hardware_lines.iter().position(|line| &line.id == line_id) {
            hardware_lines.remove(index);
            LineKind::Hardware
        } else if let Some(index) = personnel_lines.iter().position(|line| &line.id == line_id) {
            personnel_lines.remove(index);
            LineKind::Personnel
        } else {
            return Err(DomainError::UnknownLine {
                quotation_id: self.id.clone(),
                line_id: line_id.0.clone(),
            });
        };

        self.commit_lines(hardware_lines, personnel_lines, now)?;
        Ok(kind)
    }

    pub fn set_markup_percentage(
        &mut self,
        percentage: Decimal,
        now: DateTime<Utc>,
    ) -> Result<QuotationTotals, DomainError> {
        self.ensure_editable()?;
        let (hardware_lines, personnel_lines) =
            (self.hardware_lines.clone(), self.personnel_lines.clone());
        self.commit(hardware_lines, personnel_lines, percentage, self.tax_percentage, now)?;
        Ok(self.totals)
    }

    pub fn set_tax_percentage(
        &mut self,
        percentage: Decimal,
        now: DateTime<Utc>,
    ) -> Result<QuotationTotals, DomainError> {
        self.ensure_editable()?;
        let (hardware_lines, personnel_lines) =
            (self.hardware_lines.clone(), self.personnel_lines.clone());
        self.commit(hardware_lines, personnel_lines, self.markup_percentage, percentage, now)?;
        Ok(self.totals)
    }

    pub fn grant_approval(
        &mut self,
        stage: ApprovalStage,
        approver_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ApprovalRecord, DomainError> {
        let record = self.approvals.grant(stage, approver_id, now)?;
        self.updated_at = now;
        Ok(record)
    }

    pub fn reject(
        &mut self,
        rejected_by: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RejectionRecord, DomainError> {
        let record = self.approvals.reject(rejected_by, reason, now)?.clone();
        self.updated_at = now;
        Ok(record)
    }

    fn ensure_currency(&self, currency: &str) -> Result<(), DomainError> {
        if currency != self.currency {
            return Err(DomainError::validation(
                "currency",
                format!(
                    "catalog currency {currency} does not match quotation currency {}",
                    self.currency
                ),
            ));
        }
        Ok(())
    }

    fn commit_lines(
        &mut self,
        hardware_lines: Vec<QuotationHardwareLine>,
        personnel_lines: Vec<QuotationPersonnelLine>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let (markup, tax) = (self.markup_percentage, self.tax_percentage);
        self.commit(hardware_lines, personnel_lines, markup, tax, now)
    }

    /// Single write path for pricing inputs: totals are recomputed from the candidate state
    /// and nothing is assigned unless the recomputation succeeds.
    fn commit(
        &mut self,
        hardware_lines: Vec<QuotationHardwareLine>,
        personnel_lines: Vec<QuotationPersonnelLine>,
        markup_percentage: Decimal,
        tax_percentage: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let totals =
            totals_for(&hardware_lines, &personnel_lines, markup_percentage, tax_percentage)?;
        self.hardware_lines = hardware_lines;
        self.personnel_lines = personnel_lines;
        self.markup_percentage = markup_percentage;
        self.tax_percentage = tax_percentage;
        self.totals = totals;
        self.updated_at = now;
        Ok(())
    }
}

pub fn validate_quotation_number(quotation_number: &str) -> Result<(), DomainError> {
    if quotation_number.trim().is_empty() {
        return Err(DomainError::validation("quotation_number", "must not be blank"));
    }
    if quotation_number.len() > MAX_QUOTATION_NUMBER_LEN {
        return Err(DomainError::validation(
            "quotation_number",
            format!("must be at most {MAX_QUOTATION_NUMBER_LEN} characters"),
        ));
    }
    Ok(())
}

fn totals_for(
    hardware_lines: &[QuotationHardwareLine],
    personnel_lines: &[QuotationPersonnelLine],
    markup_percentage: Decimal,
    tax_percentage: Decimal,
) -> Result<QuotationTotals, DomainError> {
    let hardware: Vec<Decimal> = hardware_lines.iter().map(|line| line.total_cost).collect();
    let personnel: Vec<Decimal> = personnel_lines.iter().map(|line| line.total_cost).collect();
    pricing::aggregate(&hardware, &personnel, markup_percentage, tax_percentage)
}
