use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::AppConfig;
use crate::cpq::pricing::QuotationTotals;
use crate::domain::approval::{ApprovalStage, ApprovalState};
use crate::domain::catalog::{HardwareItemId, RateCategoryId};
use crate::domain::quotation::{
    validate_quotation_number, Quotation, QuotationHardwareLine, QuotationId, QuotationLineId,
    QuotationPersonnelLine,
};
use crate::domain::request::{CustomerRequestId, QuotationMilestone};
use crate::errors::{ApplicationError, DomainError};
use crate::store::{format_quotation_number, QuotationStore, RequestStatusChange, StoreError};

const SERVICE_ACTOR: &str = "quotation-service";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSettings {
    pub currency: String,
    pub quotation_number_prefix: String,
    pub default_markup_percentage: Decimal,
    pub default_tax_percentage: Decimal,
    pub max_write_attempts: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            currency: config.pricing.currency.clone(),
            quotation_number_prefix: config.pricing.quotation_number_prefix.clone(),
            default_markup_percentage: config.pricing.default_markup_percentage,
            default_tax_percentage: config.pricing.default_tax_percentage,
            max_write_attempts: config.concurrency.max_write_attempts.max(1),
        }
    }
}

/// Creation form for a quotation; unset fields fall back to configured defaults.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuotationDraft {
    pub customer_request_id: CustomerRequestId,
    pub created_by: String,
    pub quotation_number: Option<String>,
    pub markup_percentage: Option<Decimal>,
    pub tax_percentage: Option<Decimal>,
    pub notes: Option<String>,
    pub valid_until: Option<NaiveDate>,
}

impl QuotationDraft {
    pub fn new(customer_request_id: CustomerRequestId, created_by: impl Into<String>) -> Self {
        Self {
            customer_request_id,
            created_by: created_by.into(),
            quotation_number: None,
            markup_percentage: None,
            tax_percentage: None,
            notes: None,
            valid_until: None,
        }
    }
}

/// How a successful quotation write moves the owning customer request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RequestEffect {
    None,
    Priced,
    FinallyApproved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PercentageKind {
    Markup,
    Tax,
}

impl PercentageKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Tax => "tax",
        }
    }

    fn event_name(&self) -> &'static str {
        match self {
            Self::Markup => "quotation.markup.updated",
            Self::Tax => "quotation.tax.updated",
        }
    }
}

pub struct QuotationService<S, A> {
    store: S,
    audit: A,
    settings: ServiceSettings,
}

impl<S, A> QuotationService<S, A>
where
    S: QuotationStore,
    A: AuditSink,
{
    pub fn new(store: S, audit: A, settings: ServiceSettings) -> Self {
        Self { store, audit, settings }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub async fn create_quotation(
        &self,
        customer_request_id: &CustomerRequestId,
        creator_id: &str,
    ) -> Result<Quotation, ApplicationError> {
        self.create_quotation_with(QuotationDraft::new(customer_request_id.clone(), creator_id))
            .await
    }

    pub async fn create_quotation_with(
        &self,
        draft: QuotationDraft,
    ) -> Result<Quotation, ApplicationError> {
        let audit = AuditContext::new(None, new_correlation_id(), draft.created_by.clone());
        let result = self.create_with_retries(&draft, &audit).await;
        match &result {
            Ok(quotation) => {
                info!(
                    event_name = "quotation.created",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation.id.0,
                    quotation_number = %quotation.quotation_number,
                    customer_request_id = %quotation.customer_request_id.0,
                    "quotation created"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit.for_quotation(&quotation.id),
                        "quotation.created",
                        AuditCategory::Quotation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("quotation_number", quotation.quotation_number.clone())
                    .with_metadata("customer_request_id", quotation.customer_request_id.0.clone()),
                );
            }
            Err(error) => self.emit_failure(&audit, "quotation.create_failed", error),
        }
        result
    }

    async fn create_with_retries(
        &self,
        draft: &QuotationDraft,
        audit: &AuditContext,
    ) -> Result<Quotation, ApplicationError> {
        if let Some(number) = &draft.quotation_number {
            validate_quotation_number(number)?;
        }

        let max_attempts = self.settings.max_write_attempts;
        let mut attempt = 1;
        loop {
            let now = Utc::now();
            let request = self
                .store
                .find_request(&draft.customer_request_id)
                .await
                .map_err(|error| error.into_application(&draft.customer_request_id.0))?
                .ok_or_else(|| {
                    ApplicationError::not_found("customer_request", &draft.customer_request_id.0)
                })?;

            let quotation_number = match &draft.quotation_number {
                Some(number) => number.clone(),
                None => self.generate_quotation_number(now).await?,
            };

            let mut quotation = Quotation::new(
                quotation_number,
                request.id.clone(),
                draft.created_by.clone(),
                self.settings.currency.clone(),
                now,
            )?;
            quotation.notes = draft.notes.clone().unwrap_or_default();
            quotation.valid_until = draft.valid_until;
            quotation.set_markup_percentage(
                draft.markup_percentage.unwrap_or(self.settings.default_markup_percentage),
                now,
            )?;
            quotation.set_tax_percentage(
                draft.tax_percentage.unwrap_or(self.settings.default_tax_percentage),
                now,
            )?;

            let request_change =
                request.status_after(QuotationMilestone::Created).map(|to| {
                    RequestStatusChange::new(request.id.clone(), request.status, to, now)
                });

            match self.store.insert_quotation(&quotation, request_change.as_ref()).await {
                Ok(version) => {
                    quotation.version = version;
                    return Ok(quotation);
                }
                Err(StoreError::Duplicate { .. }) if draft.quotation_number.is_some() => {
                    return Err(DomainError::validation(
                        "quotation_number",
                        format!("`{}` is already in use", quotation.quotation_number),
                    )
                    .into());
                }
                Err(error)
                    if attempt < max_attempts
                        && (error.is_contention()
                            || matches!(error, StoreError::Duplicate { .. })) =>
                {
                    self.log_retry(audit, &quotation.id, attempt, &error);
                    attempt += 1;
                }
                Err(error) => return Err(error.into_application(&quotation.id.0)),
            }
        }
    }

    async fn generate_quotation_number(
        &self,
        now: DateTime<Utc>,
    ) -> Result<String, ApplicationError> {
        let prefix = &self.settings.quotation_number_prefix;
        let year = now.year();
        let sequence = self
            .store
            .next_quotation_sequence(prefix, year)
            .await
            .map_err(|error| error.into_application(prefix.as_str()))?;
        Ok(format_quotation_number(prefix, year, sequence))
    }

    pub async fn add_or_update_hardware_line(
        &self,
        quotation_id: &QuotationId,
        hardware_item_id: &HardwareItemId,
        quantity: u32,
        unit_cost_override: Option<Decimal>,
    ) -> Result<QuotationHardwareLine, ApplicationError> {
        let audit = self.service_audit(quotation_id);
        let result = async {
            let item = self
                .store
                .find_hardware_item(hardware_item_id)
                .await
                .map_err(|error| error.into_application(&quotation_id.0))?
                .ok_or_else(|| ApplicationError::not_found("hardware_item", &hardware_item_id.0))?;
            self.mutate(quotation_id, &audit, RequestEffect::Priced, |quotation, now| {
                quotation.upsert_hardware_line(&item, quantity, unit_cost_override, now)
            })
            .await
        }
        .await;

        match &result {
            Ok((quotation, line)) => {
                info!(
                    event_name = "quotation.line.upserted",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    line_kind = "hardware",
                    line_id = %line.id().0,
                    total_amount = %quotation.totals().total_amount,
                    "hardware line upserted"
                );
                self.emit_priced(&audit, "quotation.line.upserted", quotation, |event| {
                    event
                        .with_metadata("line_kind", "hardware")
                        .with_metadata("line_id", line.id().0.clone())
                        .with_metadata("hardware_item_id", hardware_item_id.0.clone())
                        .with_metadata("quantity", line.quantity().to_string())
                        .with_metadata("line_total", line.total_cost().to_string())
                });
            }
            Err(error) => self.emit_failure(&audit, "quotation.line.upsert_rejected", error),
        }
        result.map(|(_, line)| line)
    }

    pub async fn add_or_update_personnel_line(
        &self,
        quotation_id: &QuotationId,
        rate_category_id: &RateCategoryId,
        hours: Decimal,
        rate_override: Option<Decimal>,
    ) -> Result<QuotationPersonnelLine, ApplicationError> {
        let audit = self.service_audit(quotation_id);
        let result = async {
            let category = self
                .store
                .find_rate_category(rate_category_id)
                .await
                .map_err(|error| error.into_application(&quotation_id.0))?
                .ok_or_else(|| ApplicationError::not_found("rate_category", &rate_category_id.0))?;
            self.mutate(quotation_id, &audit, RequestEffect::Priced, |quotation, now| {
                quotation.upsert_personnel_line(&category, hours, rate_override, now)
            })
            .await
        }
        .await;

        match &result {
            Ok((quotation, line)) => {
                info!(
                    event_name = "quotation.line.upserted",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    line_kind = "personnel",
                    line_id = %line.id().0,
                    total_amount = %quotation.totals().total_amount,
                    "personnel line upserted"
                );
                self.emit_priced(&audit, "quotation.line.upserted", quotation, |event| {
                    event
                        .with_metadata("line_kind", "personnel")
                        .with_metadata("line_id", line.id().0.clone())
                        .with_metadata("rate_category_id", rate_category_id.0.clone())
                        .with_metadata("hours", line.hours().to_string())
                        .with_metadata("line_total", line.total_cost().to_string())
                });
            }
            Err(error) => self.emit_failure(&audit, "quotation.line.upsert_rejected", error),
        }
        result.map(|(_, line)| line)
    }

    pub async fn remove_line(
        &self,
        quotation_id: &QuotationId,
        line_id: &QuotationLineId,
    ) -> Result<(), ApplicationError> {
        let audit = self.service_audit(quotation_id);
        let result = self
            .mutate(quotation_id, &audit, RequestEffect::None, |quotation, now| {
                quotation.remove_line(line_id, now)
            })
            .await;

        match &result {
            Ok((quotation, kind)) => {
                info!(
                    event_name = "quotation.line.removed",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    line_kind = kind.as_str(),
                    line_id = %line_id.0,
                    "quotation line removed"
                );
                self.emit_priced(&audit, "quotation.line.removed", quotation, |event| {
                    event
                        .with_metadata("line_kind", kind.as_str())
                        .with_metadata("line_id", line_id.0.clone())
                });
            }
            Err(error) => self.emit_failure(&audit, "quotation.line.remove_rejected", error),
        }
        result.map(|_| ())
    }

    pub async fn set_markup(
        &self,
        quotation_id: &QuotationId,
        percentage: Decimal,
    ) -> Result<QuotationTotals, ApplicationError> {
        self.set_percentage(quotation_id, percentage, PercentageKind::Markup).await
    }

    pub async fn set_tax(
        &self,
        quotation_id: &QuotationId,
        percentage: Decimal,
    ) -> Result<QuotationTotals, ApplicationError> {
        self.set_percentage(quotation_id, percentage, PercentageKind::Tax).await
    }

    async fn set_percentage(
        &self,
        quotation_id: &QuotationId,
        percentage: Decimal,
        kind: PercentageKind,
    ) -> Result<QuotationTotals, ApplicationError> {
        let audit = self.service_audit(quotation_id);
        let result = self
            .mutate(quotation_id, &audit, RequestEffect::None, |quotation, now| match kind {
                PercentageKind::Markup => quotation.set_markup_percentage(percentage, now),
                PercentageKind::Tax => quotation.set_tax_percentage(percentage, now),
            })
            .await;

        let event_name = kind.event_name();
        match &result {
            Ok((quotation, totals)) => {
                info!(
                    event_name,
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    percentage = %percentage,
                    total_amount = %totals.total_amount,
                    "quotation {} updated",
                    kind.as_str()
                );
                self.emit_priced(&audit, event_name, quotation, |event| {
                    event.with_metadata("percentage", percentage.to_string())
                });
            }
            Err(error) => self.emit_failure(&audit, "quotation.percentage.update_rejected", error),
        }
        result.map(|(_, totals)| totals)
    }

    pub async fn grant_approval(
        &self,
        quotation_id: &QuotationId,
        stage: ApprovalStage,
        approver_id: &str,
    ) -> Result<Quotation, ApplicationError> {
        let audit =
            AuditContext::new(Some(quotation_id.clone()), new_correlation_id(), approver_id);
        let effect = match stage {
            ApprovalStage::Final => RequestEffect::FinallyApproved,
            ApprovalStage::Technical | ApprovalStage::Sales => RequestEffect::None,
        };
        let result = self
            .mutate(quotation_id, &audit, effect, |quotation, now| {
                quotation.grant_approval(stage, approver_id, now)
            })
            .await;

        match &result {
            Ok((quotation, record)) => {
                info!(
                    event_name = "quotation.approval.granted",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    stage = stage.as_str(),
                    approver_id = %record.approver_id,
                    state = quotation.approval_state().as_str(),
                    "approval granted"
                );
                self.audit.emit(
                    AuditEvent::from_context(
                        &audit,
                        "quotation.approval.granted",
                        AuditCategory::Approval,
                        AuditOutcome::Success,
                    )
                    .with_metadata("stage", stage.as_str())
                    .with_metadata("state", quotation.approval_state().as_str())
                    .with_metadata("approved_at", record.approved_at.to_rfc3339()),
                );
            }
            Err(error) => {
                warn!(
                    event_name = "quotation.approval.rejected",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    stage = stage.as_str(),
                    error = %error,
                    "approval refused"
                );
                self.emit_failure(&audit, "quotation.approval.refused", error);
            }
        }
        result.map(|(quotation, _)| quotation)
    }

    pub async fn reject(
        &self,
        quotation_id: &QuotationId,
        approver_id: &str,
        reason: Option<String>,
    ) -> Result<Quotation, ApplicationError> {
        let audit =
            AuditContext::new(Some(quotation_id.clone()), new_correlation_id(), approver_id);
        let result = self
            .mutate(quotation_id, &audit, RequestEffect::Rejected, |quotation, now| {
                quotation.reject(approver_id, reason.clone(), now)
            })
            .await;

        match &result {
            Ok((_, record)) => {
                info!(
                    event_name = "quotation.rejected",
                    correlation_id = %audit.correlation_id,
                    quotation_id = %quotation_id.0,
                    rejected_by = %record.rejected_by,
                    "quotation rejected"
                );
                let mut event = AuditEvent::from_context(
                    &audit,
                    "quotation.rejected",
                    AuditCategory::Approval,
                    AuditOutcome::Success,
                );
                if let Some(reason) = &record.reason {
                    event = event.with_metadata("reason", reason.clone());
                }
                self.audit.emit(event);
            }
            Err(error) => self.emit_failure(&audit, "quotation.reject_refused", error),
        }
        result.map(|(quotation, _)| quotation)
    }

    pub async fn get_totals(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<QuotationTotals, ApplicationError> {
        Ok(self.load(quotation_id).await?.totals())
    }

    pub async fn get_quotation(
        &self,
        quotation_id: &QuotationId,
    ) -> Result<Quotation, ApplicationError> {
        self.load(quotation_id).await
    }

    async fn load(&self, quotation_id: &QuotationId) -> Result<Quotation, ApplicationError> {
        self.store
            .find_quotation(quotation_id)
            .await
            .map_err(|error| error.into_application(&quotation_id.0))?
            .ok_or_else(|| ApplicationError::not_found("quotation", &quotation_id.0))
    }

    /// Reload, mutate, propagate, persist; replayed from a fresh load whenever the write
    /// loses a race, up to `max_write_attempts` times.
    async fn mutate<T, F>(
        &self,
        quotation_id: &QuotationId,
        audit: &AuditContext,
        effect: RequestEffect,
        mut apply: F,
    ) -> Result<(Quotation, T), ApplicationError>
    where
        F: FnMut(&mut Quotation, DateTime<Utc>) -> Result<T, DomainError> + Send,
        T: Send,
    {
        let max_attempts = self.settings.max_write_attempts;
        let mut attempt = 1;
        loop {
            let now = Utc::now();
            let mut quotation = self.load(quotation_id).await?;
            let value = apply(&mut quotation, now)?;
            let request_change = self.request_change(&quotation, effect, now).await?;

            match self.store.update_quotation(&quotation, request_change.as_ref()).await {
                Ok(version) => {
                    quotation.version = version;
                    return Ok((quotation, value));
                }
                Err(error) if error.is_contention() && attempt < max_attempts => {
                    self.log_retry(audit, quotation_id, attempt, &error);
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_contention() {
                        warn!(
                            event_name = "quotation.write.conflict_exhausted",
                            correlation_id = %audit.correlation_id,
                            quotation_id = %quotation_id.0,
                            attempts = attempt,
                            "giving up after repeated write conflicts"
                        );
                    }
                    return Err(error.into_application(&quotation_id.0));
                }
            }
        }
    }

    async fn request_change(
        &self,
        quotation: &Quotation,
        effect: RequestEffect,
        now: DateTime<Utc>,
    ) -> Result<Option<RequestStatusChange>, ApplicationError> {
        let milestone = match effect {
            RequestEffect::None => return Ok(None),
            RequestEffect::Priced if quotation.line_count() > 0 => QuotationMilestone::Priced,
            RequestEffect::Priced => return Ok(None),
            RequestEffect::FinallyApproved
                if quotation.approval_state() == ApprovalState::FinallyApproved =>
            {
                QuotationMilestone::FinallyApproved
            }
            RequestEffect::FinallyApproved => return Ok(None),
            RequestEffect::Rejected => QuotationMilestone::Rejected,
        };

        let request = self
            .store
            .find_request(&quotation.customer_request_id)
            .await
            .map_err(|error| error.into_application(&quotation.id.0))?
            .ok_or_else(|| {
                ApplicationError::not_found("customer_request", &quotation.customer_request_id.0)
            })?;

        Ok(request.status_after(milestone).map(|to| {
            let change = RequestStatusChange::new(request.id.clone(), request.status, to, now);
            if milestone == QuotationMilestone::Rejected {
                change.when_last_open()
            } else {
                change
            }
        }))
    }

    fn service_audit(&self, quotation_id: &QuotationId) -> AuditContext {
        AuditContext::new(Some(quotation_id.clone()), new_correlation_id(), SERVICE_ACTOR)
    }

    fn log_retry(
        &self,
        audit: &AuditContext,
        quotation_id: &QuotationId,
        attempt: u32,
        error: &StoreError,
    ) {
        warn!(
            event_name = "quotation.write.conflict_retry",
            correlation_id = %audit.correlation_id,
            quotation_id = %quotation_id.0,
            attempt,
            max_attempts = self.settings.max_write_attempts,
            error = %error,
            "write lost a race; retrying from a fresh load"
        );
    }

    fn emit_priced(
        &self,
        audit: &AuditContext,
        event_type: &str,
        quotation: &Quotation,
        decorate: impl FnOnce(AuditEvent) -> AuditEvent,
    ) {
        let totals = quotation.totals();
        let event = AuditEvent::from_context(
            audit,
            event_type,
            AuditCategory::Pricing,
            AuditOutcome::Success,
        )
        .with_metadata("subtotal", totals.subtotal.to_string())
        .with_metadata("total_amount", totals.total_amount.to_string())
        .with_metadata("version", quotation.version.to_string());
        self.audit.emit(decorate(event));
    }

    fn emit_failure(&self, audit: &AuditContext, event_type: &str, error: &ApplicationError) {
        let (category, outcome) = match error {
            ApplicationError::Domain(DomainError::InvalidTransition(_)) => {
                (AuditCategory::Approval, AuditOutcome::Rejected)
            }
            ApplicationError::Domain(_) | ApplicationError::NotFound { .. } => {
                (AuditCategory::Quotation, AuditOutcome::Rejected)
            }
            ApplicationError::ConcurrencyConflict { .. } | ApplicationError::Persistence(_) => {
                (AuditCategory::Persistence, AuditOutcome::Failed)
            }
            ApplicationError::Configuration(_) => (AuditCategory::System, AuditOutcome::Failed),
        };
        self.audit.emit(
            AuditEvent::from_context(audit, event_type, category, outcome)
                .with_metadata("error", error.to_string()),
        );
    }
}

fn new_correlation_id() -> String {
    format!("qd-{}", uuid::Uuid::new_v4())
}
