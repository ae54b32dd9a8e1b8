use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, Sqlite, Transaction};

use quotedesk_core::domain::approval::{
    ApprovalRecord, ApprovalStage, ApprovalState, RejectionRecord,
};
use quotedesk_core::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
use quotedesk_core::domain::quotation::{
    Quotation, QuotationHardwareLine, QuotationId, QuotationLineId, QuotationParts,
    QuotationPersonnelLine,
};
use quotedesk_core::domain::request::{CustomerRequest, CustomerRequestId};
use quotedesk_core::store::{quotation_sequence, QuotationStore, RequestStatusChange, StoreError};

use super::catalog::{hardware_from_row, rate_category_from_row};
use super::request::request_from_row;
use super::{
    classify_sqlx_error, parse_decimal, parse_optional_date, parse_optional_timestamp,
    parse_timestamp, parse_u32, RepositoryError,
};
use crate::DbPool;

/// Version a quotation carries once its first write lands.
const INITIAL_STORED_VERSION: u32 = 1;

/// SQLite-backed quotation aggregate store.
///
/// Every write runs in one transaction: the quotation row (guarded by its version on update),
/// a full rewrite of both line tables, append-only approval rows and the optional
/// compare-and-set of the owning request's status.
pub struct SqlQuotationStore {
    pool: DbPool,
}

impl SqlQuotationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Quotations of one request, oldest first.
    pub async fn list_for_request(
        &self,
        request_id: &CustomerRequestId,
    ) -> Result<Vec<Quotation>, RepositoryError> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM quotation WHERE customer_request_id = ?
             ORDER BY created_at ASC, quotation_number ASC",
        )
        .bind(&request_id.0)
        .fetch_all(&self.pool)
        .await?;

        let mut quotations = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(quotation) = self.load_quotation(&QuotationId(id)).await? {
                quotations.push(quotation);
            }
        }
        Ok(quotations)
    }

    async fn load_quotation(&self, id: &QuotationId) -> Result<Option<Quotation>, RepositoryError> {
        // One read transaction keeps the row, lines and approvals on the same snapshot.
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query(
            "SELECT
                id,
                quotation_number,
                customer_request_id,
                created_by,
                currency,
                markup_percentage,
                tax_percentage,
                approval_state,
                rejected_by,
                rejected_at,
                rejection_reason,
                notes,
                valid_until,
                version,
                created_at,
                updated_at
             FROM quotation
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let hardware_rows = sqlx::query(
            "SELECT id, hardware_item_id, quantity, unit_cost, notes
             FROM quotation_hardware_line
             WHERE quotation_id = ?
             ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&mut *tx)
        .await?;

        let personnel_rows = sqlx::query(
            "SELECT id, rate_category_id, hours, hourly_rate, description
             FROM quotation_personnel_line
             WHERE quotation_id = ?
             ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&mut *tx)
        .await?;

        let approval_rows = sqlx::query(
            "SELECT stage, approver_id, approved_at
             FROM quotation_approval
             WHERE quotation_id = ?
             ORDER BY CASE stage WHEN 'technical' THEN 1 WHEN 'sales' THEN 2 ELSE 3 END",
        )
        .bind(&id.0)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let stored_state_raw = row.try_get::<String, _>("approval_state")?;
        let stored_state = ApprovalState::parse(&stored_state_raw).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown approval state `{stored_state_raw}`"))
        })?;

        let parts = QuotationParts {
            id: QuotationId(row.try_get("id")?),
            quotation_number: row.try_get("quotation_number")?,
            customer_request_id: CustomerRequestId(row.try_get("customer_request_id")?),
            created_by: row.try_get("created_by")?,
            currency: row.try_get("currency")?,
            notes: row.try_get("notes")?,
            valid_until: parse_optional_date("valid_until", row.try_get("valid_until")?)?,
            version: parse_u32("version", row.try_get("version")?)?,
            created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
            updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
            hardware_lines: hardware_rows
                .into_iter()
                .map(hardware_line_from_row)
                .collect::<Result<_, _>>()?,
            personnel_lines: personnel_rows
                .into_iter()
                .map(personnel_line_from_row)
                .collect::<Result<_, _>>()?,
            markup_percentage: parse_decimal(
                "markup_percentage",
                row.try_get("markup_percentage")?,
            )?,
            tax_percentage: parse_decimal("tax_percentage", row.try_get("tax_percentage")?)?,
            approvals: approval_rows
                .into_iter()
                .map(approval_from_row)
                .collect::<Result<_, _>>()?,
            rejection: rejection_from_row(&row)?,
        };

        let quotation = Quotation::from_parts(parts).map_err(|error| {
            RepositoryError::Decode(format!("quotation `{}` is inconsistent: {error}", id.0))
        })?;
        if quotation.approval_state() != stored_state {
            return Err(RepositoryError::Decode(format!(
                "quotation `{}` stores state `{}` but its approval log replays to `{}`",
                id.0,
                stored_state.as_str(),
                quotation.approval_state().as_str()
            )));
        }
        Ok(Some(quotation))
    }
}

#[async_trait]
impl QuotationStore for SqlQuotationStore {
    async fn find_request(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, StoreError> {
        let row = sqlx::query(
            "SELECT
                id,
                request_number,
                customer_name,
                customer_email,
                customer_phone,
                company_name,
                project_description,
                quantity,
                status,
                created_at,
                updated_at
             FROM customer_request
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(row.map(request_from_row).transpose()?)
    }

    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, StoreError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                description,
                category,
                manufacturer,
                model_number,
                unit_cost,
                currency,
                supplier,
                lead_time_days,
                minimum_order_quantity,
                active,
                created_at,
                updated_at
             FROM catalog_hardware_item
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(row.map(hardware_from_row).transpose()?)
    }

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, description, hourly_rate, currency, active
             FROM personnel_rate_category
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        Ok(row.map(rate_category_from_row).transpose()?)
    }

    async fn find_quotation(&self, id: &QuotationId) -> Result<Option<Quotation>, StoreError> {
        Ok(self.load_quotation(id).await?)
    }

    async fn next_quotation_sequence(&self, prefix: &str, year: i32) -> Result<u32, StoreError> {
        let numbers: Vec<String> = sqlx::query_scalar(
            "SELECT quotation_number FROM quotation WHERE quotation_number LIKE ?",
        )
        .bind(format!("{prefix}-{year}-%"))
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;

        let highest = numbers
            .iter()
            .filter_map(|number| quotation_sequence(number, prefix, year))
            .max()
            .unwrap_or(0);
        Ok(highest.saturating_add(1))
    }

    async fn insert_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;

        if let Some(change) = request_change {
            apply_request_change(&mut tx, change, &quotation.id).await?;
        }

        let totals = quotation.totals();
        let rejection = quotation.approval_trail().rejection();
        sqlx::query(
            "INSERT INTO quotation (
                id,
                quotation_number,
                customer_request_id,
                created_by,
                currency,
                hardware_total,
                personnel_total,
                subtotal,
                markup_percentage,
                markup_amount,
                tax_percentage,
                tax_amount,
                total_amount,
                approval_state,
                rejected_by,
                rejected_at,
                rejection_reason,
                notes,
                valid_until,
                version,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quotation.id.0)
        .bind(&quotation.quotation_number)
        .bind(&quotation.customer_request_id.0)
        .bind(&quotation.created_by)
        .bind(&quotation.currency)
        .bind(totals.hardware_total.to_string())
        .bind(totals.personnel_total.to_string())
        .bind(totals.subtotal.to_string())
        .bind(quotation.markup_percentage().to_string())
        .bind(totals.markup_amount.to_string())
        .bind(quotation.tax_percentage().to_string())
        .bind(totals.tax_amount.to_string())
        .bind(totals.total_amount.to_string())
        .bind(quotation.approval_state().as_str())
        .bind(rejection.map(|record| record.rejected_by.clone()))
        .bind(rejection.map(|record| record.rejected_at.to_rfc3339()))
        .bind(rejection.and_then(|record| record.reason.clone()))
        .bind(&quotation.notes)
        .bind(quotation.valid_until.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(i64::from(INITIAL_STORED_VERSION))
        .bind(quotation.created_at.to_rfc3339())
        .bind(quotation.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;

        write_lines(&mut tx, quotation).await?;
        write_approvals(&mut tx, quotation).await?;

        tx.commit().await.map_err(classify_sqlx_error)?;
        Ok(INITIAL_STORED_VERSION)
    }

    async fn update_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;

        let totals = quotation.totals();
        let rejection = quotation.approval_trail().rejection();
        let updated = sqlx::query(
            "UPDATE quotation SET
                hardware_total = ?,
                personnel_total = ?,
                subtotal = ?,
                markup_percentage = ?,
                markup_amount = ?,
                tax_percentage = ?,
                tax_amount = ?,
                total_amount = ?,
                approval_state = ?,
                rejected_by = ?,
                rejected_at = ?,
                rejection_reason = ?,
                notes = ?,
                valid_until = ?,
                updated_at = ?,
                version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(totals.hardware_total.to_string())
        .bind(totals.personnel_total.to_string())
        .bind(totals.subtotal.to_string())
        .bind(quotation.markup_percentage().to_string())
        .bind(totals.markup_amount.to_string())
        .bind(quotation.tax_percentage().to_string())
        .bind(totals.tax_amount.to_string())
        .bind(totals.total_amount.to_string())
        .bind(quotation.approval_state().as_str())
        .bind(rejection.map(|record| record.rejected_by.clone()))
        .bind(rejection.map(|record| record.rejected_at.to_rfc3339()))
        .bind(rejection.and_then(|record| record.reason.clone()))
        .bind(&quotation.notes)
        .bind(quotation.valid_until.map(|date| date.format("%Y-%m-%d").to_string()))
        .bind(quotation.updated_at.to_rfc3339())
        .bind(&quotation.id.0)
        .bind(i64::from(quotation.version))
        .execute(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::VersionConflict {
                quotation_id: quotation.id.0.clone(),
                expected_version: quotation.version,
            });
        }

        sqlx::query("DELETE FROM quotation_hardware_line WHERE quotation_id = ?")
            .bind(&quotation.id.0)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        sqlx::query("DELETE FROM quotation_personnel_line WHERE quotation_id = ?")
            .bind(&quotation.id.0)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        write_lines(&mut tx, quotation).await?;
        write_approvals(&mut tx, quotation).await?;

        if let Some(change) = request_change {
            apply_request_change(&mut tx, change, &quotation.id).await?;
        }

        tx.commit().await.map_err(classify_sqlx_error)?;
        Ok(quotation.version + 1)
    }
}

async fn write_lines(
    tx: &mut Transaction<'_, Sqlite>,
    quotation: &Quotation,
) -> Result<(), StoreError> {
    for (position, line) in quotation.hardware_lines().iter().enumerate() {
        sqlx::query(
            "INSERT INTO quotation_hardware_line (
                id,
                quotation_id,
                hardware_item_id,
                position,
                quantity,
                unit_cost,
                total_cost,
                notes
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&line.id().0)
        .bind(&quotation.id.0)
        .bind(&line.hardware_item_id().0)
        .bind(position as i64)
        .bind(i64::from(line.quantity()))
        .bind(line.unit_cost().to_string())
        .bind(line.total_cost().to_string())
        .bind(line.notes())
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx_error)?;
    }

    for (position, line) in quotation.personnel_lines().iter().enumerate() {
        sqlx::query(
            "INSERT INTO quotation_personnel_line (
                id,
                quotation_id,
                rate_category_id,
                position,
                hours,
                hourly_rate,
                total_cost,
                description
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&line.id().0)
        .bind(&quotation.id.0)
        .bind(&line.rate_category_id().0)
        .bind(position as i64)
        .bind(line.hours().to_string())
        .bind(line.hourly_rate().to_string())
        .bind(line.total_cost().to_string())
        .bind(line.description())
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx_error)?;
    }

    Ok(())
}

/// Approval rows are append-only; stages already on file are left untouched.
async fn write_approvals(
    tx: &mut Transaction<'_, Sqlite>,
    quotation: &Quotation,
) -> Result<(), StoreError> {
    for record in quotation.approval_trail().approvals() {
        sqlx::query(
            "INSERT INTO quotation_approval (quotation_id, stage, approver_id, approved_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(quotation_id, stage) DO NOTHING",
        )
        .bind(&quotation.id.0)
        .bind(record.stage.as_str())
        .bind(&record.approver_id)
        .bind(record.approved_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(classify_sqlx_error)?;
    }
    Ok(())
}

async fn apply_request_change(
    tx: &mut Transaction<'_, Sqlite>,
    change: &RequestStatusChange,
    writing: &QuotationId,
) -> Result<(), StoreError> {
    if change.only_if_last_open && has_other_open_quotations(tx, change, writing).await? {
        return Ok(());
    }

    let updated = sqlx::query(
        "UPDATE customer_request SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
    )
    .bind(change.to.as_str())
    .bind(change.changed_at.to_rfc3339())
    .bind(&change.request_id.0)
    .bind(change.from.as_str())
    .execute(&mut **tx)
    .await
    .map_err(classify_sqlx_error)?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::RequestStatusConflict {
            request_id: change.request_id.0.clone(),
            expected: change.from.as_str(),
        });
    }
    Ok(())
}

/// Read inside the writing transaction so concurrent decisions on sibling quotations
/// serialize against each other.
async fn has_other_open_quotations(
    tx: &mut Transaction<'_, Sqlite>,
    change: &RequestStatusChange,
    excluding: &QuotationId,
) -> Result<bool, StoreError> {
    let open: i64 = sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM quotation
            WHERE customer_request_id = ?
              AND id <> ?
              AND approval_state NOT IN ('finally_approved', 'rejected')
         )",
    )
    .bind(&change.request_id.0)
    .bind(&excluding.0)
    .fetch_one(&mut **tx)
    .await
    .map_err(classify_sqlx_error)?;

    Ok(open == 1)
}

fn hardware_line_from_row(row: SqliteRow) -> Result<QuotationHardwareLine, RepositoryError> {
    QuotationHardwareLine::restore(
        QuotationLineId(row.try_get("id")?),
        HardwareItemId(row.try_get("hardware_item_id")?),
        parse_u32("quantity", row.try_get("quantity")?)?,
        parse_decimal("unit_cost", row.try_get("unit_cost")?)?,
        row.try_get::<String, _>("notes")?,
    )
    .map_err(|error| RepositoryError::Decode(format!("invalid hardware line: {error}")))
}

fn personnel_line_from_row(row: SqliteRow) -> Result<QuotationPersonnelLine, RepositoryError> {
    QuotationPersonnelLine::restore(
        QuotationLineId(row.try_get("id")?),
        RateCategoryId(row.try_get("rate_category_id")?),
        parse_decimal("hours", row.try_get("hours")?)?,
        parse_decimal("hourly_rate", row.try_get("hourly_rate")?)?,
        row.try_get::<String, _>("description")?,
    )
    .map_err(|error| RepositoryError::Decode(format!("invalid personnel line: {error}")))
}

fn approval_from_row(row: SqliteRow) -> Result<ApprovalRecord, RepositoryError> {
    let stage_raw = row.try_get::<String, _>("stage")?;
    let stage = ApprovalStage::from_str(&stage_raw).map_err(RepositoryError::Decode)?;

    Ok(ApprovalRecord {
        stage,
        approver_id: row.try_get("approver_id")?,
        approved_at: parse_timestamp("approved_at", row.try_get("approved_at")?)?,
    })
}

fn rejection_from_row(row: &SqliteRow) -> Result<Option<RejectionRecord>, RepositoryError> {
    let rejected_by: Option<String> = row.try_get("rejected_by")?;
    let rejected_at = parse_optional_timestamp("rejected_at", row.try_get("rejected_at")?)?;

    match (rejected_by, rejected_at) {
        (Some(rejected_by), Some(rejected_at)) => Ok(Some(RejectionRecord {
            rejected_by,
            rejected_at,
            reason: row.try_get("rejection_reason")?,
        })),
        (None, None) => Ok(None),
        _ => Err(RepositoryError::Decode(
            "rejected_by and rejected_at must be set together".to_owned(),
        )),
    }
}
