use sqlx::{sqlite::SqliteRow, Row};

use quotedesk_core::domain::request::{CustomerRequest, CustomerRequestId, RequestStatus};

use super::{parse_timestamp, parse_u32, CustomerRequestRepository, RepositoryError};
use crate::DbPool;

const REQUEST_COLUMNS: &str = "id,
    request_number,
    customer_name,
    customer_email,
    customer_phone,
    company_name,
    project_description,
    quantity,
    status,
    created_at,
    updated_at";

pub struct SqlCustomerRequestRepository {
    pool: DbPool,
}

impl SqlCustomerRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CustomerRequestRepository for SqlCustomerRequestRepository {
    async fn find_by_id(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {REQUEST_COLUMNS} FROM customer_request WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(request_from_row).transpose()
    }

    async fn find_by_request_number(
        &self,
        request_number: &str,
    ) -> Result<Option<CustomerRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM customer_request WHERE request_number = ?"
        ))
        .bind(request_number)
        .fetch_optional(&self.pool)
        .await?;

        row.map(request_from_row).transpose()
    }

    async fn list_by_status(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<CustomerRequest>, RepositoryError> {
        let rows = if let Some(status) = status {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM customer_request
                 WHERE status = ?
                 ORDER BY created_at DESC, request_number ASC"
            ))
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "SELECT {REQUEST_COLUMNS} FROM customer_request
                 ORDER BY created_at DESC, request_number ASC"
            ))
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(request_from_row).collect()
    }

    async fn save(&self, request: CustomerRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer_request (
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
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                request_number = excluded.request_number,
                customer_name = excluded.customer_name,
                customer_email = excluded.customer_email,
                customer_phone = excluded.customer_phone,
                company_name = excluded.company_name,
                project_description = excluded.project_description,
                quantity = excluded.quantity,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&request.id.0)
        .bind(&request.request_number)
        .bind(&request.customer_name)
        .bind(&request.customer_email)
        .bind(request.customer_phone.as_deref())
        .bind(request.company_name.as_deref())
        .bind(&request.project_description)
        .bind(i64::from(request.quantity))
        .bind(request.status.as_str())
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &CustomerRequestId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM customer_request WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn request_from_row(row: SqliteRow) -> Result<CustomerRequest, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = RequestStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown request status `{status_raw}`")))?;

    Ok(CustomerRequest {
        id: CustomerRequestId(row.try_get("id")?),
        request_number: row.try_get("request_number")?,
        customer_name: row.try_get("customer_name")?,
        customer_email: row.try_get("customer_email")?,
        customer_phone: row.try_get("customer_phone")?,
        company_name: row.try_get("company_name")?,
        project_description: row.try_get("project_description")?,
        quantity: parse_u32("quantity", row.try_get("quantity")?)?,
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
