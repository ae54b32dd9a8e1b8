use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use quotedesk_core::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
use quotedesk_core::domain::request::{CustomerRequest, CustomerRequestId, RequestStatus};
use quotedesk_core::store::StoreError;

pub mod catalog;
pub mod dashboard;
pub mod memory;
pub mod quotation;
pub mod request;

pub use catalog::SqlCatalogRepository;
pub use dashboard::{DashboardCounts, SqlDashboardRepository};
pub use memory::InMemoryQuotationStore;
pub use quotation::SqlQuotationStore;
pub use request::SqlCustomerRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` is still referenced by quotation lines")]
    ReferencedEntity { entity: &'static str, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => classify_sqlx_error(error),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::Store(error) => error,
            other @ RepositoryError::ReferencedEntity { .. } => {
                StoreError::Backend(other.to_string())
            }
        }
    }
}

/// Busy and locked databases become contention; unique violations keep their constraint text.
pub(crate) fn classify_sqlx_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(database) => {
            // SQLITE_BUSY (5), SQLITE_LOCKED (6) and their extended codes.
            let busy = database
                .code()
                .and_then(|code| code.parse::<i64>().ok())
                .map_or(false, |code| matches!(code & 0xff, 5 | 6));
            if busy {
                StoreError::Busy(database.message().to_owned())
            } else if database.is_unique_violation() {
                StoreError::Duplicate { constraint: database.message().to_owned() }
            } else {
                StoreError::Backend(error.to_string())
            }
        }
        sqlx::Error::PoolTimedOut => StoreError::Busy(error.to_string()),
        _ => StoreError::Backend(error.to_string()),
    }
}

#[async_trait]
pub trait CustomerRequestRepository: Send + Sync {
    async fn find_by_id(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, RepositoryError>;

    async fn find_by_request_number(
        &self,
        request_number: &str,
    ) -> Result<Option<CustomerRequest>, RepositoryError>;

    /// Newest first; `None` lists every status.
    async fn list_by_status(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<CustomerRequest>, RepositoryError>;

    async fn save(&self, request: CustomerRequest) -> Result<(), RepositoryError>;

    /// Removes the request together with its quotations. Returns whether a row existed.
    async fn delete(&self, id: &CustomerRequestId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, RepositoryError>;

    /// Active items ordered by category then name, optionally narrowed to one category.
    async fn list_active_hardware(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CatalogHardwareItem>, RepositoryError>;

    async fn save_hardware_item(&self, item: CatalogHardwareItem) -> Result<(), RepositoryError>;

    async fn deactivate_hardware_item(&self, id: &HardwareItemId)
        -> Result<bool, RepositoryError>;

    /// Refused with `ReferencedEntity` while any quotation line points at the item.
    async fn delete_hardware_item(&self, id: &HardwareItemId) -> Result<bool, RepositoryError>;

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, RepositoryError>;

    async fn list_active_rate_categories(
        &self,
    ) -> Result<Vec<PersonnelRateCategory>, RepositoryError>;

    async fn save_rate_category(
        &self,
        category: PersonnelRateCategory,
    ) -> Result<(), RepositoryError>;

    async fn deactivate_rate_category(&self, id: &RateCategoryId)
        -> Result<bool, RepositoryError>;

    async fn delete_rate_category(&self, id: &RateCategoryId) -> Result<bool, RepositoryError>;
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|date| {
            NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{date}` ({error})"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use quotedesk_core::store::StoreError;

    use super::{classify_sqlx_error, parse_decimal, parse_optional_date, RepositoryError};

    #[test]
    fn decimals_keep_their_scale() {
        let parsed = parse_decimal("unit_cost", "100.00".to_owned()).expect("decimal");
        assert_eq!(parsed.to_string(), "100.00");
        assert!(parse_decimal("unit_cost", "ten".to_owned()).is_err());
    }

    #[test]
    fn dates_use_iso_calendar_format() {
        let parsed = parse_optional_date("valid_until", Some("2026-12-31".to_owned()))
            .expect("date")
            .expect("some date");
        assert_eq!(parsed.to_string(), "2026-12-31");
        assert_eq!(parse_optional_date("valid_until", None).expect("none"), None);
    }

    #[test]
    fn decode_failures_stay_decode_failures() {
        let error: StoreError = RepositoryError::Decode("bad row".to_owned()).into();
        assert_eq!(error, StoreError::Decode("bad row".to_owned()));
        assert!(!error.is_contention());
    }

    #[tokio::test]
    async fn held_write_lock_surfaces_as_busy() {
        use std::str::FromStr;
        use std::time::Duration;

        use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("busy.db").display());
        let holder = crate::connection::connect(&url).await.expect("holder pool");
        sqlx::query("CREATE TABLE counter (value INTEGER NOT NULL)")
            .execute(&holder)
            .await
            .expect("create table");

        let options = SqliteConnectOptions::from_str(&url)
            .expect("options")
            .busy_timeout(Duration::ZERO);
        let impatient =
            SqlitePoolOptions::new().max_connections(1).connect_with(options).await.expect("pool");

        let mut tx = holder.begin().await.expect("begin");
        sqlx::query("INSERT INTO counter (value) VALUES (1)")
            .execute(&mut *tx)
            .await
            .expect("first writer");

        let error = sqlx::query("INSERT INTO counter (value) VALUES (2)")
            .execute(&impatient)
            .await
            .expect_err("second writer should not get the lock");
        let classified = classify_sqlx_error(error);
        assert!(matches!(classified, StoreError::Busy(_)), "{classified:?}");
        assert!(classified.is_contention());
        assert!(classified.into_application("q-busy").is_retryable());

        tx.rollback().await.expect("rollback");
        sqlx::query("INSERT INTO counter (value) VALUES (3)")
            .execute(&impatient)
            .await
            .expect("lock released");
    }
}
