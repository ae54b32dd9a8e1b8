use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
use crate::domain::quotation::{Quotation, QuotationId};
use crate::domain::request::{CustomerRequest, CustomerRequestId, RequestStatus};
use crate::errors::ApplicationError;

/// Compare-and-set of a customer request's status, written in the same transaction as the
/// quotation that caused it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestStatusChange {
    pub request_id: CustomerRequestId,
    pub from: RequestStatus,
    pub to: RequestStatus,
    pub changed_at: DateTime<Utc>,
    /// Decided inside the write: the change is skipped, without error, while any other
    /// quotation for the request is still open.
    pub only_if_last_open: bool,
}

impl RequestStatusChange {
    pub fn new(
        request_id: CustomerRequestId,
        from: RequestStatus,
        to: RequestStatus,
        changed_at: DateTime<Utc>,
    ) -> Self {
        Self { request_id, from, to, changed_at, only_if_last_open: false }
    }

    pub fn when_last_open(self) -> Self {
        Self { only_if_last_open: true, ..self }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("quotation `{quotation_id}` is no longer at version {expected_version}")]
    VersionConflict { quotation_id: String, expected_version: u32 },
    #[error("customer request `{request_id}` is no longer in status `{expected}`")]
    RequestStatusConflict { request_id: String, expected: &'static str },
    #[error("database is busy: {0}")]
    Busy(String),
    #[error("unique constraint `{constraint}` was violated")]
    Duplicate { constraint: String },
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

impl StoreError {
    /// Lost races and lock contention; the whole operation can be replayed.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. } | Self::RequestStatusConflict { .. } | Self::Busy(_)
        )
    }

    pub fn into_application(self, quotation_id: impl Into<String>) -> ApplicationError {
        match self {
            Self::VersionConflict { .. } | Self::RequestStatusConflict { .. } | Self::Busy(_) => {
                ApplicationError::ConcurrencyConflict { quotation_id: quotation_id.into() }
            }
            Self::Duplicate { constraint } => {
                ApplicationError::Persistence(format!("unique constraint `{constraint}` violated"))
            }
            Self::Decode(message) => {
                ApplicationError::Persistence(format!("stored record is corrupt: {message}"))
            }
            Self::Backend(message) => ApplicationError::Persistence(message),
        }
    }
}

/// Transactional persistence the quotation service depends on.
///
/// `insert_quotation` and `update_quotation` write the quotation row, its lines, its approval
/// log and the optional request status change atomically, returning the stored version.
/// A change marked `only_if_last_open` is evaluated against the other quotations of the
/// request within that same write.
/// `update_quotation` only succeeds while the stored version equals `quotation.version`.
#[async_trait]
pub trait QuotationStore: Send + Sync {
    async fn find_request(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, StoreError>;

    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, StoreError>;

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, StoreError>;

    async fn find_quotation(&self, id: &QuotationId) -> Result<Option<Quotation>, StoreError>;

    /// Next free sequence for numbers shaped `{prefix}-{year}-{seq}`.
    async fn next_quotation_sequence(&self, prefix: &str, year: i32) -> Result<u32, StoreError>;

    async fn insert_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError>;

    async fn update_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError>;
}

#[async_trait]
impl<T> QuotationStore for Arc<T>
where
    T: QuotationStore + ?Sized,
{
    async fn find_request(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, StoreError> {
        (**self).find_request(id).await
    }

    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, StoreError> {
        (**self).find_hardware_item(id).await
    }

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, StoreError> {
        (**self).find_rate_category(id).await
    }

    async fn find_quotation(&self, id: &QuotationId) -> Result<Option<Quotation>, StoreError> {
        (**self).find_quotation(id).await
    }

    async fn next_quotation_sequence(&self, prefix: &str, year: i32) -> Result<u32, StoreError> {
        (**self).next_quotation_sequence(prefix, year).await
    }

    async fn insert_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError> {
        (**self).insert_quotation(quotation, request_change).await
    }

    async fn update_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError> {
        (**self).update_quotation(quotation, request_change).await
    }
}

/// Parses the numeric suffix of `{prefix}-{year}-{seq}`; other shapes yield `None`.
pub fn quotation_sequence(quotation_number: &str, prefix: &str, year: i32) -> Option<u32> {
    quotation_number
        .strip_prefix(prefix)?
        .strip_prefix('-')?
        .strip_prefix(year.to_string().as_str())?
        .strip_prefix('-')?
        .parse()
        .ok()
}

pub fn format_quotation_number(prefix: &str, year: i32, sequence: u32) -> String {
    format!("{prefix}-{year}-{sequence:04}")
}
