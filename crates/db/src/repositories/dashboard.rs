use serde::Serialize;
use sqlx::Row;

use super::RepositoryError;
use crate::DbPool;

/// Headline counts for the landing page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DashboardCounts {
    pub total_requests: u64,
    pub pending_requests: u64,
    pub total_quotations: u64,
    pub approved_quotations: u64,
}

pub struct SqlDashboardRepository {
    pool: DbPool,
}

impl SqlDashboardRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn counts(&self) -> Result<DashboardCounts, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM customer_request) AS total_requests,
                (SELECT COUNT(*) FROM customer_request WHERE status = 'pending')
                    AS pending_requests,
                (SELECT COUNT(*) FROM quotation) AS total_quotations,
                (SELECT COUNT(*) FROM quotation WHERE approval_state = 'finally_approved')
                    AS approved_quotations",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardCounts {
            total_requests: count(row.try_get("total_requests")?)?,
            pending_requests: count(row.try_get("pending_requests")?)?,
            total_quotations: count(row.try_get("total_quotations")?)?,
            approved_quotations: count(row.try_get("approved_quotations")?)?,
        })
    }
}

fn count(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Decode(format!("negative count {value}")))
}
