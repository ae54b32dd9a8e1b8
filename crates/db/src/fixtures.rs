use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use quotedesk_core::domain::approval::{ApprovalStage, ApprovalState};
use quotedesk_core::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
use quotedesk_core::domain::quotation::{Quotation, QuotationId};
use quotedesk_core::domain::request::{CustomerRequest, CustomerRequestId, RequestStatus};
use quotedesk_core::errors::DomainError;
use quotedesk_core::store::QuotationStore;

use crate::connection::DbPool;
use crate::repositories::{
    CatalogRepository, CustomerRequestRepository, RepositoryError, SqlCatalogRepository,
    SqlCustomerRequestRepository, SqlQuotationStore,
};

const SEED_TIMESTAMP: &str = "2026-01-05T09:00:00Z";

const PRICED_REQUEST_ID: &str = "req-demo-001";
const PENDING_REQUEST_ID: &str = "req-demo-002";
const ROUTER_ID: &str = "hw-demo-router";
const SWITCH_ID: &str = "hw-demo-switch";
const RETIRED_ACCESS_POINT_ID: &str = "hw-demo-ap-legacy";
const ENGINEER_RATE_ID: &str = "rate-demo-engineer";
const PROJECT_MANAGER_RATE_ID: &str = "rate-demo-pm";
const PRICED_QUOTATION_ID: &str = "qt-demo-001";
const EMPTY_QUOTATION_ID: &str = "qt-demo-002";

/// Deterministic demo records.
///
/// Provides:
/// 1. A priced, technically approved quotation totalling 504.90
///    (2 × 150.00 hardware, 1 h × 125.00 personnel, 10 % markup, 8 % tax)
/// 2. An empty draft quotation on the same request, totalling 0.00
/// 3. A pending request with no quotation yet
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    /// Loads the dataset. Catalog entries and requests are upserted; quotations already on
    /// file are left alone so the command can be re-run.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let now = seed_timestamp()?;
        let requests = SqlCustomerRequestRepository::new(pool.clone());
        let catalog = SqlCatalogRepository::new(pool.clone());
        let store = SqlQuotationStore::new(pool.clone());

        let router = hardware_item(ROUTER_ID, "Edge Router ER-8", "networking", 15000, now);
        let switch = hardware_item(SWITCH_ID, "Access Switch 24P", "networking", 8999, now);
        let mut retired =
            hardware_item(RETIRED_ACCESS_POINT_ID, "Legacy Access Point", "wireless", 4500, now);
        retired.active = false;
        for item in [&router, &switch, &retired] {
            catalog.save_hardware_item(item.clone()).await?;
        }

        let engineer = rate_category(ENGINEER_RATE_ID, "Network Engineer", 12500);
        let manager = rate_category(PROJECT_MANAGER_RATE_ID, "Project Manager", 9500);
        for category in [&engineer, &manager] {
            catalog.save_rate_category(category.clone()).await?;
        }

        let mut seeded = Vec::new();
        let mut already_present = Vec::new();

        if store.find_quotation(&QuotationId(PRICED_QUOTATION_ID.to_owned())).await?.is_some() {
            already_present.push(PRICED_QUOTATION_ID);
        } else {
            let mut priced_request = customer_request(
                PRICED_REQUEST_ID,
                "REQ-DEMO-0001",
                "Northwind Traders",
                "Branch office network refresh",
                now,
            );
            priced_request.company_name = Some("Northwind Traders Ltd".to_owned());
            priced_request.status = RequestStatus::Quoted;
            requests.save(priced_request.clone()).await?;

            let mut priced = Quotation::new(
                "QT-DEMO-0001",
                priced_request.id.clone(),
                "demo-sales",
                "USD",
                now,
            )
            .map_err(invalid_fixture)?;
            priced.id = QuotationId(PRICED_QUOTATION_ID.to_owned());
            priced.notes = "Includes on-site installation".to_owned();
            priced.upsert_hardware_line(&router, 2, None, now).map_err(invalid_fixture)?;
            priced
                .upsert_personnel_line(&engineer, Decimal::ONE, None, now)
                .map_err(invalid_fixture)?;
            priced.set_markup_percentage(Decimal::from(10), now).map_err(invalid_fixture)?;
            priced.set_tax_percentage(Decimal::from(8), now).map_err(invalid_fixture)?;
            priced
                .grant_approval(ApprovalStage::Technical, "demo-engineering-lead", now)
                .map_err(invalid_fixture)?;
            store.insert_quotation(&priced, None).await?;
            seeded.push(SeedQuotationInfo {
                quotation_id: PRICED_QUOTATION_ID,
                description: "Priced and technically approved, total 504.90",
            });

            let mut empty =
                Quotation::new("QT-DEMO-0002", priced_request.id.clone(), "demo-sales", "USD", now)
                    .map_err(invalid_fixture)?;
            empty.id = QuotationId(EMPTY_QUOTATION_ID.to_owned());
            store.insert_quotation(&empty, None).await?;
            seeded.push(SeedQuotationInfo {
                quotation_id: EMPTY_QUOTATION_ID,
                description: "Empty draft, all totals zero",
            });
        }

        if requests.find_by_id(&CustomerRequestId(PENDING_REQUEST_ID.to_owned())).await?.is_none()
        {
            requests
                .save(customer_request(
                    PENDING_REQUEST_ID,
                    "REQ-DEMO-0002",
                    "Contoso Clinic",
                    "Wireless coverage survey",
                    now,
                ))
                .await?;
        }

        Ok(SeedResult { quotations_seeded: seeded, already_present })
    }

    /// Verify that seed data exists and still prices the way it was seeded.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let requests = SqlCustomerRequestRepository::new(pool.clone());
        let catalog = SqlCatalogRepository::new(pool.clone());
        let store = SqlQuotationStore::new(pool.clone());
        let mut checks = Vec::new();

        let priced_request =
            requests.find_by_id(&CustomerRequestId(PRICED_REQUEST_ID.to_owned())).await?;
        checks.push((
            "priced-request-quoted",
            priced_request.map_or(false, |request| request.status == RequestStatus::Quoted),
        ));
        let pending_request =
            requests.find_by_id(&CustomerRequestId(PENDING_REQUEST_ID.to_owned())).await?;
        checks.push(("pending-request", pending_request.is_some()));

        for id in [ROUTER_ID, SWITCH_ID, RETIRED_ACCESS_POINT_ID] {
            let exists =
                catalog.find_hardware_item(&HardwareItemId(id.to_owned())).await?.is_some();
            checks.push((id, exists));
        }
        for id in [ENGINEER_RATE_ID, PROJECT_MANAGER_RATE_ID] {
            let exists =
                catalog.find_rate_category(&RateCategoryId(id.to_owned())).await?.is_some();
            checks.push((id, exists));
        }
        let active_hardware = catalog.list_active_hardware(None).await?;
        checks.push((
            "legacy-item-inactive",
            active_hardware.iter().all(|item| item.id.0 != RETIRED_ACCESS_POINT_ID),
        ));

        let priced = store.find_quotation(&QuotationId(PRICED_QUOTATION_ID.to_owned())).await?;
        checks.push((
            "priced-quotation-total",
            priced.as_ref().map_or(false, |quotation| {
                quotation.totals().total_amount == Decimal::new(50490, 2)
            }),
        ));
        checks.push((
            "priced-quotation-state",
            priced.as_ref().map_or(false, |quotation| {
                quotation.approval_state() == ApprovalState::TechnicallyApproved
            }),
        ));

        let empty = store.find_quotation(&QuotationId(EMPTY_QUOTATION_ID.to_owned())).await?;
        checks.push((
            "empty-quotation-total",
            empty.map_or(false, |quotation| quotation.totals().total_amount.is_zero()),
        ));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub quotations_seeded: Vec<SeedQuotationInfo>,
    pub already_present: Vec<&'static str>,
}

#[derive(Debug)]
pub struct SeedQuotationInfo {
    pub quotation_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

fn seed_timestamp() -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(SEED_TIMESTAMP)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid seed timestamp: {error}")))
}

fn invalid_fixture(error: DomainError) -> RepositoryError {
    RepositoryError::Decode(format!("demo fixture is invalid: {error}"))
}

fn customer_request(
    id: &str,
    number: &str,
    customer: &str,
    description: &str,
    now: DateTime<Utc>,
) -> CustomerRequest {
    let mut request = CustomerRequest::new(
        number,
        customer,
        format!("procurement@{}.example", id.trim_start_matches("req-")),
        description,
        now,
    );
    request.id = CustomerRequestId(id.to_owned());
    request
}

fn hardware_item(
    id: &str,
    name: &str,
    category: &str,
    unit_cost_cents: i64,
    now: DateTime<Utc>,
) -> CatalogHardwareItem {
    let unit_cost = Decimal::new(unit_cost_cents, 2);
    let mut item = CatalogHardwareItem::new(id, name, category, unit_cost, now);
    item.manufacturer = "Demo Networks".to_owned();
    item.supplier = "Demo Distribution".to_owned();
    item.lead_time_days = 10;
    item
}

fn rate_category(id: &str, name: &str, hourly_rate_cents: i64) -> PersonnelRateCategory {
    PersonnelRateCategory::new(id, name, Decimal::new(hourly_rate_cents, 2))
}

#[cfg(test)]
mod tests {
    use super::DemoSeedDataset;
    use crate::migrations;
    use crate::repositories::{DashboardCounts, SqlDashboardRepository};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn demo_dataset_loads_and_verifies() {
        let pool = setup_pool().await;

        let result = DemoSeedDataset::load(&pool).await.expect("load");
        assert_eq!(result.quotations_seeded.len(), 2);
        assert!(result.already_present.is_empty());

        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);
        pool.close().await;
    }

    #[tokio::test]
    async fn reloading_is_idempotent() {
        let pool = setup_pool().await;
        DemoSeedDataset::load(&pool).await.expect("first load");

        let second = DemoSeedDataset::load(&pool).await.expect("second load");
        assert!(second.quotations_seeded.is_empty());
        assert_eq!(second.already_present, vec!["qt-demo-001"]);

        let counts = SqlDashboardRepository::new(pool.clone()).counts().await.expect("counts");
        assert_eq!(
            counts,
            DashboardCounts {
                total_requests: 2,
                pending_requests: 1,
                total_quotations: 2,
                approved_quotations: 0,
            }
        );
        pool.close().await;
    }

    #[tokio::test]
    async fn verification_fails_on_empty_database() {
        let pool = setup_pool().await;
        let verification = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!verification.all_present);
        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }
}
