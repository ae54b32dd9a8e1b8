use sqlx::{sqlite::SqliteRow, Row};

use quotedesk_core::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};

use super::{parse_decimal, parse_timestamp, parse_u32, CatalogRepository, RepositoryError};
use crate::DbPool;

const HARDWARE_COLUMNS: &str = "id,
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
    updated_at";

const RATE_COLUMNS: &str = "id, name, description, hourly_rate, currency, active";

pub struct SqlCatalogRepository {
    pool: DbPool,
}

impl SqlCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn is_referenced(&self, sql: &str, id: &str) -> Result<bool, RepositoryError> {
        let referenced: i64 = sqlx::query_scalar(sql).bind(id).fetch_one(&self.pool).await?;
        Ok(referenced == 1)
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqlCatalogRepository {
    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {HARDWARE_COLUMNS} FROM catalog_hardware_item WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(hardware_from_row).transpose()
    }

    async fn list_active_hardware(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CatalogHardwareItem>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {HARDWARE_COLUMNS} FROM catalog_hardware_item
             WHERE active = 1 AND (?1 IS NULL OR category = ?1)
             ORDER BY category ASC, name ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hardware_from_row).collect()
    }

    async fn save_hardware_item(&self, item: CatalogHardwareItem) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO catalog_hardware_item (
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
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                manufacturer = excluded.manufacturer,
                model_number = excluded.model_number,
                unit_cost = excluded.unit_cost,
                currency = excluded.currency,
                supplier = excluded.supplier,
                lead_time_days = excluded.lead_time_days,
                minimum_order_quantity = excluded.minimum_order_quantity,
                active = excluded.active,
                updated_at = excluded.updated_at",
        )
        .bind(&item.id.0)
        .bind(&item.name)
        .bind(&item.description)
        .bind(&item.category)
        .bind(&item.manufacturer)
        .bind(&item.model_number)
        .bind(item.unit_cost.to_string())
        .bind(&item.currency)
        .bind(&item.supplier)
        .bind(i64::from(item.lead_time_days))
        .bind(i64::from(item.minimum_order_quantity))
        .bind(item.active)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE catalog_hardware_item SET active = 0, updated_at = ? WHERE id = ?",
        )
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_hardware_item(&self, id: &HardwareItemId) -> Result<bool, RepositoryError> {
        if self
            .is_referenced(
                "SELECT EXISTS(SELECT 1 FROM quotation_hardware_line WHERE hardware_item_id = ?)",
                &id.0,
            )
            .await?
        {
            return Err(RepositoryError::ReferencedEntity {
                entity: "hardware_item",
                id: id.0.clone(),
            });
        }

        let result = sqlx::query("DELETE FROM catalog_hardware_item WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {RATE_COLUMNS} FROM personnel_rate_category WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(rate_category_from_row).transpose()
    }

    async fn list_active_rate_categories(
        &self,
    ) -> Result<Vec<PersonnelRateCategory>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {RATE_COLUMNS} FROM personnel_rate_category
             WHERE active = 1
             ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(rate_category_from_row).collect()
    }

    async fn save_rate_category(
        &self,
        category: PersonnelRateCategory,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO personnel_rate_category (
                id,
                name,
                description,
                hourly_rate,
                currency,
                active
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                hourly_rate = excluded.hourly_rate,
                currency = excluded.currency,
                active = excluded.active",
        )
        .bind(&category.id.0)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.hourly_rate.to_string())
        .bind(&category.currency)
        .bind(category.active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn deactivate_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE personnel_rate_category SET active = 0 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_rate_category(&self, id: &RateCategoryId) -> Result<bool, RepositoryError> {
        if self
            .is_referenced(
                "SELECT EXISTS(SELECT 1 FROM quotation_personnel_line WHERE rate_category_id = ?)",
                &id.0,
            )
            .await?
        {
            return Err(RepositoryError::ReferencedEntity {
                entity: "rate_category",
                id: id.0.clone(),
            });
        }

        let result = sqlx::query("DELETE FROM personnel_rate_category WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub(crate) fn hardware_from_row(row: SqliteRow) -> Result<CatalogHardwareItem, RepositoryError> {
    Ok(CatalogHardwareItem {
        id: HardwareItemId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        manufacturer: row.try_get("manufacturer")?,
        model_number: row.try_get("model_number")?,
        unit_cost: parse_decimal("unit_cost", row.try_get("unit_cost")?)?,
        currency: row.try_get("currency")?,
        supplier: row.try_get("supplier")?,
        lead_time_days: parse_u32("lead_time_days", row.try_get("lead_time_days")?)?,
        minimum_order_quantity: parse_u32(
            "minimum_order_quantity",
            row.try_get("minimum_order_quantity")?,
        )?,
        active: row.try_get("active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn rate_category_from_row(
    row: SqliteRow,
) -> Result<PersonnelRateCategory, RepositoryError> {
    Ok(PersonnelRateCategory {
        id: RateCategoryId(row.try_get("id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        hourly_rate: parse_decimal("hourly_rate", row.try_get("hourly_rate")?)?,
        currency: row.try_get("currency")?,
        active: row.try_get("active")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use quotedesk_core::domain::catalog::{CatalogHardwareItem, PersonnelRateCategory};

    use super::SqlCatalogRepository;
    use crate::migrations;
    use crate::repositories::{CatalogRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn sql_catalog_repo_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        let mut item = sample_item("hw-switch", "Core Switch", "networking");
        item.manufacturer = "Acme Networks".to_owned();
        item.lead_time_days = 14;
        let rate = PersonnelRateCategory::new("rate-eng", "Field Engineer", Decimal::new(12500, 2));

        repo.save_hardware_item(item.clone()).await.expect("save item");
        repo.save_rate_category(rate.clone()).await.expect("save rate");

        assert_eq!(repo.find_hardware_item(&item.id).await.expect("find item"), Some(item));
        assert_eq!(repo.find_rate_category(&rate.id).await.expect("find rate"), Some(rate));
        pool.close().await;
    }

    #[tokio::test]
    async fn active_hardware_is_sorted_and_filterable() {
        let pool = setup_pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        for item in [
            sample_item("hw-3", "Rack", "infrastructure"),
            sample_item("hw-2", "Switch", "networking"),
            sample_item("hw-1", "Firewall", "networking"),
            sample_item("hw-4", "Old Router", "networking"),
        ] {
            repo.save_hardware_item(item).await.expect("save item");
        }
        let retired = quotedesk_core::domain::catalog::HardwareItemId("hw-4".to_owned());
        assert!(repo.deactivate_hardware_item(&retired).await.expect("deactivate"));

        let all = repo.list_active_hardware(None).await.expect("list all");
        let names: Vec<_> = all.iter().map(|item| item.name.as_str()).collect();
        assert_eq!(names, vec!["Rack", "Firewall", "Switch"]);

        let networking = repo.list_active_hardware(Some("networking")).await.expect("list");
        assert_eq!(networking.len(), 2);
        pool.close().await;
    }

    #[tokio::test]
    async fn referenced_catalog_entries_cannot_be_deleted() {
        let pool = setup_pool().await;
        let repo = SqlCatalogRepository::new(pool.clone());
        let item = sample_item("hw-1", "Firewall", "networking");
        repo.save_hardware_item(item.clone()).await.expect("save item");

        sqlx::query(
            "INSERT INTO customer_request
                (id, request_number, customer_name, customer_email, created_at, updated_at)
             VALUES ('req-1', 'REQ-1', 'Dana', 'dana@example.com', ?1, ?1)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert request");
        sqlx::query(
            "INSERT INTO quotation
                (id, quotation_number, customer_request_id, created_by, created_at, updated_at)
             VALUES ('q-1', 'QT-1', 'req-1', 'alice', ?1, ?1)",
        )
        .bind(Utc::now().to_rfc3339())
        .execute(&pool)
        .await
        .expect("insert quotation");
        sqlx::query(
            "INSERT INTO quotation_hardware_line
                (id, quotation_id, hardware_item_id, position, quantity, unit_cost, total_cost)
             VALUES ('line-1', 'q-1', 'hw-1', 0, 1, '10.00', '10.00')",
        )
        .execute(&pool)
        .await
        .expect("insert line");

        let refused = repo.delete_hardware_item(&item.id).await;
        assert!(matches!(
            refused,
            Err(RepositoryError::ReferencedEntity { entity: "hardware_item", .. })
        ));
        assert!(repo.find_hardware_item(&item.id).await.expect("find").is_some());
        pool.close().await;
    }

    fn sample_item(id: &str, name: &str, category: &str) -> CatalogHardwareItem {
        CatalogHardwareItem::new(id, name, category, Decimal::new(25000, 2), parse_ts())
    }

    fn parse_ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T09:00:00Z")
            .expect("valid rfc3339")
            .with_timezone(&Utc)
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }
}
