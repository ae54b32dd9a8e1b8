use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use quotedesk_core::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
use quotedesk_core::domain::quotation::{Quotation, QuotationId};
use quotedesk_core::domain::request::{CustomerRequest, CustomerRequestId, RequestStatus};
use quotedesk_core::store::{quotation_sequence, QuotationStore, RequestStatusChange, StoreError};
use quotedesk_core::Catalog;

use super::{CatalogRepository, CustomerRequestRepository, RepositoryError};

#[derive(Default)]
struct MemoryState {
    requests: HashMap<String, CustomerRequest>,
    hardware: HashMap<String, CatalogHardwareItem>,
    rate_categories: HashMap<String, PersonnelRateCategory>,
    quotations: HashMap<String, Quotation>,
}

impl MemoryState {
    fn apply_request_change(
        &mut self,
        change: &RequestStatusChange,
        writing: &QuotationId,
    ) -> Result<(), StoreError> {
        if change.only_if_last_open && self.has_other_open_quotations(&change.request_id, writing) {
            return Ok(());
        }
        let conflict = || StoreError::RequestStatusConflict {
            request_id: change.request_id.0.clone(),
            expected: change.from.as_str(),
        };
        let request = self.requests.get_mut(&change.request_id.0).ok_or_else(conflict)?;
        if request.status != change.from {
            return Err(conflict());
        }
        request.status = change.to;
        request.updated_at = change.changed_at;
        Ok(())
    }

    fn has_other_open_quotations(
        &self,
        request_id: &CustomerRequestId,
        excluding: &QuotationId,
    ) -> bool {
        self.quotations.values().any(|quotation| {
            quotation.customer_request_id == *request_id
                && quotation.id != *excluding
                && quotation.is_open()
        })
    }

    fn line_references(&self, matches: impl Fn(&Quotation) -> bool) -> bool {
        self.quotations.values().any(matches)
    }
}

/// Process-local store with the same versioning and uniqueness rules as the SQL store.
///
/// One lock guards every table so each write is atomic across quotation, lines and request.
#[derive(Default)]
pub struct InMemoryQuotationStore {
    state: RwLock<MemoryState>,
}

impl InMemoryQuotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preloads the catalog entries, replacing any with the same id.
    pub async fn with_catalog(self, catalog: &Catalog) -> Self {
        {
            let mut state = self.state.write().await;
            for item in catalog.hardware() {
                state.hardware.insert(item.id.0.clone(), item.clone());
            }
            for category in catalog.rate_categories() {
                state.rate_categories.insert(category.id.0.clone(), category.clone());
            }
        }
        self
    }

    pub async fn quotation_count(&self) -> usize {
        self.state.read().await.quotations.len()
    }
}

#[async_trait]
impl QuotationStore for InMemoryQuotationStore {
    async fn find_request(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, StoreError> {
        Ok(self.state.read().await.requests.get(&id.0).cloned())
    }

    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, StoreError> {
        Ok(self.state.read().await.hardware.get(&id.0).cloned())
    }

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, StoreError> {
        Ok(self.state.read().await.rate_categories.get(&id.0).cloned())
    }

    async fn find_quotation(&self, id: &QuotationId) -> Result<Option<Quotation>, StoreError> {
        Ok(self.state.read().await.quotations.get(&id.0).cloned())
    }

    async fn next_quotation_sequence(&self, prefix: &str, year: i32) -> Result<u32, StoreError> {
        let state = self.state.read().await;
        let highest = state
            .quotations
            .values()
            .filter_map(|quotation| quotation_sequence(&quotation.quotation_number, prefix, year))
            .max()
            .unwrap_or(0);
        Ok(highest.saturating_add(1))
    }

    async fn insert_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError> {
        let mut state = self.state.write().await;

        if !state.requests.contains_key(&quotation.customer_request_id.0) {
            return Err(StoreError::Backend(format!(
                "customer request `{}` does not exist",
                quotation.customer_request_id.0
            )));
        }
        if state.quotations.contains_key(&quotation.id.0) {
            return Err(StoreError::Duplicate { constraint: "quotation.id".to_owned() });
        }
        if state
            .quotations
            .values()
            .any(|existing| existing.quotation_number == quotation.quotation_number)
        {
            return Err(StoreError::Duplicate {
                constraint: "quotation.quotation_number".to_owned(),
            });
        }
        if let Some(change) = request_change {
            state.apply_request_change(change, &quotation.id)?;
        }

        let mut stored = quotation.clone();
        stored.version = 1;
        state.quotations.insert(stored.id.0.clone(), stored);
        Ok(1)
    }

    async fn update_quotation(
        &self,
        quotation: &Quotation,
        request_change: Option<&RequestStatusChange>,
    ) -> Result<u32, StoreError> {
        let mut state = self.state.write().await;

        let current_version = state.quotations.get(&quotation.id.0).map(|stored| stored.version);
        if current_version != Some(quotation.version) {
            return Err(StoreError::VersionConflict {
                quotation_id: quotation.id.0.clone(),
                expected_version: quotation.version,
            });
        }
        if let Some(change) = request_change {
            state.apply_request_change(change, &quotation.id)?;
        }

        let mut stored = quotation.clone();
        stored.version = quotation.version + 1;
        let version = stored.version;
        state.quotations.insert(stored.id.0.clone(), stored);
        Ok(version)
    }
}

#[async_trait]
impl CustomerRequestRepository for InMemoryQuotationStore {
    async fn find_by_id(
        &self,
        id: &CustomerRequestId,
    ) -> Result<Option<CustomerRequest>, RepositoryError> {
        Ok(self.state.read().await.requests.get(&id.0).cloned())
    }

    async fn find_by_request_number(
        &self,
        request_number: &str,
    ) -> Result<Option<CustomerRequest>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .requests
            .values()
            .find(|request| request.request_number == request_number)
            .cloned())
    }

    async fn list_by_status(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<CustomerRequest>, RepositoryError> {
        let state = self.state.read().await;
        let mut requests: Vec<_> = state
            .requests
            .values()
            .filter(|request| status.map_or(true, |status| request.status == status))
            .cloned()
            .collect();
        requests.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| left.request_number.cmp(&right.request_number))
        });
        Ok(requests)
    }

    async fn save(&self, request: CustomerRequest) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.requests.insert(request.id.0.clone(), request);
        Ok(())
    }

    async fn delete(&self, id: &CustomerRequestId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let existed = state.requests.remove(&id.0).is_some();
        if existed {
            state.quotations.retain(|_, quotation| quotation.customer_request_id != *id);
        }
        Ok(existed)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryQuotationStore {
    async fn find_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<Option<CatalogHardwareItem>, RepositoryError> {
        Ok(self.state.read().await.hardware.get(&id.0).cloned())
    }

    async fn list_active_hardware(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<CatalogHardwareItem>, RepositoryError> {
        let state = self.state.read().await;
        let catalog = Catalog::new(state.hardware.values().cloned().collect(), Vec::new());
        Ok(catalog.active_hardware(category).into_iter().cloned().collect())
    }

    async fn save_hardware_item(&self, item: CatalogHardwareItem) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.hardware.insert(item.id.0.clone(), item);
        Ok(())
    }

    async fn deactivate_hardware_item(
        &self,
        id: &HardwareItemId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.hardware.get_mut(&id.0).map(|item| item.active = false).is_some())
    }

    async fn delete_hardware_item(&self, id: &HardwareItemId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if state.line_references(|quotation| {
            quotation.hardware_lines().iter().any(|line| line.hardware_item_id() == id)
        }) {
            return Err(RepositoryError::ReferencedEntity {
                entity: "hardware_item",
                id: id.0.clone(),
            });
        }
        Ok(state.hardware.remove(&id.0).is_some())
    }

    async fn find_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<Option<PersonnelRateCategory>, RepositoryError> {
        Ok(self.state.read().await.rate_categories.get(&id.0).cloned())
    }

    async fn list_active_rate_categories(
        &self,
    ) -> Result<Vec<PersonnelRateCategory>, RepositoryError> {
        let state = self.state.read().await;
        let catalog = Catalog::new(Vec::new(), state.rate_categories.values().cloned().collect());
        Ok(catalog.active_rate_categories().into_iter().cloned().collect())
    }

    async fn save_rate_category(
        &self,
        category: PersonnelRateCategory,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.rate_categories.insert(category.id.0.clone(), category);
        Ok(())
    }

    async fn deactivate_rate_category(
        &self,
        id: &RateCategoryId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        Ok(state.rate_categories.get_mut(&id.0).map(|category| category.active = false).is_some())
    }

    async fn delete_rate_category(&self, id: &RateCategoryId) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if state.line_references(|quotation| {
            quotation.personnel_lines().iter().any(|line| line.rate_category_id() == id)
        }) {
            return Err(RepositoryError::ReferencedEntity {
                entity: "rate_category",
                id: id.0.clone(),
            });
        }
        Ok(state.rate_categories.remove(&id.0).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use quotedesk_core::domain::catalog::{CatalogHardwareItem, PersonnelRateCategory};
    use quotedesk_core::domain::quotation::Quotation;
    use quotedesk_core::domain::request::{CustomerRequest, RequestStatus};
    use quotedesk_core::store::{QuotationStore, RequestStatusChange, StoreError};
    use quotedesk_core::Catalog;

    use super::InMemoryQuotationStore;
    use crate::repositories::{CatalogRepository, CustomerRequestRepository, RepositoryError};

    #[tokio::test]
    async fn in_memory_store_enforces_versions() {
        let (store, request, _) = seeded_store().await;
        let now = Utc::now();
        let mut quotation =
            Quotation::new("QT-1", request.id.clone(), "alice", "USD", now).expect("quotation");

        quotation.version = store.insert_quotation(&quotation, None).await.expect("insert");
        assert_eq!(quotation.version, 1);

        let stale = quotation.clone();
        quotation.version = store.update_quotation(&quotation, None).await.expect("update");
        assert_eq!(quotation.version, 2);

        let conflict = store.update_quotation(&stale, None).await;
        assert!(matches!(conflict, Err(StoreError::VersionConflict { expected_version: 1, .. })));
    }

    #[tokio::test]
    async fn in_memory_store_rejects_duplicate_numbers_and_stale_request_status() {
        let (store, request, _) = seeded_store().await;
        let now = Utc::now();
        let first =
            Quotation::new("QT-1", request.id.clone(), "alice", "USD", now).expect("quotation");
        let second =
            Quotation::new("QT-1", request.id.clone(), "bob", "USD", now).expect("quotation");
        store.insert_quotation(&first, None).await.expect("insert");

        let duplicate = store.insert_quotation(&second, None).await;
        assert!(matches!(duplicate, Err(StoreError::Duplicate { .. })));

        let third =
            Quotation::new("QT-2", request.id.clone(), "bob", "USD", now).expect("quotation");
        let stale = RequestStatusChange::new(
            request.id.clone(),
            RequestStatus::Quoted,
            RequestStatus::InProgress,
            now,
        );
        let refused = store.insert_quotation(&third, Some(&stale)).await;
        assert!(matches!(refused, Err(StoreError::RequestStatusConflict { .. })));
        assert_eq!(store.quotation_count().await, 1);
    }

    #[tokio::test]
    async fn rejection_reaches_the_request_only_from_the_last_open_quotation() {
        let (store, mut request, _) = seeded_store().await;
        let now = Utc::now();
        request.status = RequestStatus::Quoted;
        store.save(request.clone()).await.expect("save request");

        let mut first =
            Quotation::new("QT-1", request.id.clone(), "alice", "USD", now).expect("quotation");
        let mut second =
            Quotation::new("QT-2", request.id.clone(), "alice", "USD", now).expect("quotation");
        first.version = store.insert_quotation(&first, None).await.expect("insert");
        second.version = store.insert_quotation(&second, None).await.expect("insert");

        let rejected = RequestStatusChange::new(
            request.id.clone(),
            RequestStatus::Quoted,
            RequestStatus::Rejected,
            now,
        )
        .when_last_open();

        first.reject("rita", None, now).expect("reject");
        store.update_quotation(&first, Some(&rejected)).await.expect("update");
        let status = |request: Option<CustomerRequest>| request.expect("request").status;
        assert_eq!(
            status(QuotationStore::find_request(&store, &request.id).await.expect("find")),
            RequestStatus::Quoted
        );

        second.reject("rita", None, now).expect("reject");
        store.update_quotation(&second, Some(&rejected)).await.expect("update");
        assert_eq!(
            status(QuotationStore::find_request(&store, &request.id).await.expect("find")),
            RequestStatus::Rejected
        );
    }

    #[tokio::test]
    async fn referenced_catalog_entries_cannot_be_deleted() {
        let (store, request, item) = seeded_store().await;
        let now = Utc::now();
        let mut quotation =
            Quotation::new("QT-1", request.id.clone(), "alice", "USD", now).expect("quotation");
        quotation.upsert_hardware_line(&item, 1, None, now).expect("line");
        store.insert_quotation(&quotation, None).await.expect("insert");

        let refused = store.delete_hardware_item(&item.id).await;
        assert!(matches!(refused, Err(RepositoryError::ReferencedEntity { .. })));

        assert!(store.deactivate_hardware_item(&item.id).await.expect("deactivate"));
        assert!(store.list_active_hardware(None).await.expect("list").is_empty());
        assert!(QuotationStore::find_hardware_item(&store, &item.id)
            .await
            .expect("find")
            .is_some());
    }

    async fn seeded_store() -> (InMemoryQuotationStore, CustomerRequest, CatalogHardwareItem) {
        let now = Utc::now();
        let item = CatalogHardwareItem::new("hw-1", "Router", "networking", Decimal::TEN, now);
        let rate = PersonnelRateCategory::new("rate-1", "Engineer", Decimal::ONE_HUNDRED);
        let store = InMemoryQuotationStore::new()
            .with_catalog(&Catalog::new(vec![item.clone()], vec![rate]))
            .await;
        let request = CustomerRequest::new("REQ-1", "Dana", "dana@example.com", "Refresh", now);
        store.save(request.clone()).await.expect("save request");
        (store, request, item)
    }
}
