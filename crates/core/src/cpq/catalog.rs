use crate::domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};

/// Read-only lookup over a loaded set of catalog entries.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    hardware: Vec<CatalogHardwareItem>,
    rate_categories: Vec<PersonnelRateCategory>,
}

impl Catalog {
    pub fn new(
        hardware: Vec<CatalogHardwareItem>,
        rate_categories: Vec<PersonnelRateCategory>,
    ) -> Self {
        Self { hardware, rate_categories }
    }

    pub fn hardware(&self) -> &[CatalogHardwareItem] {
        &self.hardware
    }

    pub fn rate_categories(&self) -> &[PersonnelRateCategory] {
        &self.rate_categories
    }

    pub fn find_hardware(&self, id: &HardwareItemId) -> Option<&CatalogHardwareItem> {
        self.hardware.iter().find(|item| &item.id == id)
    }

    pub fn find_rate_category(&self, id: &RateCategoryId) -> Option<&PersonnelRateCategory> {
        self.rate_categories.iter().find(|category| &category.id == id)
    }

    /// Active hardware sorted by category then name, optionally limited to one category.
    pub fn active_hardware(&self, category: Option<&str>) -> Vec<&CatalogHardwareItem> {
        let mut items: Vec<_> = self
            .hardware
            .iter()
            .filter(|item| item.active)
            .filter(|item| category.map_or(true, |category| item.category == category))
            .collect();
        items.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        items
    }

    pub fn active_rate_categories(&self) -> Vec<&PersonnelRateCategory> {
        let mut categories: Vec<_> =
            self.rate_categories.iter().filter(|category| category.active).collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        categories
    }
}
