use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RateCategoryId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogHardwareItem {
    pub id: HardwareItemId,
    pub name: String,
    pub description: String,
    pub category: String,
    pub manufacturer: String,
    pub model_number: String,
    pub unit_cost: Decimal,
    pub currency: String,
    pub supplier: String,
    pub lead_time_days: u32,
    pub minimum_order_quantity: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogHardwareItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        unit_cost: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: HardwareItemId(id.into()),
            name: name.into(),
            description: String::new(),
            category: category.into(),
            manufacturer: String::new(),
            model_number: String::new(),
            unit_cost,
            currency: DEFAULT_CURRENCY.to_owned(),
            supplier: String::new(),
            lead_time_days: 0,
            minimum_order_quantity: 1,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name", "must not be blank"));
        }
        if self.category.trim().is_empty() {
            return Err(DomainError::validation("category", "must not be blank"));
        }
        if self.unit_cost.is_sign_negative() {
            return Err(DomainError::validation("unit_cost", "must not be negative"));
        }
        validate_currency(&self.currency)?;
        if self.minimum_order_quantity == 0 {
            return Err(DomainError::validation("minimum_order_quantity", "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonnelRateCategory {
    pub id: RateCategoryId,
    pub name: String,
    pub description: String,
    pub hourly_rate: Decimal,
    pub currency: String,
    pub active: bool,
}

impl PersonnelRateCategory {
    pub fn new(id: impl Into<String>, name: impl Into<String>, hourly_rate: Decimal) -> Self {
        Self {
            id: RateCategoryId(id.into()),
            name: name.into(),
            description: String::new(),
            hourly_rate,
            currency: DEFAULT_CURRENCY.to_owned(),
            active: true,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("name", "must not be blank"));
        }
        if self.hourly_rate.is_sign_negative() {
            return Err(DomainError::validation("hourly_rate", "must not be negative"));
        }
        validate_currency(&self.currency)
    }
}

/// ISO-4217 style: exactly three ASCII uppercase letters.
pub fn validate_currency(currency: &str) -> Result<(), DomainError> {
    if currency.len() == 3 && currency.chars().all(|ch| ch.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(DomainError::validation("currency", format!("`{currency}` is not a 3-letter code")))
    }
}
