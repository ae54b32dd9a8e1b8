pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use connection::{
    connect, connect_with_config, connect_with_settings, DbPool, BUSY_TIMEOUT_MS,
};
pub use fixtures::{DemoSeedDataset, SeedQuotationInfo, SeedResult, VerificationResult};
pub use repositories::{
    CatalogRepository, CustomerRequestRepository, InMemoryQuotationStore, RepositoryError,
    SqlCatalogRepository, SqlCustomerRequestRepository, SqlDashboardRepository,
    SqlQuotationStore,
};
