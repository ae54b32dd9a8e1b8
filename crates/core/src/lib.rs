pub mod audit;
pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod service;
pub mod store;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use cpq::{Catalog, PricingTrace, QuotationTotals};
pub use domain::approval::{ApprovalRecord, ApprovalStage, ApprovalState, RejectionRecord};
pub use domain::catalog::{
    CatalogHardwareItem, HardwareItemId, PersonnelRateCategory, RateCategoryId,
};
pub use domain::quotation::{
    Quotation, QuotationHardwareLine, QuotationId, QuotationLineId, QuotationParts,
    QuotationPersonnelLine,
};
pub use domain::request::{CustomerRequest, CustomerRequestId, RequestStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ApprovalEvent, ApprovalFlow, FlowTransitionError};
pub use service::{QuotationDraft, QuotationService, ServiceSettings};
pub use store::{QuotationStore, RequestStatusChange, StoreError};
