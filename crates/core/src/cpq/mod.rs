pub mod catalog;
pub mod pricing;
pub mod valuation;

pub use catalog::Catalog;
pub use pricing::{aggregate, PricingTrace, PricingTraceStep, QuotationTotals};
pub use valuation::{round_money, value_line};
