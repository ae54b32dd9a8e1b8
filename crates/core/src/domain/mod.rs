pub mod approval;
pub mod catalog;
pub mod quotation;
pub mod request;
