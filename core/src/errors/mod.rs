//! Error taxonomy for services and the database layer

mod database;
mod domain_error;
pub mod factory;

#[cfg(test)]
mod tests;

pub use database::{DbError, DbResult};
pub use domain_error::{BoxError, DomainError, DomainResult, ErrorContext, ErrorDetails};
pub use ks_shared::errors::{ErrorCategory, ErrorCode};
