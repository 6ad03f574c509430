//! # Keystone Core
//!
//! Storage-agnostic layer of the Keystone backend: the error taxonomy shared
//! by services and the database layer, and the generic repository contract
//! that the infrastructure crate implements on top of SQL.

pub mod errors;
pub mod repositories;

// Re-export commonly used types for convenience
pub use errors::{DbError, DbResult, DomainError, DomainResult};
pub use repositories::{Attributes, Entity, Filter, Repository, Value};
