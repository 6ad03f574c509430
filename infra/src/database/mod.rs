//! Database module - SQL access layer using SQLx
//!
//! This module provides:
//! - Connection pool management ([`ConnectionPool`])
//! - Unit of work and nested transaction scopes
//! - The SQL implementation of the generic repository
//! - Liveness probing and schema migrations

pub mod backend;
pub mod error;
pub mod health;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod transaction;
pub mod unit_of_work;

// Re-export commonly used types
pub use backend::{Db, DbRow};
pub use error::classify;
pub use health::{DatabaseInfo, HealthProbe, HealthReport};
pub use migrations::run_migrations;
pub use pool::{ConnectionPool, PoolStatistics};
pub use repository::SqlRepository;
pub use transaction::{ScopeKind, TransactionScope};
pub use unit_of_work::{UnitOfWork, UnitState};
