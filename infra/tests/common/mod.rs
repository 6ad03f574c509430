//! Shared fixtures: a throwaway SQLite database with an `orders` table
#![allow(dead_code)]

use std::time::Duration;

use ks_core::repositories::{Attributes, Entity, Repository, Value};
use ks_infra::database::{run_migrations, ConnectionPool, SqlRepository, UnitOfWork};
use ks_shared::config::DatabaseConfig;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub reference: Option<String>,
    pub customer: String,
    pub status: String,
    pub total_cents: i64,
    pub note: Option<String>,
}

impl Entity for Order {
    const NAME: &'static str = "Order";
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static [&'static str] =
        &["id", "reference", "customer", "status", "total_cents", "note"];

    fn primary_key(&self) -> Value {
        Value::from(self.id)
    }
}

/// Pool over a fresh database file; the file lives as long as this value
pub struct TestDb {
    pub pool: ConnectionPool,
    _dir: TempDir,
}

pub async fn setup() -> TestDb {
    setup_with(|settings| settings).await
}

pub async fn setup_with(customize: impl FnOnce(DatabaseConfig) -> DatabaseConfig) -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("keystone.db").display()
    );
    let settings = DatabaseConfig::new(url)
        .with_pool_size(5)
        .with_max_overflow(0)
        .with_acquire_timeout(Duration::from_secs(5));

    let pool = ConnectionPool::new(customize(settings)).unwrap();
    run_migrations(&pool, concat!(env!("CARGO_MANIFEST_DIR"), "/tests/migrations"))
        .await
        .unwrap();

    TestDb { pool, _dir: dir }
}

pub fn order(reference: &str, status: &str) -> Attributes {
    Attributes::new()
        .set("reference", reference)
        .set("customer", "acme")
        .set("status", status)
        .set("total_cents", 1250)
}

/// Count orders through a unit of work of its own
pub async fn committed_orders(pool: &ConnectionPool) -> u64 {
    let mut uow = pool.unit_of_work().await.unwrap();
    let count = SqlRepository::<Order>::new(&mut uow)
        .count(None)
        .await
        .unwrap();
    uow.rollback().await.unwrap();
    count
}

pub fn orders(uow: &mut UnitOfWork) -> SqlRepository<'_, Order> {
    SqlRepository::new(uow)
}
