//! Unit tests for the repository trait's provided methods

use serde_json::json;

use super::mock::{MockOrderRepository, Order};
use crate::errors::DbError;
use crate::repositories::{Attributes, Entity, Filter, Repository, SortOrder, Value};

async fn seeded() -> MockOrderRepository {
    let mut repo = MockOrderRepository::new();
    repo.create_many(vec![
        Attributes::new().set("status", "pending"),
        Attributes::new().set("status", "pending"),
        Attributes::new().set("status", "shipped"),
    ])
    .await
    .unwrap();
    repo
}

#[test]
fn test_entity_descriptor() {
    assert_eq!(Order::PRIMARY_KEY, "id");
    assert!(Order::has_column("status"));
    assert!(!Order::has_column("customer"));
}

#[tokio::test]
async fn test_exists_uses_count() {
    let mut repo = seeded().await;

    assert!(repo.exists(&Filter::new().eq("status", "shipped")).await.unwrap());
    assert!(!repo.exists(&Filter::new().eq("status", "cancelled")).await.unwrap());
}

#[tokio::test]
async fn test_get_or_raise_reports_entity_and_id() {
    let mut repo = seeded().await;

    let found = repo.get_or_raise(Value::from(2)).await.unwrap();
    assert_eq!(found.id, 2);

    let err = repo.get_or_raise(Value::from(99)).await.unwrap_err();
    match err {
        DbError::NotFound { entity, lookup } => {
            assert_eq!(entity, "Order");
            assert_eq!(lookup, json!({"id": 99}));
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_by_or_raise_reports_filter() {
    let mut repo = seeded().await;

    let newest_pending = repo
        .get_by_or_raise(&Filter::new().eq("status", "pending").order_by("id", SortOrder::Desc))
        .await
        .unwrap();
    assert_eq!(newest_pending.id, 2);

    let err = repo
        .get_by_or_raise(&Filter::new().eq("status", "cancelled"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), r#"Order not found: {"status":"cancelled"}"#);
}

#[tokio::test]
async fn test_update_and_delete_missing_rows() {
    let mut repo = seeded().await;

    let updated = repo
        .update(Value::from(42), Attributes::new().set("status", "shipped"))
        .await
        .unwrap();
    assert!(updated.is_none());
    assert!(!repo.delete(Value::from(42)).await.unwrap());
    assert_eq!(repo.count(None).await.unwrap(), 3);
}
