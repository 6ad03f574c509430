//! Integration tests for unit-of-work resolution and cancellation

mod common;

use std::time::Duration;

use common::{committed_orders, order, orders, setup, Order};
use ks_core::errors::{BoxError, DbError};
use ks_core::repositories::{Filter, Repository, Value};
use ks_infra::database::UnitState;

#[tokio::test]
async fn test_reads_see_own_uncommitted_writes() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    assert!(!uow.in_transaction());

    let created = orders(&mut uow).create(order("A-1", "pending")).await.unwrap();
    assert!(uow.in_transaction());

    let loaded = orders(&mut uow).get(Value::from(created.id)).await.unwrap();
    assert_eq!(loaded, Some(created));
    assert_eq!(committed_orders(&db.pool).await, 0);

    uow.commit().await.unwrap();
    assert_eq!(uow.state(), UnitState::Committed);
    assert_eq!(committed_orders(&db.pool).await, 1);
}

#[tokio::test]
async fn test_resolved_unit_rejects_further_use() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();
    uow.commit().await.unwrap();

    assert!(uow.commit().await.unwrap_err().is_invalid_state());
    assert!(uow.rollback().await.unwrap_err().is_invalid_state());
    let err = orders(&mut uow).count(None).await.unwrap_err();
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_rollback_discards_writes() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();

    uow.rollback().await.unwrap();

    assert_eq!(uow.state(), UnitState::RolledBack);
    assert_eq!(committed_orders(&db.pool).await, 0);
}

#[tokio::test]
async fn test_close_rolls_back_uncommitted_work() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();

    uow.close().await.unwrap();

    assert_eq!(committed_orders(&db.pool).await, 0);
}

#[tokio::test]
async fn test_commit_without_statements_is_a_noop() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();

    uow.commit().await.unwrap();
    assert_eq!(uow.state(), UnitState::Committed);
}

#[tokio::test]
async fn test_cancelled_statement_poisons_the_unit() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();

    let slow = sqlx::query_as::<_, (i64,)>(
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 50000000) \
         SELECT COUNT(*) FROM c",
    );
    let outcome = tokio::time::timeout(Duration::from_millis(20), uow.fetch_one_as(slow)).await;
    assert!(outcome.is_err(), "statement should have been cancelled");

    let err = uow.execute(sqlx::query("SELECT 1")).await.unwrap_err();
    assert!(err.is_invalid_state());
    assert_eq!(uow.state(), UnitState::RolledBack);
    assert_eq!(committed_orders(&db.pool).await, 0);
}

#[tokio::test]
async fn test_transactional_rolls_back_only_its_own_work() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();

    let err = uow
        .transactional(|uow| {
            Box::pin(async move {
                orders(uow).create(order("A-2", "pending")).await?;
                Err::<(), BoxError>("inventory check failed".into())
            })
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Transaction failed");

    let shipped = uow
        .transactional(|uow| {
            Box::pin(async move {
                let mut repo = orders(uow);
                let created = repo.create(order("A-3", "pending")).await?;
                repo.update(Value::from(created.id), order("A-3", "shipped")).await
            })
        })
        .await
        .unwrap();
    assert_eq!(shipped.map(|o| o.status), Some("shipped".to_string()));

    let references: Vec<Option<String>> = orders(&mut uow)
        .filter(0, None, &Filter::new())
        .await
        .unwrap()
        .into_iter()
        .map(|o: Order| o.reference)
        .collect();
    assert_eq!(references, vec![Some("A-1".to_string()), Some("A-3".to_string())]);

    uow.commit().await.unwrap();
    assert_eq!(committed_orders(&db.pool).await, 2);
}

#[tokio::test]
async fn test_failed_statement_leaves_unit_usable() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();

    let err = uow
        .execute(sqlx::query("INSERT INTO missing_table (x) VALUES (1)"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }));
    assert!(uow.is_active());

    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();
    uow.commit().await.unwrap();
    assert_eq!(committed_orders(&db.pool).await, 1);
}
