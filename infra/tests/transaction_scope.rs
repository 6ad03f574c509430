//! Integration tests for nested transaction scopes

mod common;

use common::{committed_orders, order, orders, setup};
use ks_core::repositories::{Attributes, Repository, Value};
use ks_infra::database::{ScopeKind, TransactionScope, UnitOfWork};

fn status(value: &str) -> Attributes {
    Attributes::new().set("status", value)
}

#[tokio::test]
async fn test_nested_rollback_keeps_outer_work() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    let id;
    {
        let mut outer = TransactionScope::begin(&mut uow).await.unwrap();
        assert_eq!(outer.kind(), ScopeKind::Transaction);

        id = orders(&mut outer).create(order("A-1", "pending")).await.unwrap().id;
        {
            let mut nested = TransactionScope::begin(&mut outer).await.unwrap();
            assert_eq!(nested.kind(), ScopeKind::Savepoint);
            assert_eq!(nested.level(), 2);

            let shipped = orders(&mut nested)
                .update(Value::from(id), status("shipped"))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(shipped.status, "shipped");

            nested.rollback().await.unwrap();
        }

        let current = orders(&mut outer).get_or_raise(Value::from(id)).await.unwrap();
        assert_eq!(current.status, "pending");
        outer.commit().await.unwrap();
    }
    assert_eq!(uow.depth(), 0);
    uow.commit().await.unwrap();

    let mut fresh = db.pool.unit_of_work().await.unwrap();
    let stored = orders(&mut fresh).get_or_raise(Value::from(id)).await.unwrap();
    assert_eq!(stored.status, "pending");
    fresh.rollback().await.unwrap();
}

#[tokio::test]
async fn test_nested_commit_is_kept_by_outer_commit() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    {
        let mut outer = TransactionScope::begin(&mut uow).await.unwrap();
        orders(&mut outer).create(order("A-1", "pending")).await.unwrap();
        {
            let mut nested = TransactionScope::begin(&mut outer).await.unwrap();
            orders(&mut nested).create(order("A-2", "pending")).await.unwrap();
            nested.commit().await.unwrap();
        }
        outer.commit().await.unwrap();
    }
    uow.commit().await.unwrap();

    assert_eq!(committed_orders(&db.pool).await, 2);
}

#[tokio::test]
async fn test_dropped_savepoint_scope_is_rolled_back_before_next_statement() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    orders(&mut uow).create(order("A-1", "pending")).await.unwrap();
    {
        let mut nested = TransactionScope::begin(&mut uow).await.unwrap();
        assert_eq!(nested.kind(), ScopeKind::Savepoint);
        orders(&mut nested).create(order("A-2", "pending")).await.unwrap();
        // dropped without commit or rollback
    }
    assert_eq!(uow.depth(), 1);

    assert_eq!(orders(&mut uow).count(None).await.unwrap(), 1);
    uow.commit().await.unwrap();
    assert_eq!(committed_orders(&db.pool).await, 1);
}

#[tokio::test]
async fn test_dropped_outer_scope_rolls_back_transaction() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    {
        let mut outer = TransactionScope::begin(&mut uow).await.unwrap();
        orders(&mut outer).create(order("A-1", "pending")).await.unwrap();
    }
    assert_eq!(uow.depth(), 0);

    assert_eq!(orders(&mut uow).count(None).await.unwrap(), 0);
    uow.commit().await.unwrap();
    assert_eq!(committed_orders(&db.pool).await, 0);
}

#[tokio::test]
async fn test_unit_cannot_resolve_while_scope_is_open() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();

    let mut scope = TransactionScope::begin(&mut uow).await.unwrap();
    let err = UnitOfWork::commit(&mut scope).await.unwrap_err();
    assert!(err.is_invalid_state());
    assert!(scope.is_active());

    scope.rollback().await.unwrap();
    assert!(!scope.is_open());
    let err = scope.commit().await.unwrap_err();
    assert!(err.is_invalid_state());
    drop(scope);

    uow.commit().await.unwrap();
}

#[tokio::test]
async fn test_deeply_nested_scopes_unwind_in_order() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    {
        let mut level1 = TransactionScope::begin(&mut uow).await.unwrap();
        orders(&mut level1).create(order("A-1", "pending")).await.unwrap();
        {
            let mut level2 = TransactionScope::begin(&mut level1).await.unwrap();
            orders(&mut level2).create(order("A-2", "pending")).await.unwrap();
            {
                let mut level3 = TransactionScope::begin(&mut level2).await.unwrap();
                assert_eq!(level3.level(), 3);
                orders(&mut level3).create(order("A-3", "pending")).await.unwrap();
                level3.commit().await.unwrap();
            }
            // rolling back level 2 also discards what level 3 released into it
            level2.rollback().await.unwrap();
        }
        assert_eq!(orders(&mut level1).count(None).await.unwrap(), 1);
        level1.commit().await.unwrap();
    }
    uow.commit().await.unwrap();

    assert_eq!(committed_orders(&db.pool).await, 1);
}

#[tokio::test]
async fn test_scope_on_resolved_unit_is_rejected() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();
    uow.commit().await.unwrap();

    let err = TransactionScope::begin(&mut uow).await.unwrap_err();
    assert!(err.is_invalid_state());
}

#[tokio::test]
async fn test_failed_savepoint_rollback_is_retried_before_next_statement() {
    let db = setup().await;
    let mut uow = db.pool.unit_of_work().await.unwrap();

    let mut outer = TransactionScope::begin(&mut uow).await.unwrap();
    {
        let mut inner = TransactionScope::begin(&mut outer).await.unwrap();
        assert_eq!(inner.depth(), 2);

        // Drop the savepoint behind the scope's back so ROLLBACK TO fails
        inner
            .execute(sqlx::query("RELEASE SAVEPOINT ks_sp_2"))
            .await
            .unwrap();
        assert!(inner.rollback().await.is_err());
    }
    assert_eq!(outer.depth(), 1);

    // The undo was queued rather than forgotten: it runs, and fails, first
    assert!(outer.execute(sqlx::query("SELECT 1")).await.is_err());
    outer.execute(sqlx::query("SELECT 1")).await.unwrap();

    outer.commit().await.unwrap();
    drop(outer);
    assert!(!uow.in_transaction());
}
