//! Unit tests for database layer errors

use serde_json::json;
use std::error::Error;

use crate::errors::{DbError, DomainError, ErrorCode};

#[test]
fn test_retryable_classification() {
    assert!(DbError::PoolExhausted { timeout_ms: 50 }.is_retryable());
    assert!(DbError::database("connection reset", ErrorCode::DatabaseConnectionError).is_retryable());
    assert!(!DbError::database("unique violation", ErrorCode::DatabaseIntegrityError).is_retryable());
    assert!(!DbError::invalid_state("unit of work already committed").is_retryable());
    assert!(!DbError::not_found("Order", json!({"id": 1})).is_retryable());
}

#[test]
fn test_not_found_message_carries_lookup() {
    let err = DbError::not_found("Order", json!({"id": 42}));
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), r#"Order not found: {"id":42}"#);
    assert_eq!(err.code(), ErrorCode::EntityNotFound);
}

#[test]
fn test_wrap_keeps_cause_and_context() {
    let cause = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
    let err = DbError::wrap("Failed to create Order", ErrorCode::DatabaseConnectionError, cause)
        .with_context("entity", "Order");

    assert_eq!(err.to_string(), "Failed to create Order");
    assert_eq!(err.source().unwrap().to_string(), "broken pipe");
    match &err {
        DbError::Database { context, .. } => assert_eq!(context["entity"], "Order"),
        other => panic!("unexpected variant: {:?}", other),
    }
}

#[test]
fn test_with_context_ignored_for_non_database_kinds() {
    let err = DbError::PoolExhausted { timeout_ms: 10 }.with_context("entity", "Order");
    assert!(matches!(err, DbError::PoolExhausted { timeout_ms: 10 }));
}

#[test]
fn test_conversion_to_domain_error() {
    let not_found: DomainError = DbError::not_found("Order", json!({"id": 7})).into();
    assert!(matches!(not_found, DomainError::NotFound(_)));
    assert_eq!(not_found.context()["entity"], "Order");
    assert_eq!(not_found.context()["lookup"]["id"], 7);

    let exhausted: DomainError = DbError::PoolExhausted { timeout_ms: 50 }.into();
    assert_eq!(exhausted.code(), ErrorCode::DatabaseTimeout);
    assert_eq!(exhausted.code().status_code(), 503);

    let misuse: DomainError = DbError::invalid_state("scope already closed").into();
    assert!(matches!(misuse, DomainError::Internal(_)));

    let cause = std::io::Error::new(std::io::ErrorKind::Other, "constraint failed");
    let storage: DomainError =
        DbError::wrap("Failed to create Order", ErrorCode::DatabaseIntegrityError, cause).into();
    assert_eq!(storage.code(), ErrorCode::DatabaseIntegrityError);
    assert!(storage.source().is_some());
}
