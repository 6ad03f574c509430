//! Shorthand constructors for the common [`DomainError`] cases

use ks_shared::errors::ErrorCode;
use std::fmt::Display;

use super::domain_error::DomainError;

/// An entity lookup by id matched nothing
pub fn entity_not_found(entity_type: &str, entity_id: impl Display) -> DomainError {
    DomainError::new(
        ErrorCode::EntityNotFound,
        format!("{} with ID '{}' not found", entity_type, entity_id),
    )
    .with_context("entity_type", entity_type)
    .with_context("entity_id", entity_id.to_string())
}

pub fn missing_field(field: &str) -> DomainError {
    DomainError::new(ErrorCode::MissingField, format!("Required field '{}' is missing", field))
        .with_context("field", field)
}

pub fn invalid_format(field: &str, expected: &str) -> DomainError {
    DomainError::new(
        ErrorCode::InvalidFormat,
        format!("Field '{}' has invalid format. Expected: {}", field, expected),
    )
    .with_context("field", field)
    .with_context("expected_format", expected)
}

/// A unique field already holds `value`
pub fn duplicate_entry(entity_type: &str, field: &str, value: impl Display) -> DomainError {
    DomainError::new(
        ErrorCode::DuplicateEntry,
        format!("{} with {} '{}' already exists", entity_type, field, value),
    )
    .with_context("entity_type", entity_type)
    .with_context("field", field)
    .with_context("value", value.to_string())
}

pub fn constraint_violation(constraint: &str) -> DomainError {
    DomainError::new(
        ErrorCode::ConstraintViolation,
        format!("Constraint violation: {}", constraint),
    )
    .with_context("constraint", constraint)
}

pub fn invalid_state(current_state: &str, expected_state: Option<&str>) -> DomainError {
    let message = match expected_state {
        Some(expected) => format!("Invalid state: {}. Expected: {}", current_state, expected),
        None => format!("Invalid state: {}", current_state),
    };

    let err = DomainError::new(ErrorCode::InvalidState, message)
        .with_context("current_state", current_state);
    match expected_state {
        Some(expected) => err.with_context("expected_state", expected),
        None => err,
    }
}

pub fn business_rule(rule: &str, message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::BusinessRuleViolation, message).with_context("rule", rule)
}

pub fn operation_not_allowed(operation: &str, reason: Option<&str>) -> DomainError {
    let message = match reason {
        Some(reason) => format!("Operation not allowed: {} - {}", operation, reason),
        None => format!("Operation not allowed: {}", operation),
    };
    DomainError::new(ErrorCode::OperationNotAllowed, message).with_context("operation", operation)
}

pub fn access_denied(resource: &str) -> DomainError {
    DomainError::new(ErrorCode::AccessDenied, format!("Access denied to {}", resource))
        .with_context("resource", resource)
}

pub fn authentication_required() -> DomainError {
    DomainError::new(ErrorCode::AuthenticationRequired, "Authentication required")
}

pub fn external_service_unavailable(service: &str) -> DomainError {
    DomainError::new(
        ErrorCode::ExternalServiceUnavailable,
        format!("External service '{}' is unavailable", service),
    )
    .with_context("service", service)
}

pub fn external_service_timeout(service: &str, timeout_secs: u64) -> DomainError {
    DomainError::new(
        ErrorCode::ExternalServiceTimeout,
        format!("External service '{}' timed out after {}s", service, timeout_secs),
    )
    .with_context("service", service)
    .with_context("timeout_seconds", timeout_secs)
}

pub fn configuration_error(setting: &str, message: impl Display) -> DomainError {
    DomainError::new(
        ErrorCode::ConfigurationError,
        format!("Configuration error for '{}': {}", setting, message),
    )
    .with_context("setting", setting)
}

pub fn internal(message: impl Into<String>) -> DomainError {
    DomainError::new(ErrorCode::InternalError, message)
}
