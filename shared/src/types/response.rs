//! Success and health envelopes returned by API handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of every JSON reply; exactly one of `data` and `error` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Correlates the reply with the `request_id` span field in the logs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl<T> ApiResponse<T> {
    fn envelope(data: Option<T>, error: Option<String>) -> Self {
        Self {
            success: error.is_none(),
            message: None,
            data,
            error,
            timestamp: Utc::now(),
            request_id: None,
        }
    }

    pub fn success(data: T) -> Self {
        Self::envelope(Some(data), None)
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::envelope(None, Some(error.into()))
    }

    pub fn with_message(self, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..self
        }
    }

    pub fn with_request_id(self, request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..self
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Transform the payload, keeping the rest of the envelope
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        let ApiResponse {
            success,
            message,
            data,
            error,
            timestamp,
            request_id,
        } = self;

        ApiResponse {
            success,
            message,
            data: data.map(f),
            error,
            timestamp,
            request_id,
        }
    }
}

/// Reply for operations with nothing to return but a confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Probe outcome, ordered so that the worst status compares greatest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Result of probing one dependency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
}

impl ServiceHealth {
    pub fn healthy(response_time_ms: Option<f64>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            message: None,
            response_time_ms,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
            response_time_ms: None,
        }
    }
}

/// Aggregate of every dependency probe, keyed by dependency name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub services: BTreeMap<String, ServiceHealth>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    /// The overall status is the worst individual status; no services means healthy
    pub fn from_services(
        services: BTreeMap<String, ServiceHealth>,
        version: impl Into<String>,
    ) -> Self {
        let status = services
            .values()
            .map(|service| service.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            services,
            timestamp: Utc::now(),
            version: version.into(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_error() {
        let response = ApiResponse::success(7)
            .with_message("Order retrieved")
            .with_request_id("req-1");

        assert!(response.is_success());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], 7);
        assert_eq!(json["message"], "Order retrieved");
        assert_eq!(json["request_id"], "req-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_has_no_data() {
        let response: ApiResponse<u32> = ApiResponse::error("boom");
        assert!(!response.is_success());
        assert_eq!(response.error.as_deref(), Some("boom"));

        let mapped = response.map(|n| n * 2);
        assert!(!mapped.is_success());
        assert!(mapped.into_data().is_none());
    }

    #[test]
    fn test_message_response() {
        let response = MessageResponse::new("Item deleted");
        assert!(response.success);
        assert_eq!(response.message, "Item deleted");
    }

    #[test]
    fn test_health_response_worst_status_wins() {
        let mut services = BTreeMap::new();
        services.insert("database".to_string(), ServiceHealth::healthy(Some(1.5)));
        services.insert("queue".to_string(), ServiceHealth::unhealthy("connection refused"));

        let response = HealthResponse::from_services(services, "0.1.0");
        assert_eq!(response.status, HealthStatus::Unhealthy);
        assert!(!response.is_healthy());

        let empty = HealthResponse::from_services(BTreeMap::new(), "0.1.0");
        assert!(empty.is_healthy());
    }
}
