//! Structured logging bootstrap and log hygiene helpers
//!
//! [`init_logging`] installs a global `tracing` subscriber built from
//! [`LoggingConfig`]. `RUST_LOG`, when set, takes precedence over the
//! configured level. Request-scoped fields are carried by spans created with
//! [`request_span`] instead of thread-local context.

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{Span, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LogRotation, LoggingConfig};

/// Replacement for values whose key looks sensitive
pub const REDACTED: &str = "***REDACTED***";

// Matched anywhere inside a lower-cased key
const SENSITIVE_FRAGMENTS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credential",
    "private_key",
    "session_id",
    "cookie",
    "credit_card",
    "cvv",
];

// Matched only as the whole key
const SENSITIVE_KEYS: &[&str] = &["pwd", "auth", "ssn", "pin"];

// Holds the file writer guard for the process lifetime once logging is up
static LOGGING: OnceCell<Option<WorkerGuard>> = OnceCell::new();

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to install global subscriber: {0}")]
    Init(String),
}

/// Install the global subscriber; later calls are no-ops
///
/// Concurrent first calls are serialized: exactly one installs the
/// subscriber and the others wait for it and return its outcome.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    LOGGING.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| LoggingError::InvalidFilter(config.level.clone(), e.to_string()))?,
    };

    let mut layers = vec![fmt_layer(
        config.format,
        std::io::stdout,
        config.colored,
        config.source_location,
    )];

    let mut guard = None;
    if let Some(file) = &config.file {
        let appender = RollingFileAppender::new(
            rotation(file.rotation),
            &file.directory,
            &file.file_prefix,
        );
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config.format, writer, false, config.source_location));
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file = config.file.is_some(),
        "Logging initialized"
    );
    Ok(guard)
}

/// Whether [`init_logging`] has completed in this process
pub fn is_initialized() -> bool {
    LOGGING.get().is_some()
}

fn fmt_layer<S, W>(
    format: LogFormat,
    writer: W,
    ansi: bool,
    source_location: bool,
) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(source_location)
        .with_line_number(source_location);

    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn rotation(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Generate a fresh request id
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Span carrying the request id; enter it (or `.instrument` a future) for
/// every log line emitted while serving the request
pub fn request_span(request_id: &str) -> Span {
    tracing::info_span!("request", request_id = %request_id)
}

/// Check whether a field name indicates sensitive data
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
        || SENSITIVE_FRAGMENTS.iter().any(|fragment| key.contains(fragment))
}

/// Copy of `value` with every sensitive field replaced by [`REDACTED`]
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let redacted: Map<String, Value> = map
                .iter()
                .map(|(key, value)| {
                    let value = if is_sensitive_key(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(value)
                    };
                    (key.clone(), value)
                })
                .collect();
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensitive_keys() {
        assert!(is_sensitive_key("password"));
        assert!(is_sensitive_key("DB_PASSWORD"));
        assert!(is_sensitive_key("refresh_token"));
        assert!(is_sensitive_key("pin"));
        assert!(!is_sensitive_key("shipping_address"));
        assert!(!is_sensitive_key("author"));
        assert!(!is_sensitive_key("status"));
    }

    #[test]
    fn test_redact_nested() {
        let payload = json!({
            "user": "alice",
            "password": "hunter2",
            "profile": {"api_key": "abc", "city": "Oslo"},
            "sessions": [{"session_id": "s1", "active": true}]
        });

        let redacted = redact(&payload);
        assert_eq!(redacted["user"], "alice");
        assert_eq!(redacted["password"], REDACTED);
        assert_eq!(redacted["profile"]["api_key"], REDACTED);
        assert_eq!(redacted["profile"]["city"], "Oslo");
        assert_eq!(redacted["sessions"][0]["session_id"], REDACTED);
        assert_eq!(redacted["sessions"][0]["active"], true);
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(new_request_id(), new_request_id());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::for_environment(crate::config::Environment::Testing);
        assert!(init_logging(&config).is_ok());
        assert!(is_initialized());
        assert!(init_logging(&config).is_ok());

        let _entered = request_span("req-42").entered();
        tracing::info!("inside request span");
    }

    #[test]
    fn test_concurrent_first_calls_all_succeed() {
        let config = LoggingConfig::for_environment(crate::config::Environment::Testing);
        let barrier = std::sync::Barrier::new(8);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        init_logging(&config)
                    })
                })
                .collect();

            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });
        assert!(is_initialized());
    }
}
