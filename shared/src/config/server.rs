//! Settings of the API process embedding Keystone

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Listener and identity of the hosting service
///
/// Keystone itself never binds a socket; the section exists so one settings
/// file configures both the host process and the database layer.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name attached to startup logs and health reports
    pub app_name: String,
    pub host: String,
    pub port: u16,
    /// Upper bound on handling one request, in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("keystone"),
            host: String::from("0.0.0.0"),
            port: 8080,
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port`, or `None` when the host is not an IP literal
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"port": 9000}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.app_name, "keystone");
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_socket_addr() {
        let addr = ServerConfig::new("127.0.0.1", 3000).socket_addr().unwrap();
        assert_eq!(addr.port(), 3000);
        assert!(ServerConfig::new("db.internal", 3000).socket_addr().is_none());
    }
}
