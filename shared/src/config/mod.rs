//! Configuration module with sub-modules per concern
//!
//! - `database` - Connection pool and session settings
//! - `environment` - Environment detection and logging configuration
//! - `secrets` - Secret loading from mounted files or the environment
//! - `server` - Settings for the hosting API process
//!
//! [`AppConfig::load`] layers, lowest priority first: built-in defaults for
//! the detected environment, an optional `config.<env>.toml`, then
//! `APP__SECTION__KEY` environment variables. A `database_url` secret, when
//! present, replaces the configured database URL.

pub mod database;
pub mod environment;
pub mod secrets;
pub mod server;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use database::DatabaseConfig;
pub use environment::{Environment, FileLoggingConfig, LogFormat, LogRotation, LoggingConfig};
pub use secrets::{load_secret, load_secret_or_error, mask_url_password, secrets_available};
pub use server::ServerConfig;

/// Prefix of environment variables that override configuration keys
pub const ENV_PREFIX: &str = "APP";

/// Errors raised while assembling the application configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Secret '{0}' not found. Check /run/secrets/, /var/run/secrets/, or environment variables")]
    MissingSecret(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration combining all sub-configurations
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    /// Environment configuration
    pub environment: Environment,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::for_environment(Environment::default())
    }
}

impl AppConfig {
    /// Create configuration for development environment
    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig::new("127.0.0.1", 8080),
            database: DatabaseConfig::new("sqlite://keystone_dev.db?mode=rwc").with_echo(true),
            logging: LoggingConfig::for_environment(Environment::Development),
        }
    }

    /// Create configuration for automated tests
    pub fn testing() -> Self {
        Self {
            environment: Environment::Testing,
            server: ServerConfig::new("127.0.0.1", 0),
            database: DatabaseConfig::new("sqlite::memory:")
                .with_pool_size(5)
                .with_max_overflow(0),
            logging: LoggingConfig::for_environment(Environment::Testing),
        }
    }

    /// Create configuration for production environment
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig::new("0.0.0.0", 8080),
            database: DatabaseConfig::new("mysql://db:3306/keystone"),
            logging: LoggingConfig::for_environment(Environment::Production),
        }
    }

    /// Preset for the given environment
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Development => Self::development(),
            Environment::Testing => Self::testing(),
            Environment::Staging => {
                let mut config = Self::production();
                config.environment = Environment::Staging;
                config.logging = LoggingConfig::for_environment(Environment::Staging);
                config
            }
            Environment::Production => Self::production(),
        }
    }

    /// Load configuration from the working directory and the environment
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case outside development
        let _ = dotenvy::dotenv();
        Self::load_from(Path::new("."), Environment::from_env())
    }

    /// Load configuration for `env`, reading `config.<env>.toml` from `dir`
    pub fn load_from(dir: &Path, env: Environment) -> Result<Self, ConfigError> {
        let defaults = Self::for_environment(env);
        let file = dir.join(env.config_file());

        let mut config: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&defaults)?)
            .add_source(config::File::from(file).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if let Some(url) = load_secret("database_url") {
            config.database.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate().map_err(ConfigError::Invalid)
    }
}
