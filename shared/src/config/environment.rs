//! Deployment environment and logging settings

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Variables consulted, in order, when detecting the environment
const ENVIRONMENT_VARS: [&str; 3] = ["ENVIRONMENT", "ENV", "RUST_ENV"];

/// Deployment stage the process runs in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Development,
        Environment::Testing,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Testing => "testing",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    fn short_name(&self) -> &'static str {
        match self {
            Environment::Development => "dev",
            Environment::Testing => "test",
            Environment::Staging => "stage",
            Environment::Production => "prod",
        }
    }

    /// First recognised value among `ENVIRONMENT`, `ENV` and `RUST_ENV`;
    /// development when none is set or parseable
    pub fn from_env() -> Self {
        ENVIRONMENT_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find_map(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Name of the optional per-environment settings file
    pub fn config_file(&self) -> String {
        format!("config.{}.toml", self.as_str())
    }

    /// Staging and production are deployed stages
    pub fn is_deployed(&self) -> bool {
        matches!(self, Environment::Staging | Environment::Production)
    }

    pub fn is_production(&self) -> bool {
        *self == Environment::Production
    }

    pub fn is_testing(&self) -> bool {
        *self == Environment::Testing
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|env| env.as_str() == wanted || env.short_name() == wanted)
            .ok_or_else(|| format!("unknown environment '{}'", s))
    }
}

/// Output encoding of the console log layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
    Compact,
}

/// How often the log file rolls over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Rolling file output written next to the console layer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub directory: PathBuf,
    /// Base file name; rotation appends a date suffix
    pub file_prefix: String,
    pub rotation: LogRotation,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_prefix: String::from("keystone.log"),
            rotation: LogRotation::default(),
        }
    }
}

/// Settings consumed by [`crate::logging::init_logging`]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub format: LogFormat,
    pub file: Option<FileLoggingConfig>,
    /// ANSI colours on the console layer
    pub colored: bool,
    /// Emit file and line of each event
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl LoggingConfig {
    /// Preset used when no file or variable overrides the logging section
    pub fn for_environment(env: Environment) -> Self {
        let (level, format) = match env {
            Environment::Development => ("debug", LogFormat::Pretty),
            Environment::Testing => ("warn", LogFormat::Compact),
            Environment::Staging | Environment::Production => ("info", LogFormat::Json),
        };

        Self {
            level: level.to_string(),
            format,
            file: env.is_deployed().then(FileLoggingConfig::default),
            colored: env == Environment::Development,
            source_location: env == Environment::Development,
        }
    }
}
