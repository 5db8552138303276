//! Configuration file parsing and structures.
//!
//! Configuration is TOML: a `[logging]` section and one table per native
//! integration under `[integrations]`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::netatmo::NetatmoConfig;

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,

    /// Per-target levels, keyed by module path (e.g. "netatmo_alarm::engine")
    #[serde(default)]
    pub overrides: HashMap<String, LogLevel>,
}

impl LoggingConfig {
    /// Filter applying `level` by default and each override to its target
    pub fn targets(&self) -> Targets {
        self.overrides.iter().fold(
            Targets::new().with_default(LevelFilter::from(self.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        )
    }
}

/// Install the global fmt subscriber filtered by `logging`
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), ConfigError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(logging.targets())
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Integration configuration container
#[derive(Debug, Default, Deserialize)]
pub struct IntegrationsConfig {
    /// Netatmo security integration
    #[serde(default)]
    pub netatmo: Option<NetatmoConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        toml::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to install tracing subscriber: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tracing::Level;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.logging.overrides.is_empty());
        assert!(config.integrations.netatmo.is_none());
    }

    #[test]
    fn test_parse_netatmo_integration() {
        let toml = r#"
            [logging]
            level = "debug"

            [integrations.netatmo]
            entry_id = "01J0NETATMO"

            [integrations.netatmo.options]
            alarm_disarm_persons = ["John Doe"]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);

        let netatmo = config.integrations.netatmo.as_ref().unwrap();
        assert_eq!(netatmo.entry_id, "01J0NETATMO");
        assert_eq!(
            netatmo.options.alarm_disarm_persons,
            Some(vec!["John Doe".to_string()])
        );
    }

    #[test]
    fn test_netatmo_options_default() {
        let toml = r#"
            [integrations.netatmo]
            entry_id = "01J0NETATMO"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let netatmo = config.integrations.netatmo.unwrap();
        assert!(netatmo.options.alarm_disarm_persons.is_none());
    }

    #[test]
    fn test_invalid_log_level() {
        let toml = r#"
            [logging]
            level = "loud"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn test_logging_targets() {
        let toml = r#"
            [logging]
            level = "warn"

            [logging.overrides]
            "netatmo_alarm::netatmo" = "trace"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let targets = config.logging.targets();

        assert!(targets.would_enable("netatmo_alarm::netatmo::home", &Level::TRACE));
        assert!(targets.would_enable("netatmo_alarm::engine", &Level::WARN));
        assert!(!targets.would_enable("netatmo_alarm::engine", &Level::INFO));
    }

    // The only test installing the global subscriber
    #[test]
    fn test_init_tracing_installs_once() {
        let logging = LoggingConfig {
            level: LogLevel::Debug,
            overrides: HashMap::from([("netatmo_alarm::engine".to_string(), LogLevel::Warn)]),
        };

        init_tracing(&logging).unwrap();
        tracing::info!("tracing installed");

        let err = init_tracing(&logging).unwrap_err();
        assert!(matches!(err, ConfigError::Logging(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[integrations.netatmo]\nentry_id = \"01J0NETATMO\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.integrations.netatmo.unwrap().entry_id, "01J0NETATMO");
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.toml");
        let err = Config::from_file(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Io(ref path, _) if *path == missing));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[integrations.netatmo\n").unwrap();
        assert!(matches!(
            Config::from_file(&broken),
            Err(ConfigError::Parse(_))
        ));
    }
}
