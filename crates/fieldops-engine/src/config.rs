//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FIELDOPS_DATABASE_PATH=/var/lib/fieldops/fieldops.db               │
//! │     FIELDOPS_LOCK_TIMEOUT_SECS=600                                     │
//! │     FIELDOPS_EMISSION_TIMEOUT_SECS=45                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/fieldops/engine.toml (Linux)                             │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/fieldops/fieldops.db"
//! max_connections = 5
//!
//! [lock]
//! timeout_secs = 300
//!
//! [invoicing]
//! emission_timeout_secs = 30
//! record_retry_secs = 10
//! certificate_dir = "/var/lib/fieldops/certificates"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use fieldops_core::lock::DEFAULT_LOCK_TIMEOUT_SECS;
use fieldops_core::LockPolicy;
use fieldops_db::DbConfig;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "fieldops", "engine")
        .map(|dirs| dirs.data_dir().join("fieldops.db"))
        .unwrap_or_else(|| PathBuf::from("fieldops.db"))
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Seconds after which an edit lock may be taken over.
    #[serde(default = "default_lock_timeout")]
    pub timeout_secs: i64,
}

fn default_lock_timeout() -> i64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            timeout_secs: default_lock_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicingSettings {
    /// Upper bound for one call to the invoice authority.
    #[serde(default = "default_emission_timeout")]
    pub emission_timeout_secs: u64,

    /// How long the emission task keeps retrying a failed write of the
    /// outcome before giving up.
    #[serde(default = "default_record_retry")]
    pub record_retry_secs: u64,

    /// Directory holding one `<provider_id>.pfx` signing certificate per
    /// provider.
    #[serde(default)]
    pub certificate_dir: Option<PathBuf>,
}

fn default_emission_timeout() -> u64 {
    30
}

fn default_record_retry() -> u64 {
    10
}

impl Default for InvoicingSettings {
    fn default() -> Self {
        InvoicingSettings {
            emission_timeout_secs: default_emission_timeout(),
            record_retry_secs: default_record_retry(),
            certificate_dir: None,
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub lock: LockSettings,

    #[serde(default)]
    pub invoicing: InvoicingSettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database.path must not be empty".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.lock.timeout_secs <= 0 {
            return Err(ConfigError::Invalid(
                "lock.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.invoicing.emission_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "invoicing.emission_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FIELDOPS_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(secs) = std::env::var("FIELDOPS_LOCK_TIMEOUT_SECS") {
            match secs.parse::<i64>() {
                Ok(s) => self.lock.timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid FIELDOPS_LOCK_TIMEOUT_SECS"),
            }
        }

        if let Ok(secs) = std::env::var("FIELDOPS_EMISSION_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.invoicing.emission_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid FIELDOPS_EMISSION_TIMEOUT_SECS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "fieldops", "engine")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy::new(self.lock.timeout_secs)
    }

    pub fn emission_timeout(&self) -> Duration {
        Duration::from_secs(self.invoicing.emission_timeout_secs)
    }

    pub fn record_retry(&self) -> Duration {
        Duration::from_secs(self.invoicing.record_retry_secs)
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.lock.timeout_secs, 300);
        assert_eq!(config.invoicing.emission_timeout_secs, 30);
        assert_eq!(config.emission_timeout(), Duration::from_secs(30));
        assert_eq!(config.record_retry(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [lock]
            timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.lock.timeout_secs, 600);
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.invoicing.emission_timeout_secs, 30);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            r#"
            [database]
            path = "/tmp/fieldops-test.db"

            [invoicing]
            emission_timeout_secs = 5
            "#,
        )
        .unwrap();

        let config = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(config.invoicing.emission_timeout_secs, 5);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.lock.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.invoicing.emission_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = EngineConfig::default().to_toml().unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[lock]"));
        assert!(toml_str.contains("[invoicing]"));
    }
}
