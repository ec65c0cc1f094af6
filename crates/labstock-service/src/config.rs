//! Service configuration.
//!
//! Loaded from environment variables with fallback to defaults.

use std::path::PathBuf;
use std::time::Duration;

use labstock_db::DbConfig;
use serde::{Deserialize, Serialize};

/// LabStock service configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Pool size
    pub max_connections: u32,

    /// Time budget of one transactional procedure, in seconds
    pub transaction_timeout_secs: u64,

    /// Where proof-of-request files and component images are written
    pub upload_dir: PathBuf,

    /// URL prefix under which `upload_dir` is served
    pub public_upload_prefix: String,

    /// Notification channel capacity
    pub notify_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            database_path: PathBuf::from("./labstock.db"),
            max_connections: 5,
            transaction_timeout_secs: 10,
            upload_dir: PathBuf::from("./uploads"),
            public_upload_prefix: "/uploads".to_string(),
            notify_capacity: 64,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(|name| std::env::var(name).ok())
    }

    /// Load configuration from any key lookup. `load` passes the process
    /// environment.
    pub fn load_from<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ServiceConfig::default();

        let config = ServiceConfig {
            database_path: lookup("LABSTOCK_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),

            max_connections: parse(&lookup, "LABSTOCK_DB_MAX_CONNECTIONS", defaults.max_connections)?,

            transaction_timeout_secs: parse(
                &lookup,
                "LABSTOCK_TX_TIMEOUT_SECS",
                defaults.transaction_timeout_secs,
            )?,

            upload_dir: lookup("LABSTOCK_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),

            public_upload_prefix: lookup("LABSTOCK_PUBLIC_UPLOAD_PREFIX")
                .map(|p| p.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_upload_prefix),

            notify_capacity: parse(&lookup, "LABSTOCK_NOTIFY_CAPACITY", defaults.notify_capacity)?,
        };

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "LABSTOCK_DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        if config.transaction_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("LABSTOCK_TX_TIMEOUT_SECS".to_string()));
        }
        if config.notify_capacity == 0 {
            return Err(ConfigError::InvalidValue("LABSTOCK_NOTIFY_CAPACITY".to_string()));
        }

        Ok(config)
    }

    /// Database configuration derived from this config.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .transaction_timeout(Duration::from_secs(self.transaction_timeout_secs))
    }
}

fn parse<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::load_from(lookup(&[])).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.public_upload_prefix, "/uploads");
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::load_from(lookup(&[
            ("LABSTOCK_DB_PATH", "/var/lib/labstock/lab.db"),
            ("LABSTOCK_DB_MAX_CONNECTIONS", "12"),
            ("LABSTOCK_TX_TIMEOUT_SECS", " 30 "),
            ("LABSTOCK_PUBLIC_UPLOAD_PREFIX", "https://cdn.example.edu/files/"),
        ]))
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/labstock/lab.db"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.transaction_timeout_secs, 30);
        assert_eq!(config.public_upload_prefix, "https://cdn.example.edu/files");

        let db = config.db_config();
        assert_eq!(db.max_connections, 12);
        assert_eq!(db.transaction_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values() {
        assert_eq!(
            ServiceConfig::load_from(lookup(&[("LABSTOCK_DB_MAX_CONNECTIONS", "many")])),
            Err(ConfigError::InvalidValue("LABSTOCK_DB_MAX_CONNECTIONS".to_string()))
        );
        assert_eq!(
            ServiceConfig::load_from(lookup(&[("LABSTOCK_NOTIFY_CAPACITY", "0")])),
            Err(ConfigError::InvalidValue("LABSTOCK_NOTIFY_CAPACITY".to_string()))
        );
    }
}
