//! Runtime configuration for sales core hosts.
//!
//! # Responsibility
//! - Hold store location, busy timeout, sale policy and logging settings.
//! - Apply `SALES_*` environment overrides on top of defaults.
//!
//! # Invariants
//! - Unparseable overrides are rejected, never silently ignored.

use crate::db::DEFAULT_BUSY_TIMEOUT;
use crate::logging::default_log_level;
use crate::service::sale_recorder::SalePolicy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "SALES_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SALES_BUSY_TIMEOUT_MS";
pub const ENV_ALLOW_EMPTY: &str = "SALES_ALLOW_EMPTY";
pub const ENV_LOG_LEVEL: &str = "SALES_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "SALES_LOG_DIR";

const DEFAULT_DB_PATH: &str = "sales.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => {
                write!(f, "invalid value `{value}` for {key}")
            }
        }
    }
}

impl Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    pub busy_timeout_ms: u64,
    /// Whether a sale with no items is recorded (`true`) or rejected.
    pub allow_empty_sales: bool,
    pub log_level: String,
    /// Logging stays disabled when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            allow_empty_sales: true,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by the `SALES_*` names.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_DB_PATH) {
            self.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_BUSY_TIMEOUT_MS,
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup(ENV_ALLOW_EMPTY) {
            self.allow_empty_sales = parse_flag(&value).ok_or(ConfigError::InvalidValue {
                key: ENV_ALLOW_EMPTY,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        if let Some(value) = lookup(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(value));
        }
        Ok(self)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn sale_policy(&self) -> SalePolicy {
        SalePolicy {
            allow_empty_sales: self.allow_empty_sales,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, ENV_ALLOW_EMPTY, ENV_BUSY_TIMEOUT_MS, ENV_DB_PATH};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_allow_empty_sales_and_five_second_timeout() {
        let config = StoreConfig::default();
        assert!(config.allow_empty_sales);
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = StoreConfig::default()
            .with_overrides(lookup_from(&[
                (ENV_DB_PATH, "/tmp/shop.db"),
                (ENV_BUSY_TIMEOUT_MS, "250"),
                (ENV_ALLOW_EMPTY, "off"),
            ]))
            .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/shop.db"));
        assert_eq!(config.busy_timeout(), Duration::from_millis(250));
        assert!(!config.sale_policy().allow_empty_sales);
    }

    #[test]
    fn unparseable_override_is_rejected() {
        let err = StoreConfig::default()
            .with_overrides(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "soon")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: ENV_BUSY_TIMEOUT_MS,
                value: "soon".to_string()
            }
        );
    }

    #[test]
    fn partial_json_fills_missing_fields_with_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"db_path":"shop.db","allow_empty_sales":false}"#).unwrap();
        assert_eq!(config.db_path, PathBuf::from("shop.db"));
        assert!(!config.allow_empty_sales);
        assert_eq!(config.busy_timeout_ms, 5000);
    }
}
