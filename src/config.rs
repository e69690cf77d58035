//! Configuration loading and tracing initialisation

use bigdecimal::BigDecimal;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::types::{ErpError, ErpResult};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_CONFIG_FILE: &str = "config/default";
const DEFAULT_HOME_STATE_CODE: &str = "27";
const DEFAULT_TAX_PERCENT: f64 = 18.0;
const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 30;
const DEFAULT_WASTAGE_THRESHOLD: f64 = 0.07;
const DEFAULT_MAX_UPDATE_RETRIES: u32 = 3;
const ENV_PREFIX: &str = "ERP";

/// Business rules that administrators may tune at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessSettings {
    /// GST state code of the company; counterparties elsewhere are inter-state
    #[serde(default = "default_home_state_code")]
    pub home_state_code: String,

    /// Tax percentage applied to lines that do not carry their own
    #[serde(default = "default_tax_percent")]
    pub default_tax_percent: f64,

    /// Credit period used when payment terms do not name a day count
    #[serde(default = "default_payment_terms_days")]
    pub default_payment_terms_days: i64,

    /// Wastage ratio above which a production entry needs approval
    #[serde(default = "default_wastage_threshold")]
    pub wastage_approval_threshold: f64,
}

impl Default for BusinessSettings {
    fn default() -> Self {
        Self {
            home_state_code: default_home_state_code(),
            default_tax_percent: default_tax_percent(),
            default_payment_terms_days: default_payment_terms_days(),
            wastage_approval_threshold: default_wastage_threshold(),
        }
    }
}

impl BusinessSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.home_state_code.len() != 2
            || !self.home_state_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ConfigError::Invalid(format!(
                "home_state_code must be two digits, got '{}'",
                self.home_state_code
            )));
        }
        if !self.default_tax_percent.is_finite()
            || !(0.0..=100.0).contains(&self.default_tax_percent)
        {
            return Err(ConfigError::Invalid(
                "default_tax_percent must be between 0 and 100".to_string(),
            ));
        }
        if self.default_payment_terms_days < 0 {
            return Err(ConfigError::Invalid(
                "default_payment_terms_days cannot be negative".to_string(),
            ));
        }
        if !self.wastage_approval_threshold.is_finite()
            || self.wastage_approval_threshold <= 0.0
            || self.wastage_approval_threshold >= 1.0
        {
            return Err(ConfigError::Invalid(
                "wastage_approval_threshold must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_tax_decimal(&self) -> ErpResult<BigDecimal> {
        decimal_from_f64(self.default_tax_percent)
    }

    pub fn wastage_threshold_decimal(&self) -> ErpResult<BigDecimal> {
        decimal_from_f64(self.wastage_approval_threshold)
    }
}

/// Convert through the shortest decimal representation so 0.07 stays 0.07
fn decimal_from_f64(value: f64) -> ErpResult<BigDecimal> {
    BigDecimal::from_str(&value.to_string())
        .map_err(|e| ErpError::Validation(format!("invalid decimal setting {}: {}", value, e)))
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Attempts at a versioned invoice update before reporting a conflict
    #[serde(default = "default_max_update_retries")]
    pub max_update_retries: u32,

    #[serde(default)]
    pub business: BusinessSettings,
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            max_update_retries: default_max_update_retries(),
            business: BusinessSettings::default(),
        }
    }
}

impl ErpConfig {
    /// Load configuration.
    ///
    /// Sources, later ones overriding earlier ones:
    /// 1. `config/default.toml` (or the given file), if present
    /// 2. Environment variables prefixed `ERP__`, e.g. `ERP__BUSINESS__HOME_STATE_CODE`
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: ErpConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        info!(
            home_state_code = %config.business.home_state_code,
            log_level = %config.log_level,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level must be one of: trace, debug, info, warn, error (got '{}')",
                self.log_level
            )));
        }
        if self.max_update_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_update_retries must be at least 1".to_string(),
            ));
        }
        self.business.validate()
    }
}

/// Initializes tracing using the provided log level as the default filter.
///
/// `RUST_LOG` overrides the level when set. Calling this more than once is harmless.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("erp_core={}", level));

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ErpError {
    fn from(err: ConfigError) -> Self {
        ErpError::Validation(err.to_string())
    }
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_home_state_code() -> String {
    DEFAULT_HOME_STATE_CODE.to_string()
}

fn default_tax_percent() -> f64 {
    DEFAULT_TAX_PERCENT
}

fn default_payment_terms_days() -> i64 {
    DEFAULT_PAYMENT_TERMS_DAYS
}

fn default_wastage_threshold() -> f64 {
    DEFAULT_WASTAGE_THRESHOLD
}

fn default_max_update_retries() -> u32 {
    DEFAULT_MAX_UPDATE_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ErpConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.business.home_state_code, "27");
        assert_eq!(
            config.business.wastage_threshold_decimal().unwrap(),
            BigDecimal::from_str("0.07").unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_state_code() {
        let settings = BusinessSettings {
            home_state_code: "MH".to_string(),
            ..BusinessSettings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_threshold_out_of_range() {
        let settings = BusinessSettings {
            wastage_approval_threshold: 1.5,
            ..BusinessSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let config = ErpConfig {
            log_level: "verbose".to_string(),
            ..ErpConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = env::temp_dir().join(format!("erp-core-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("erp.toml");
        std::fs::write(
            &path,
            concat!(
                "log_level = \"debug\"\n",
                "[business]\n",
                "home_state_code = \"29\"\n",
                "wastage_approval_threshold = 0.05\n",
            ),
        )
        .unwrap();

        let config = ErpConfig::load(Some(&path)).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.business.home_state_code, "29");
        assert_eq!(config.business.default_payment_terms_days, 30);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
