//! Engine configuration.
//!
//! # Responsibility
//! - Hold commission, SLA, paging, store and logging settings.
//! - Load from TOML with per-field defaults and apply env overrides.
//!
//! # Invariants
//! - A config returned by `load`/`from_toml_str` has passed `validate()`.

use crate::logging::default_log_level;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_LOG_LEVEL: &str = "CLINICRM_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "CLINICRM_LOG_DIR";
pub const ENV_COMMISSION_RATE: &str = "CLINICRM_COMMISSION_RATE";
pub const ENV_SPLIT_RATIO: &str = "CLINICRM_SPLIT_RATIO";

const MAX_CURRENCY_SCALE: u32 = 10;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config syntax: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub commission: CommissionConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub paging: PagingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionConfig {
    /// Share of the deal amount paid as commission.
    #[serde(default = "default_commission_rate")]
    pub rate: Decimal,
    /// Referrer's share of the commission; the receiver gets the rest.
    #[serde(default = "default_split_ratio")]
    pub split_ratio: Decimal,
    /// Digits of the currency minor unit (2 for cents).
    #[serde(default = "default_currency_scale")]
    pub currency_scale: u32,
    /// Days after the deal date before commission counts as confirmed.
    #[serde(default = "default_hold_days")]
    pub hold_days: u32,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            rate: default_commission_rate(),
            split_ratio: default_split_ratio(),
            currency_scale: default_currency_scale(),
            hold_days: default_hold_days(),
        }
    }
}

fn default_commission_rate() -> Decimal {
    Decimal::new(5, 2)
}
fn default_split_ratio() -> Decimal {
    Decimal::new(5, 1)
}
fn default_currency_scale() -> u32 {
    2
}
fn default_hold_days() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Due window for tasks created without a rule.
    #[serde(default = "default_sla_hours")]
    pub default_sla_hours: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            default_sla_hours: default_sla_hours(),
        }
    }
}

fn default_sla_hours() -> u32 {
    48
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_page_limit")]
    pub max_limit: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

fn default_page_limit() -> u32 {
    20
}
fn default_max_page_limit() -> u32 {
    100
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on compare-and-swap attempts per mutating call.
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: default_max_write_attempts(),
        }
    }
}

fn default_max_write_attempts() -> u32 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Absolute directory for rolling log files; logging stays off when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: None,
        }
    }
}

fn default_level() -> String {
    default_log_level().to_string()
}

impl CoreConfig {
    /// Reads a TOML file, applies env overrides and validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without consulting the environment.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let read = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(rate) = read(ENV_COMMISSION_RATE) {
            self.commission.rate = parse_decimal(ENV_COMMISSION_RATE, &rate)?;
        }
        if let Some(split) = read(ENV_SPLIT_RATIO) {
            self.commission.split_ratio = parse_decimal(ENV_SPLIT_RATIO, &split)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = Decimal::ZERO..=Decimal::ONE;
        if !unit.contains(&self.commission.rate) {
            return Err(ConfigError::Invalid(format!(
                "commission.rate must be within [0, 1], got {}",
                self.commission.rate
            )));
        }
        if !unit.contains(&self.commission.split_ratio) {
            return Err(ConfigError::Invalid(format!(
                "commission.split_ratio must be within [0, 1], got {}",
                self.commission.split_ratio
            )));
        }
        if self.commission.currency_scale > MAX_CURRENCY_SCALE {
            return Err(ConfigError::Invalid(format!(
                "commission.currency_scale must be at most {MAX_CURRENCY_SCALE}"
            )));
        }
        if self.paging.default_limit == 0 || self.paging.max_limit == 0 {
            return Err(ConfigError::Invalid(
                "paging limits must be positive".to_string(),
            ));
        }
        if self.paging.default_limit > self.paging.max_limit {
            return Err(ConfigError::Invalid(
                "paging.default_limit must not exceed paging.max_limit".to_string(),
            ));
        }
        if self.store.max_write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "store.max_write_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_decimal(key: &str, raw: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(raw)
        .map_err(|err| ConfigError::Invalid(format!("{key} is not a decimal `{raw}`: {err}")))
}
