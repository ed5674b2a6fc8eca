//! Bot runtime configuration.
//!
//! Polling cadence and liquidation parameters. Every field has a serde
//! default so a partial TOML file (or none at all) yields a usable config;
//! environment variables override individual fields afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration structure containing all bot parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Polling intervals for the three periodic tasks
    #[serde(default)]
    pub polling: PollingConfig,

    /// Liquidation selection and execution parameters
    #[serde(default)]
    pub liquidation: LiquidationConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Polling intervals (milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// SortedOracles refresh
    #[serde(default = "default_oracle_polling")]
    pub oracle_ms: u64,

    /// Subgraph loan book refresh
    #[serde(default = "default_subgraph_polling")]
    pub subgraph_ms: u64,

    /// Health factor evaluation and dispatch
    #[serde(default = "default_bot_polling")]
    pub bot_ms: u64,

    /// Deadline for one oracle or loan book refresh
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_ms: u64,
}

fn default_oracle_polling() -> u64 {
    1500
}
fn default_subgraph_polling() -> u64 {
    15000
}
fn default_bot_polling() -> u64 {
    2000
}
fn default_fetch_timeout() -> u64 {
    30_000
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            oracle_ms: default_oracle_polling(),
            subgraph_ms: default_subgraph_polling(),
            bot_ms: default_bot_polling(),
            fetch_timeout_ms: default_fetch_timeout(),
        }
    }
}

impl PollingConfig {
    pub fn oracle_interval(&self) -> Duration {
        Duration::from_millis(self.oracle_ms)
    }
    pub fn subgraph_interval(&self) -> Duration {
        Duration::from_millis(self.subgraph_ms)
    }
    pub fn bot_interval(&self) -> Duration {
        Duration::from_millis(self.bot_ms)
    }
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Liquidation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationConfig {
    /// Positions at or below this health factor are liquidated
    #[serde(default = "default_health_factor_max")]
    pub health_factor_max: Decimal,

    /// Share of the largest debt to flash-borrow (bps)
    #[serde(default = "default_fraction_bps")]
    pub fraction_bps: u16,

    /// Collateral value (CELO) above which the priority gas price is used
    #[serde(default = "default_high_value_threshold")]
    pub high_value_threshold_celo: Decimal,

    /// Gas price for high-value liquidations (gwei)
    #[serde(default = "default_priority_gas_price")]
    pub priority_gas_price_gwei: u64,

    /// Maximum liquidation attempts in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Deadline for one attempt, submission and receipt included
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
}

fn default_health_factor_max() -> Decimal {
    Decimal::ONE
}
fn default_fraction_bps() -> u16 {
    5000
}
fn default_high_value_threshold() -> Decimal {
    Decimal::from(5)
}
fn default_priority_gas_price() -> u64 {
    5
}
fn default_max_concurrent() -> usize {
    4
}
fn default_attempt_timeout() -> u64 {
    120_000
}

impl Default for LiquidationConfig {
    fn default() -> Self {
        Self {
            health_factor_max: default_health_factor_max(),
            fraction_bps: default_fraction_bps(),
            high_value_threshold_celo: default_high_value_threshold(),
            priority_gas_price_gwei: default_priority_gas_price(),
            max_concurrent: default_max_concurrent(),
            attempt_timeout_ms: default_attempt_timeout(),
        }
    }
}

impl LiquidationConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            polling: PollingConfig::default(),
            liquidation: LiquidationConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::File {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply per-field overrides from environment-style lookups.
    pub fn apply_env<F>(&mut self, get_env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get_env("ORACLE_POLLING_MS") {
            self.polling.oracle_ms = parse_var("ORACLE_POLLING_MS", &v)?;
        }
        if let Some(v) = get_env("SUBGRAPH_POLLING_MS") {
            self.polling.subgraph_ms = parse_var("SUBGRAPH_POLLING_MS", &v)?;
        }
        if let Some(v) = get_env("BOT_POLLING_MS") {
            self.polling.bot_ms = parse_var("BOT_POLLING_MS", &v)?;
        }
        if let Some(v) = get_env("FETCH_TIMEOUT_MS") {
            self.polling.fetch_timeout_ms = parse_var("FETCH_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get_env("HEALTH_FACTOR_MAX") {
            self.liquidation.health_factor_max = parse_var("HEALTH_FACTOR_MAX", &v)?;
        }
        if let Some(v) = get_env("LIQUIDATION_FRACTION_BPS") {
            self.liquidation.fraction_bps = parse_var("LIQUIDATION_FRACTION_BPS", &v)?;
        }
        if let Some(v) = get_env("HIGH_VALUE_THRESHOLD_CELO") {
            self.liquidation.high_value_threshold_celo =
                parse_var("HIGH_VALUE_THRESHOLD_CELO", &v)?;
        }
        if let Some(v) = get_env("PRIORITY_GAS_PRICE_GWEI") {
            self.liquidation.priority_gas_price_gwei = parse_var("PRIORITY_GAS_PRICE_GWEI", &v)?;
        }
        if let Some(v) = get_env("MAX_CONCURRENT_LIQUIDATIONS") {
            self.liquidation.max_concurrent = parse_var("MAX_CONCURRENT_LIQUIDATIONS", &v)?;
        }
        if let Some(v) = get_env("LIQUIDATION_TIMEOUT_MS") {
            self.liquidation.attempt_timeout_ms = parse_var("LIQUIDATION_TIMEOUT_MS", &v)?;
        }
        self.validate()
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let polling = [
            ("ORACLE_POLLING_MS", self.polling.oracle_ms),
            ("SUBGRAPH_POLLING_MS", self.polling.subgraph_ms),
            ("BOT_POLLING_MS", self.polling.bot_ms),
            ("FETCH_TIMEOUT_MS", self.polling.fetch_timeout_ms),
            ("LIQUIDATION_TIMEOUT_MS", self.liquidation.attempt_timeout_ms),
        ];
        for (name, ms) in polling {
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    name,
                    reason: "duration must be positive".to_string(),
                });
            }
        }
        if self.liquidation.fraction_bps == 0 || self.liquidation.fraction_bps > 10_000 {
            return Err(ConfigError::InvalidValue {
                name: "LIQUIDATION_FRACTION_BPS",
                reason: format!("{} is outside 1..=10000", self.liquidation.fraction_bps),
            });
        }
        if self.liquidation.max_concurrent == 0 {
            return Err(ConfigError::InvalidValue {
                name: "MAX_CONCURRENT_LIQUIDATIONS",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.liquidation.health_factor_max.is_sign_negative() {
            return Err(ConfigError::InvalidValue {
                name: "HEALTH_FACTOR_MAX",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Bot configuration loaded");
        tracing::info!(
            oracle_ms = self.polling.oracle_ms,
            subgraph_ms = self.polling.subgraph_ms,
            bot_ms = self.polling.bot_ms,
            fetch_timeout_ms = self.polling.fetch_timeout_ms,
            "Polling intervals"
        );
        tracing::info!(
            health_factor_max = %self.liquidation.health_factor_max,
            fraction_bps = self.liquidation.fraction_bps,
            high_value_threshold_celo = %self.liquidation.high_value_threshold_celo,
            priority_gas_price_gwei = self.liquidation.priority_gas_price_gwei,
            max_concurrent = self.liquidation.max_concurrent,
            attempt_timeout_ms = self.liquidation.attempt_timeout_ms,
            "Liquidation parameters"
        );
    }
}

pub(crate) fn parse_var<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        reason: format!("{value:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.polling.oracle_interval(), Duration::from_millis(1500));
        assert_eq!(config.polling.subgraph_interval(), Duration::from_millis(15000));
        assert_eq!(config.polling.bot_interval(), Duration::from_millis(2000));
        assert_eq!(config.liquidation.health_factor_max, Decimal::ONE);
        assert_eq!(config.liquidation.fraction_bps, 5000);
        assert_eq!(config.liquidation.high_value_threshold_celo, Decimal::from(5));
        assert_eq!(config.liquidation.max_concurrent, 4);
        assert_eq!(config.polling.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.liquidation.attempt_timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let parsed: BotConfig = toml::from_str(
            r#"
            profile = "fast"

            [polling]
            bot_ms = 500

            [liquidation]
            health_factor_max = "1.05"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.profile, "fast");
        assert_eq!(parsed.polling.bot_ms, 500);
        assert_eq!(parsed.polling.oracle_ms, 1500);
        assert_eq!(parsed.liquidation.health_factor_max, Decimal::new(105, 2));
        assert_eq!(parsed.liquidation.fraction_bps, 5000);
    }

    #[test]
    fn test_serialization() {
        let config = BotConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("profile = \"default\""));

        let parsed: BotConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BotConfig::default();
        config
            .apply_env(lookup(&[
                ("BOT_POLLING_MS", "750"),
                ("HEALTH_FACTOR_MAX", "0.98"),
                ("LIQUIDATION_FRACTION_BPS", "2500"),
                ("MAX_CONCURRENT_LIQUIDATIONS", "1"),
                ("LIQUIDATION_TIMEOUT_MS", "45000"),
            ]))
            .unwrap();

        assert_eq!(config.polling.bot_ms, 750);
        assert_eq!(config.liquidation.health_factor_max, Decimal::new(98, 2));
        assert_eq!(config.liquidation.fraction_bps, 2500);
        assert_eq!(config.liquidation.max_concurrent, 1);
        assert_eq!(config.liquidation.attempt_timeout_ms, 45_000);
        // untouched
        assert_eq!(config.polling.oracle_ms, 1500);
    }

    #[test]
    fn test_env_rejects_garbage() {
        let mut config = BotConfig::default();
        let err = config
            .apply_env(lookup(&[("BOT_POLLING_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "BOT_POLLING_MS", .. }));

        let mut config = BotConfig::default();
        let err = config
            .apply_env(lookup(&[("LIQUIDATION_FRACTION_BPS", "20000")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { name: "LIQUIDATION_FRACTION_BPS", .. }
        ));
    }
}
