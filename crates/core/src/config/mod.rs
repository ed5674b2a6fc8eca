//! Configuration for the Moola liquidation bot.
//!
//! This module provides:
//! - Bot runtime configuration (polling cadence, liquidation parameters)
//! - Celo network presets
//! - Process configuration resolved from the environment

mod bot;
mod env;
mod network;

pub use bot::{BotConfig, LiquidationConfig, PollingConfig};
pub use env::{AppConfig, DEFAULT_DEPLOYMENTS_DIR, DEFAULT_LOG_FILE};
pub use network::Network;
