//! Error types for the liquidation core.

use alloy::primitives::Address;

use crate::assets::Asset;

/// Price lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("asset {0} is not supported")]
    UnsupportedAsset(Address),

    #[error("failed to fetch {asset} rate: {reason}")]
    Fetch { asset: Asset, reason: String },

    #[error("invalid {asset} rate: {source}")]
    InvalidRate { asset: Asset, source: MathError },

    #[error("oracle refresh timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Swap routing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("no swap route from {from} to {to}")]
    NoRouteForPair { from: Address, to: Address },
}

/// Decimal conversion failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("value {0} does not fit a decimal")]
    Overflow(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("scale {0} exceeds decimal precision")]
    Scale(u32),
}

/// Startup configuration failures. All of these are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Please provide {0} env variable")]
    MissingCredential(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("unsupported chain id {0}")]
    UnsupportedNetwork(u64),

    #[error("no liquidation contract: set LIQUIDATION_CONTRACT or provide {path} ({reason})")]
    MissingDeployment { path: String, reason: String },

    #[error("failed to read config file {path}: {reason}")]
    File { path: String, reason: String },
}
