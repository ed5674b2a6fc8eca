//! Celo network presets.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Celo networks Moola is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Alfajores,
}

impl Network {
    pub const MAINNET_CHAIN_ID: u64 = 42220;
    pub const ALFAJORES_CHAIN_ID: u64 = 44787;

    pub fn from_chain_id(chain_id: u64) -> Result<Self, ConfigError> {
        match chain_id {
            Self::MAINNET_CHAIN_ID => Ok(Network::Mainnet),
            Self::ALFAJORES_CHAIN_ID => Ok(Network::Alfajores),
            other => Err(ConfigError::UnsupportedNetwork(other)),
        }
    }

    pub const fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => Self::MAINNET_CHAIN_ID,
            Network::Alfajores => Self::ALFAJORES_CHAIN_ID,
        }
    }

    /// Public forno endpoint.
    pub const fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://forno.celo.org",
            Network::Alfajores => "https://alfajores-forno.celo-testnet.org",
        }
    }

    /// Directory name used for deployment artifacts.
    pub const fn deployment_name(&self) -> &'static str {
        match self {
            Network::Mainnet => "celo",
            Network::Alfajores => "alfajores",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.deployment_name(), self.chain_id())
    }
}
