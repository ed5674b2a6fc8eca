//! Asset registry for the Moola v2 markets on Celo.
//!
//! Moola lists CELO plus the two Mento stable assets. Every asset has exactly
//! one token address per network; the registry is the bidirectional mapping
//! between the two, plus the bridge token used for CELO/stable swaps.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::Network;
use crate::error::OracleError;

/// Supported Moola reserve assets.
///
/// Ordering is used to canonicalize asset pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// Native CELO (also the value numeraire)
    Celo,
    /// Celo Dollar
    CUsd,
    /// Celo Euro
    CEur,
}

impl Asset {
    /// All supported assets.
    pub const ALL: [Asset; 3] = [Asset::Celo, Asset::CUsd, Asset::CEur];

    pub const fn symbol(&self) -> &'static str {
        match self {
            Asset::Celo => "CELO",
            Asset::CUsd => "cUSD",
            Asset::CEur => "cEUR",
        }
    }

    /// CELO is priced at 1 by definition.
    pub const fn is_native(&self) -> bool {
        matches!(self, Asset::Celo)
    }

    /// Stable assets quoted by SortedOracles.
    pub const fn is_stable(&self) -> bool {
        matches!(self, Asset::CUsd | Asset::CEur)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Token addresses for one network.
#[derive(Debug, Clone, Copy)]
struct NetworkTokens {
    celo: Address,
    cusd: Address,
    ceur: Address,
    /// Intermediate token for CELO <-> stable swaps
    bridge: Option<Address>,
}

const MAINNET_TOKENS: NetworkTokens = NetworkTokens {
    celo: address!("471ece3750da237f93b8e339c536989b8978a438"),
    cusd: address!("765de816845861e75a25fca122bb6898b8b1282a"),
    ceur: address!("d8763cba276a3738e6de85b4b3bf5fded6d6ca73"),
    // mCELO
    bridge: Some(address!("7d00cd74ff385c955ea3d79e47bf06bd7386387d")),
};

const ALFAJORES_TOKENS: NetworkTokens = NetworkTokens {
    celo: address!("f194afdf50b03e69bd7d057c1aa9e10c9954e4c9"),
    cusd: address!("874069fa1eb16d44d622f2e0ca25eea172369bc1"),
    ceur: address!("10c892a6ec43a53e45d0b916b4b7d383b1b78c0f"),
    bridge: None,
};

/// Bidirectional asset <-> address lookup for one network.
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    network: Network,
    by_asset: HashMap<Asset, Address>,
    by_token: HashMap<Address, Asset>,
    bridge: Option<Address>,
}

impl AssetRegistry {
    /// Create the registry for a network.
    pub fn new(network: Network) -> Self {
        let tokens = match network {
            Network::Mainnet => MAINNET_TOKENS,
            Network::Alfajores => ALFAJORES_TOKENS,
        };

        let by_asset: HashMap<Asset, Address> = [
            (Asset::Celo, tokens.celo),
            (Asset::CUsd, tokens.cusd),
            (Asset::CEur, tokens.ceur),
        ]
        .into_iter()
        .collect();
        let by_token = by_asset.iter().map(|(a, t)| (*t, *a)).collect();

        Self {
            network,
            by_asset,
            by_token,
            bridge: tokens.bridge,
        }
    }

    /// Override the bridge token.
    pub fn with_bridge(mut self, bridge: Address) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Token address of an asset.
    pub fn address_of(&self, asset: Asset) -> Address {
        // Total over Asset::ALL by construction.
        self.by_asset[&asset]
    }

    /// Asset for a token address.
    pub fn asset_of(&self, token: &Address) -> Result<Asset, OracleError> {
        self.by_token
            .get(token)
            .copied()
            .ok_or(OracleError::UnsupportedAsset(*token))
    }

    pub fn is_supported(&self, token: &Address) -> bool {
        self.by_token.contains_key(token)
    }

    /// Native asset token address.
    pub fn native(&self) -> Address {
        self.address_of(Asset::Celo)
    }

    /// Bridge token for CELO <-> stable routes.
    pub fn bridge(&self) -> Option<Address> {
        self.bridge
    }

    /// Stable assets that need an oracle quote.
    pub fn quoted_assets(&self) -> impl Iterator<Item = (Asset, Address)> + '_ {
        Asset::ALL
            .into_iter()
            .filter(|a| !a.is_native())
            .map(|a| (a, self.address_of(a)))
    }
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::new(Network::Mainnet)
    }
}
