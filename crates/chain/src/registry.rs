//! Celo core-contract registry lookups.
//!
//! Every Celo network deploys the `Registry` at the same fixed address. Core
//! contracts (SortedOracles, StableToken, ...) are resolved through it by name
//! and cached for the lifetime of the process.

use alloy::primitives::{address, Address};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use dashmap::DashMap;
use tracing::debug;

use crate::error::{parse_url, ChainError};

/// Registry address, identical on Mainnet and Alfajores.
pub const CELO_REGISTRY: Address = address!("000000000000000000000000000000000000ce10");

sol! {
    #[sol(rpc)]
    interface IRegistry {
        function getAddressForStringOrDie(string calldata identifier) external view returns (address addr);
    }
}

/// Cached resolver for Celo core contracts.
#[derive(Debug)]
pub struct CeloRegistry {
    rpc_url: String,
    registry: Address,
    cache: DashMap<String, Address>,
}

impl CeloRegistry {
    /// Create a resolver against the canonical registry.
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            registry: CELO_REGISTRY,
            cache: DashMap::new(),
        }
    }

    /// Resolve a core contract address by identifier, e.g. `"SortedOracles"`.
    pub async fn resolve(&self, identifier: &str) -> Result<Address, ChainError> {
        if let Some(addr) = self.cache.get(identifier) {
            return Ok(*addr);
        }

        let provider = ProviderBuilder::new().on_http(parse_url(&self.rpc_url)?);
        let registry = IRegistry::new(self.registry, &provider);
        let addr = registry
            .getAddressForStringOrDie(identifier.to_string())
            .call()
            .await
            .map_err(ChainError::rpc)?
            .addr;

        debug!(identifier, address = %addr, "Resolved Celo core contract");
        self.cache.insert(identifier.to_string(), addr);

        Ok(addr)
    }

    /// Number of cached resolutions.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
