//! SortedOracles median-rate reader.
//!
//! Celo's SortedOracles reports every stable asset as a fraction
//! `numerator / denominator` = units of the asset per 1 CELO.

use alloy::primitives::{Address, U256};
use alloy::providers::ProviderBuilder;
use alloy::sol;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{parse_url, ChainError};
use crate::registry::CeloRegistry;

sol! {
    #[sol(rpc)]
    interface ISortedOracles {
        function medianRate(address token) external view returns (uint256 numerator, uint256 denominator);
    }
}

/// Median exchange rate of a token against CELO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MedianRate {
    pub numerator: U256,
    pub denominator: U256,
}

impl MedianRate {
    pub fn new(numerator: U256, denominator: U256) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// A rate with no reports comes back as `0 / 0`.
    pub fn is_empty(&self) -> bool {
        self.denominator.is_zero()
    }
}

/// Source of on-chain exchange rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Median rate of `token` against the native asset.
    async fn median_rate(&self, token: Address) -> Result<MedianRate, ChainError>;
}

/// Reads median rates from the SortedOracles core contract.
#[derive(Debug, Clone)]
pub struct SortedOraclesReader {
    rpc_url: String,
    registry: Arc<CeloRegistry>,
}

impl SortedOraclesReader {
    pub fn new(rpc_url: impl Into<String>, registry: Arc<CeloRegistry>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            registry,
        }
    }
}

#[async_trait]
impl RateSource for SortedOraclesReader {
    #[instrument(skip(self))]
    async fn median_rate(&self, token: Address) -> Result<MedianRate, ChainError> {
        let oracles = self.registry.resolve("SortedOracles").await?;

        let provider = ProviderBuilder::new().on_http(parse_url(&self.rpc_url)?);
        let contract = ISortedOracles::new(oracles, &provider);
        let ret = contract
            .medianRate(token)
            .call()
            .await
            .map_err(ChainError::rpc)?;

        let rate = MedianRate::new(ret.numerator, ret.denominator);
        if rate.is_empty() {
            return Err(ChainError::NoRate(token));
        }

        debug!(
            token = %token,
            numerator = %rate.numerator,
            denominator = %rate.denominator,
            "Fetched median rate"
        );

        Ok(rate)
    }
}
