//! Chain interaction errors.

use alloy::primitives::B256;
use alloy::transports::http::reqwest::Url;

/// Errors raised by the chain layer.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// Transport or RPC level failure (node unreachable, call reverted on estimate, ...)
    #[error("rpc error: {0}")]
    Rpc(String),

    /// No answer within the deadline; a submitted transaction may still land.
    #[error("{op} timed out after {after_ms}ms")]
    Timeout { op: &'static str, after_ms: u64 },

    /// Transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    Reverted(B256),

    /// Oracle returned a zero denominator or no reports for the token.
    #[error("no oracle rate for token {0}")]
    NoRate(alloy::primitives::Address),

    /// Signing key could not be parsed.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Malformed RPC URL.
    #[error("invalid rpc url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ChainError {
    pub(crate) fn rpc(e: impl std::fmt::Display) -> Self {
        Self::Rpc(e.to_string())
    }
}

/// Parse an RPC URL for an alloy HTTP transport.
pub(crate) fn parse_url(url: &str) -> Result<Url, ChainError> {
    url.parse::<Url>().map_err(|e| ChainError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
