//! Gas pricing policy for liquidation transactions.
//!
//! Celo accepts legacy `gasPrice` transactions. A liquidation either pins a
//! fixed gas price (high-value positions, to win the race) or leaves pricing
//! to the provider's gas filler.

use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;

/// One gwei in wei.
pub const GWEI: u128 = 1_000_000_000;

/// Gas price selection for one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GasPolicy {
    /// Let the node suggest a price.
    #[default]
    NetworkDefault,
    /// Fixed legacy gas price in wei.
    Fixed { gas_price: u128 },
}

impl GasPolicy {
    /// Fixed gas price expressed in gwei.
    pub fn fixed_gwei(gwei: u64) -> Self {
        Self::Fixed {
            gas_price: gwei as u128 * GWEI,
        }
    }

    /// Apply the policy to a transaction request.
    pub fn apply(&self, tx: &mut TransactionRequest) {
        if let GasPolicy::Fixed { gas_price } = self {
            tx.set_gas_price(*gas_price);
        }
    }

    /// Policy name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            GasPolicy::NetworkDefault => "network-default",
            GasPolicy::Fixed { .. } => "fixed",
        }
    }

    /// The pinned gas price, if any.
    pub fn gas_price(&self) -> Option<u128> {
        match self {
            GasPolicy::NetworkDefault => None,
            GasPolicy::Fixed { gas_price } => Some(*gas_price),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[test]
    fn test_fixed_apply_gas() {
        let policy = GasPolicy::fixed_gwei(5);
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);

        policy.apply(&mut tx);
        assert_eq!(tx.gas_price(), Some(5_000_000_000));
        assert_eq!(policy.name(), "fixed");
    }

    #[test]
    fn test_network_default_leaves_price_unset() {
        let mut tx = TransactionRequest::default().with_to(Address::ZERO);

        GasPolicy::NetworkDefault.apply(&mut tx);
        assert_eq!(tx.gas_price(), None);
        assert_eq!(GasPolicy::default(), GasPolicy::NetworkDefault);
    }
}
