//! Position data structures for Moola borrowers.

use alloy::primitives::{Address, U256};
use moola_liquidator_api::{SubgraphUser, UserReserve};
use serde::{Deserialize, Serialize};

/// One borrow- or collateral-side reserve of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveEntry {
    /// Underlying token address
    pub asset: Address,
    /// Raw amount (token decimals, unscaled)
    pub principal: U256,
    /// Token decimals
    pub decimals: u8,
    /// Liquidation threshold (in basis points, e.g., 8000 = 80%)
    pub liquidation_threshold_bps: u16,
    /// Liquidation bonus (in basis points, e.g., 10500 = 5% bonus)
    pub liquidation_bonus_bps: u16,
    /// Token symbol, for logs
    pub symbol: String,
}

impl From<&UserReserve> for ReserveEntry {
    fn from(r: &UserReserve) -> Self {
        Self {
            asset: r.reserve.underlying_asset,
            principal: r.amount,
            decimals: r.reserve.decimals,
            liquidation_threshold_bps: r.reserve.liquidation_threshold_bps,
            liquidation_bonus_bps: r.reserve.liquidation_bonus_bps,
            symbol: r.reserve.symbol.clone(),
        }
    }
}

/// A borrower and its reserves, as of the last loan-book refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPosition {
    pub user: Address,
    pub borrows: Vec<ReserveEntry>,
    pub collaterals: Vec<ReserveEntry>,
}

impl UserPosition {
    /// Build a position from a subgraph row.
    ///
    /// Returns `None` when the row id is not a valid borrower address.
    pub fn from_subgraph(row: &SubgraphUser) -> Option<Self> {
        let user: Address = row.id.parse().ok()?;
        Some(Self {
            user,
            borrows: row.borrow_reserve.iter().map(ReserveEntry::from).collect(),
            collaterals: row.collateral_reserve.iter().map(ReserveEntry::from).collect(),
        })
    }

    #[inline]
    pub fn has_debt(&self) -> bool {
        !self.borrows.is_empty()
    }
}
