//! Health factor evaluation and ranking.
//!
//! Pure computation over a loan-book snapshot and a price snapshot. For a
//! position with borrow entries `b` and collateral entries `c`:
//!
//! ```text
//! value(e)     = principal(e) / rate(asset(e)) / 10^decimals(e)
//! borrowed     = sum(value(b))
//! collateral   = sum(value(c) * threshold_bps(c) / 10000)
//! healthFactor = collateral / borrowed
//! ```
//!
//! A position is liquidatable when `healthFactor <= threshold`.

use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use crate::assets::{Asset, AssetRegistry};
use crate::decimal_math;
use crate::error::MathError;
use crate::oracle_cache::PriceSnapshot;
use crate::position::{ReserveEntry, UserPosition};

/// Why a position was left out of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("reserve {0} is not a supported asset")]
    UnsupportedAsset(Address),

    #[error("no cached rate for {0}")]
    MissingRate(Asset),

    #[error("zero rate for {0}")]
    ZeroRate(Asset),

    #[error("position has no debt")]
    ZeroDebt,

    #[error(transparent)]
    Math(#[from] MathError),
}

/// A reserve entry with its value in CELO.
#[derive(Debug, Clone, PartialEq)]
pub struct ValuedEntry {
    pub entry: ReserveEntry,
    pub asset: Asset,
    /// Unweighted native value
    pub value: Decimal,
}

/// An evaluated position.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedLoan {
    pub user: Address,
    pub health_factor: Decimal,
    pub total_borrowed: Decimal,
    pub total_collateral_threshold: Decimal,
    /// Largest debt by native value
    pub max_borrowed: ValuedEntry,
    /// Largest collateral by unweighted native value
    pub max_collateral: Option<ValuedEntry>,
}

/// A position that could not be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPosition {
    pub user: Address,
    pub reason: SkipReason,
}

/// Result of evaluating a whole snapshot.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    /// Liquidatable positions, lowest health factor first
    pub unhealthy: Vec<RankedLoan>,
    pub skipped: Vec<SkippedPosition>,
    pub healthy: usize,
}

pub struct HealthFactorEngine {
    assets: Arc<AssetRegistry>,
    threshold: Decimal,
}

impl HealthFactorEngine {
    pub fn new(assets: Arc<AssetRegistry>, threshold: Decimal) -> Self {
        Self { assets, threshold }
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    /// Evaluate every position and rank the liquidatable ones.
    pub fn evaluate(&self, positions: &[UserPosition], prices: &PriceSnapshot) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for position in positions {
            match self.assess(position, prices) {
                Ok(loan) if self.is_unhealthy(&loan) => evaluation.unhealthy.push(loan),
                Ok(_) => evaluation.healthy += 1,
                Err(reason) => {
                    debug!(user = %position.user, reason = %reason, "Position skipped");
                    evaluation.skipped.push(SkippedPosition {
                        user: position.user,
                        reason,
                    });
                }
            }
        }

        // Stable: equal health factors keep snapshot order
        evaluation
            .unhealthy
            .sort_by(|a, b| a.health_factor.cmp(&b.health_factor));
        evaluation
    }

    #[inline]
    pub fn is_unhealthy(&self, loan: &RankedLoan) -> bool {
        loan.health_factor <= self.threshold
    }

    /// Compute the health factor of one position.
    pub fn assess(&self, position: &UserPosition, prices: &PriceSnapshot) -> Result<RankedLoan, SkipReason> {
        let mut total_borrowed = Decimal::ZERO;
        let mut max_borrowed: Option<ValuedEntry> = None;
        for entry in &position.borrows {
            let valued = self.value(entry, prices)?;
            total_borrowed = checked_add(total_borrowed, valued.value)?;
            if max_borrowed.as_ref().map_or(true, |m| valued.value > m.value) {
                max_borrowed = Some(valued);
            }
        }

        let max_borrowed = match max_borrowed {
            Some(m) if !total_borrowed.is_zero() => m,
            _ => return Err(SkipReason::ZeroDebt),
        };

        let mut total_collateral_threshold = Decimal::ZERO;
        let mut max_collateral: Option<ValuedEntry> = None;
        for entry in &position.collaterals {
            let valued = self.value(entry, prices)?;
            let weighted = valued
                .value
                .checked_mul(decimal_math::bps_fraction(entry.liquidation_threshold_bps))
                .ok_or_else(|| MathError::Overflow(valued.value.to_string()))?;
            total_collateral_threshold = checked_add(total_collateral_threshold, weighted)?;
            if max_collateral.as_ref().map_or(true, |m| valued.value > m.value) {
                max_collateral = Some(valued);
            }
        }

        let health_factor = total_collateral_threshold
            .checked_div(total_borrowed)
            .ok_or(MathError::DivisionByZero)?;

        Ok(RankedLoan {
            user: position.user,
            health_factor,
            total_borrowed,
            total_collateral_threshold,
            max_borrowed,
            max_collateral,
        })
    }

    fn value(&self, entry: &ReserveEntry, prices: &PriceSnapshot) -> Result<ValuedEntry, SkipReason> {
        let asset = self
            .assets
            .asset_of(&entry.asset)
            .map_err(|_| SkipReason::UnsupportedAsset(entry.asset))?;
        let rate = prices.rate(asset).ok_or(SkipReason::MissingRate(asset))?;
        if rate.is_zero() {
            return Err(SkipReason::ZeroRate(asset));
        }
        let value = decimal_math::native_value(entry.principal, rate, entry.decimals)?;
        Ok(ValuedEntry {
            entry: entry.clone(),
            asset,
            value,
        })
    }
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    a.checked_add(b).ok_or_else(|| MathError::Overflow(format!("{a} + {b}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::U256;
    use std::str::FromStr;

    pub(crate) fn entry(registry: &AssetRegistry, asset: Asset, principal: u64, decimals: u8, threshold: u16) -> ReserveEntry {
        ReserveEntry {
            asset: registry.address_of(asset),
            principal: U256::from(principal),
            decimals,
            liquidation_threshold_bps: threshold,
            liquidation_bonus_bps: 10500,
            symbol: asset.symbol().to_string(),
        }
    }

    pub(crate) fn prices() -> PriceSnapshot {
        PriceSnapshot::from_rates([(Asset::CUsd, Decimal::from(2)), (Asset::CEur, Decimal::from(4))])
    }

    fn engine() -> (Arc<AssetRegistry>, HealthFactorEngine) {
        let registry = Arc::new(AssetRegistry::default());
        (registry.clone(), HealthFactorEngine::new(registry, Decimal::ONE))
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_worked_example() {
        let (registry, engine) = engine();
        // collateral: 1000 raw, 2 decimals, rate 2, 80% -> 4 CELO
        // debt: 500 raw, 2 decimals, rate 1 -> 5 CELO
        let position = UserPosition {
            user: Address::repeat_byte(1),
            collaterals: vec![entry(&registry, Asset::CUsd, 1000, 2, 8000)],
            borrows: vec![entry(&registry, Asset::Celo, 500, 2, 0)],
        };

        let loan = engine.assess(&position, &prices()).unwrap();
        assert_eq!(loan.total_collateral_threshold, dec("4"));
        assert_eq!(loan.total_borrowed, dec("5"));
        assert_eq!(loan.health_factor, dec("0.8"));
        assert!(engine.is_unhealthy(&loan));

        let evaluation = engine.evaluate(&[position], &prices());
        assert_eq!(evaluation.unhealthy.len(), 1);
        assert_eq!(evaluation.healthy, 0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let (registry, engine) = engine();
        // 10 CELO at 50% against 5 CELO of debt: exactly 1
        let position = UserPosition {
            user: Address::repeat_byte(1),
            collaterals: vec![entry(&registry, Asset::Celo, 1000, 2, 5000)],
            borrows: vec![entry(&registry, Asset::Celo, 500, 2, 0)],
        };
        let loan = engine.assess(&position, &prices()).unwrap();
        assert_eq!(loan.health_factor, Decimal::ONE);
        assert!(engine.is_unhealthy(&loan));
    }

    #[test]
    fn test_ranking_and_determinism() {
        let (registry, engine) = engine();
        let make = |user: u8, collateral: u64| UserPosition {
            user: Address::repeat_byte(user),
            collaterals: vec![entry(&registry, Asset::Celo, collateral, 0, 8000)],
            borrows: vec![entry(&registry, Asset::Celo, 100, 0, 0)],
        };
        // HF: 0.8, 0.4, 2.0 (healthy), 0.4
        let positions = vec![make(1, 100), make(2, 50), make(3, 250), make(4, 50)];

        let first = engine.evaluate(&positions, &prices());
        let users: Vec<_> = first.unhealthy.iter().map(|l| l.user).collect();
        assert_eq!(
            users,
            vec![Address::repeat_byte(2), Address::repeat_byte(4), Address::repeat_byte(1)]
        );
        assert_eq!(first.healthy, 1);

        let second = engine.evaluate(&positions, &prices());
        assert_eq!(first.unhealthy, second.unhealthy);
    }

    #[test]
    fn test_max_entries_first_wins_ties() {
        let (registry, engine) = engine();
        // cUSD 200 / 2 = 100 and CELO 100 / 1 = 100: equal values
        let position = UserPosition {
            user: Address::repeat_byte(1),
            collaterals: vec![
                entry(&registry, Asset::CEur, 400, 0, 8000),
                entry(&registry, Asset::Celo, 100, 0, 8000),
                entry(&registry, Asset::CUsd, 100, 0, 8000),
            ],
            borrows: vec![
                entry(&registry, Asset::CUsd, 200, 0, 0),
                entry(&registry, Asset::Celo, 100, 0, 0),
            ],
        };

        let loan = engine.assess(&position, &prices()).unwrap();
        assert_eq!(loan.max_borrowed.asset, Asset::CUsd);
        assert_eq!(loan.max_borrowed.value, dec("100"));
        assert_eq!(loan.max_collateral.as_ref().unwrap().asset, Asset::CEur);
    }

    #[test]
    fn test_zero_debt_excluded() {
        let (registry, engine) = engine();
        let position = UserPosition {
            user: Address::repeat_byte(1),
            collaterals: vec![entry(&registry, Asset::Celo, 100, 0, 8000)],
            borrows: vec![entry(&registry, Asset::CUsd, 0, 18, 0)],
        };

        let evaluation = engine.evaluate(&[position], &prices());
        assert!(evaluation.unhealthy.is_empty());
        assert_eq!(evaluation.skipped[0].reason, SkipReason::ZeroDebt);
    }

    #[test]
    fn test_no_collateral_ranks_at_zero() {
        let (registry, engine) = engine();
        let position = UserPosition {
            user: Address::repeat_byte(1),
            collaterals: vec![],
            borrows: vec![entry(&registry, Asset::Celo, 100, 0, 0)],
        };

        let loan = engine.assess(&position, &prices()).unwrap();
        assert_eq!(loan.health_factor, Decimal::ZERO);
        assert!(loan.max_collateral.is_none());
    }

    #[test]
    fn test_unpriceable_positions_skipped() {
        let (registry, engine) = engine();
        let unknown = ReserveEntry {
            asset: Address::repeat_byte(0xee),
            ..entry(&registry, Asset::Celo, 1, 0, 0)
        };
        let positions = vec![
            UserPosition {
                user: Address::repeat_byte(1),
                collaterals: vec![],
                borrows: vec![unknown],
            },
            UserPosition {
                user: Address::repeat_byte(2),
                collaterals: vec![],
                borrows: vec![entry(&registry, Asset::CUsd, 1, 0, 0)],
            },
        ];

        // Nothing quoted yet: only CELO resolves
        let evaluation = engine.evaluate(&positions, &PriceSnapshot::empty());
        assert!(evaluation.unhealthy.is_empty());
        assert_eq!(
            evaluation.skipped[0].reason,
            SkipReason::UnsupportedAsset(Address::repeat_byte(0xee))
        );
        assert_eq!(evaluation.skipped[1].reason, SkipReason::MissingRate(Asset::CUsd));

        let zero = PriceSnapshot::from_rates([(Asset::CUsd, Decimal::ZERO)]);
        let evaluation = engine.evaluate(&positions[1..], &zero);
        assert_eq!(evaluation.skipped[0].reason, SkipReason::ZeroRate(Asset::CUsd));
    }
}
