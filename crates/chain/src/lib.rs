//! Moola liquidator chain interaction layer.
//!
//! This crate provides:
//! - Celo core-contract resolution through the on-chain Registry
//! - SortedOracles median-rate reads
//! - The `LiquidateLoan` settlement contract binding
//! - Transaction signing and sending with local nonce management
//! - Gas price policy (fixed or network default)

mod error;
pub mod gas;
mod liquidate_loan;
mod registry;
mod signer;
mod sorted_oracles;

pub use error::ChainError;
pub use gas::GasPolicy;
pub use liquidate_loan::{
    FlashLiquidator, FlashLoanCall, ILiquidateLoan, LiquidateLoanContract, LiquidationReceipt,
};
pub use registry::{CeloRegistry, CELO_REGISTRY};
pub use signer::{NonceManager, TransactionSender};
pub use sorted_oracles::{MedianRate, RateSource, SortedOraclesReader};
