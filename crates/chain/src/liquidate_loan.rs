//! `LiquidateLoan` settlement contract binding.
//!
//! The contract flash-borrows the debt asset, repays the borrower's debt,
//! receives the collateral plus bonus, swaps it back along `swapPath` and
//! repays the flash loan, all in one transaction.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

use crate::error::ChainError;
use crate::gas::GasPolicy;
use crate::signer::TransactionSender;

sol! {
    /// LiquidateLoan entry point (matches deployed contract)
    interface ILiquidateLoan {
        function executeFlashLoans(
            address assetToLiquidate,
            uint256 flashAmt,
            address collateral,
            address userToLiquidate,
            address[] calldata swapPath
        ) external;
    }
}

/// Parameters of one flash-loan liquidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashLoanCall {
    /// Debt asset to flash-borrow and repay
    pub debt_asset: Address,
    /// Flash-loan amount (raw units of the debt asset)
    pub flash_amount: U256,
    /// Collateral asset to seize
    pub collateral_asset: Address,
    /// Borrower being liquidated
    pub borrower: Address,
    /// Swap path from collateral back to debt
    pub swap_path: Vec<Address>,
}

impl FlashLoanCall {
    /// ABI-encode the `executeFlashLoans` call.
    pub fn encode(&self) -> Bytes {
        let call = ILiquidateLoan::executeFlashLoansCall {
            assetToLiquidate: self.debt_asset,
            flashAmt: self.flash_amount,
            collateral: self.collateral_asset,
            userToLiquidate: self.borrower,
            swapPath: self.swap_path.clone(),
        };
        Bytes::from(call.abi_encode())
    }
}

/// Receipt of a successful liquidation transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiquidationReceipt {
    pub tx_hash: B256,
}

/// Anything that can submit a flash-loan liquidation.
#[async_trait]
pub trait FlashLiquidator: Send + Sync {
    async fn execute_flash_loan(
        &self,
        call: &FlashLoanCall,
        gas: GasPolicy,
    ) -> Result<LiquidationReceipt, ChainError>;
}

/// Deployed `LiquidateLoan` contract with a signing sender.
#[derive(Debug, Clone)]
pub struct LiquidateLoanContract {
    pub address: Address,
    sender: Arc<TransactionSender>,
}

impl LiquidateLoanContract {
    pub fn new(address: Address, sender: Arc<TransactionSender>) -> Self {
        Self { address, sender }
    }
}

#[async_trait]
impl FlashLiquidator for LiquidateLoanContract {
    #[instrument(skip(self, call), fields(borrower = %call.borrower, contract = %self.address))]
    async fn execute_flash_loan(
        &self,
        call: &FlashLoanCall,
        gas: GasPolicy,
    ) -> Result<LiquidationReceipt, ChainError> {
        let tx_hash = self
            .sender
            .send_transaction(self.address, call.encode(), gas)
            .await?;
        Ok(LiquidationReceipt { tx_hash })
    }
}
