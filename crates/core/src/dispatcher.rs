//! Liquidation dispatch.
//!
//! Turns ranked loans into `executeFlashLoans` calls and submits them on
//! their own tasks, bounded by one long-lived semaphore. Every attempt is
//! independent: a failure is logged and tagged, never retried within the
//! cycle, and never affects siblings. A borrower with an attempt still in
//! flight is not submitted again until that attempt ends.

use alloy::primitives::{Address, B256, U256};
use futures::future::join_all;
use moola_liquidator_chain::{ChainError, FlashLiquidator, FlashLoanCall, GasPolicy};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::LiquidationConfig;
use crate::decimal_math;
use crate::error::RouteError;
use crate::health::RankedLoan;
use crate::router::AssetRouter;

/// Why an attempt was not submitted.
#[derive(Debug, thiserror::Error)]
pub enum RejectReason {
    #[error("position has no collateral to seize")]
    NoCollateral,

    #[error("flash amount rounds to zero")]
    ZeroFlashAmount,

    #[error(transparent)]
    Route(#[from] RouteError),

    /// Signer or endpoint misconfiguration; retrying cannot help.
    #[error("chain client misconfigured: {0}")]
    Config(ChainError),
}

/// Result of one liquidation attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Submitted { tx_hash: B256 },
    /// Network failure, timeout or revert; the next cycle may succeed
    Transient(ChainError),
    Rejected(RejectReason),
}

impl AttemptOutcome {
    fn from_chain_error(e: ChainError) -> Self {
        match e {
            ChainError::InvalidKey(_) | ChainError::InvalidUrl { .. } => {
                Self::Rejected(RejectReason::Config(e))
            }
            other => Self::Transient(other),
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Self::Submitted { .. })
    }
}

/// Outcome counts for one dispatch round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub submitted: usize,
    pub transient: usize,
    pub rejected: usize,
    /// Loans left alone because their previous attempt is still running
    pub in_flight: usize,
}

impl DispatchSummary {
    pub fn record(&mut self, outcome: &AttemptOutcome) {
        match outcome {
            AttemptOutcome::Submitted { .. } => self.submitted += 1,
            AttemptOutcome::Transient(_) => self.transient += 1,
            AttemptOutcome::Rejected(_) => self.rejected += 1,
        }
    }

    pub fn attempts(&self) -> usize {
        self.submitted + self.transient + self.rejected
    }
}

/// Parameters that shape each call.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchParams {
    /// Share of the largest debt to flash-borrow (bps)
    pub fraction_bps: u16,
    /// Collateral value (CELO) above which the priority gas price is used
    pub high_value_threshold: Decimal,
    pub priority_gas_price_gwei: u64,
    pub max_concurrent: usize,
    /// Deadline for one executor call
    pub attempt_timeout: Duration,
}

impl From<&LiquidationConfig> for DispatchParams {
    fn from(cfg: &LiquidationConfig) -> Self {
        Self {
            fraction_bps: cfg.fraction_bps,
            high_value_threshold: cfg.high_value_threshold_celo,
            priority_gas_price_gwei: cfg.priority_gas_price_gwei,
            max_concurrent: cfg.max_concurrent,
            attempt_timeout: cfg.attempt_timeout(),
        }
    }
}

/// Releases a borrower's in-flight claim when its attempt task ends.
struct BorrowerClaim {
    dispatcher: Arc<LiquidationDispatcher>,
    user: Address,
}

impl Drop for BorrowerClaim {
    fn drop(&mut self) {
        self.dispatcher.in_flight.lock().remove(&self.user);
    }
}

pub struct LiquidationDispatcher {
    executor: Arc<dyn FlashLiquidator>,
    router: AssetRouter,
    params: DispatchParams,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashSet<Address>>,
    totals: Mutex<DispatchSummary>,
}

impl LiquidationDispatcher {
    pub fn new(executor: Arc<dyn FlashLiquidator>, router: AssetRouter, params: DispatchParams) -> Self {
        let permits = Arc::new(Semaphore::new(params.max_concurrent.max(1)));
        Self {
            executor,
            router,
            params,
            permits,
            in_flight: Mutex::new(HashSet::new()),
            totals: Mutex::new(DispatchSummary::default()),
        }
    }

    /// Build the contract call and gas policy for a loan.
    pub fn plan(&self, loan: &RankedLoan) -> Result<(FlashLoanCall, GasPolicy), RejectReason> {
        let collateral = loan.max_collateral.as_ref().ok_or(RejectReason::NoCollateral)?;
        let debt = &loan.max_borrowed;

        let flash_amount = decimal_math::apply_bps(debt.entry.principal, self.params.fraction_bps);
        if flash_amount == U256::ZERO {
            return Err(RejectReason::ZeroFlashAmount);
        }

        let swap_path = self.router.route(collateral.entry.asset, debt.entry.asset)?;

        let call = FlashLoanCall {
            debt_asset: debt.entry.asset,
            flash_amount,
            collateral_asset: collateral.entry.asset,
            borrower: loan.user,
            swap_path: swap_path.to_vec(),
        };
        Ok((call, self.gas_policy(collateral.value)))
    }

    /// Fixed priority gas when half the collateral exceeds the threshold.
    pub fn gas_policy(&self, collateral_value: Decimal) -> GasPolicy {
        if collateral_value / Decimal::TWO > self.params.high_value_threshold {
            GasPolicy::fixed_gwei(self.params.priority_gas_price_gwei)
        } else {
            GasPolicy::NetworkDefault
        }
    }

    /// Plan and submit one liquidation, bounded by the attempt deadline.
    pub async fn attempt(&self, loan: &RankedLoan) -> AttemptOutcome {
        let (call, gas) = match self.plan(loan) {
            Ok(plan) => plan,
            Err(reason) => {
                warn!(
                    user = %loan.user,
                    health_factor = %loan.health_factor,
                    debt = %loan.max_borrowed.asset,
                    debt_principal = %loan.max_borrowed.entry.principal,
                    collateral = ?loan.max_collateral.as_ref().map(|c| c.asset),
                    reason = %reason,
                    "Liquidation rejected"
                );
                return AttemptOutcome::Rejected(reason);
            }
        };

        info!(
            user = %loan.user,
            health_factor = %loan.health_factor,
            debt = %call.debt_asset,
            collateral = %call.collateral_asset,
            flash_amount = %call.flash_amount,
            hops = call.swap_path.len(),
            gas_policy = gas.name(),
            "Submitting liquidation"
        );

        let deadline = self.params.attempt_timeout;
        let result = tokio::time::timeout(deadline, self.executor.execute_flash_loan(&call, gas))
            .await
            .unwrap_or_else(|_| {
                Err(ChainError::Timeout {
                    op: "liquidation",
                    after_ms: deadline.as_millis() as u64,
                })
            });

        match result {
            Ok(receipt) => {
                info!(user = %loan.user, tx_hash = %receipt.tx_hash, "Liquidation confirmed");
                AttemptOutcome::Submitted {
                    tx_hash: receipt.tx_hash,
                }
            }
            Err(e) => {
                warn!(
                    user = %loan.user,
                    health_factor = %loan.health_factor,
                    debt = %call.debt_asset,
                    collateral = %call.collateral_asset,
                    flash_amount = %call.flash_amount,
                    swap_path = ?call.swap_path,
                    gas_policy = gas.name(),
                    error = %e,
                    "Liquidation failed"
                );
                AttemptOutcome::from_chain_error(e)
            }
        }
    }

    /// Spawn an attempt for `loan` unless one is already running for that
    /// borrower. The task waits for a permit, so at most `max_concurrent`
    /// attempts run at once across all cycles.
    fn spawn_attempt(self: &Arc<Self>, loan: RankedLoan) -> Option<JoinHandle<AttemptOutcome>> {
        if !self.in_flight.lock().insert(loan.user) {
            debug!(user = %loan.user, "Liquidation already in flight, skipping");
            return None;
        }
        let claim = BorrowerClaim {
            dispatcher: Arc::clone(self),
            user: loan.user,
        };

        Some(tokio::spawn(async move {
            let this = Arc::clone(&claim.dispatcher);
            // The semaphore is never closed
            let _permit = this.permits.clone().acquire_owned().await.ok();
            let outcome = this.attempt(&loan).await;
            this.totals.lock().record(&outcome);
            drop(claim);
            outcome
        }))
    }

    /// Hand every loan to its own attempt task and return without waiting.
    ///
    /// Returns how many attempts were started.
    pub fn submit(self: &Arc<Self>, loans: &[RankedLoan]) -> usize {
        loans
            .iter()
            .filter_map(|loan| self.spawn_attempt(loan.clone()))
            .count()
    }

    /// Attempt every loan and wait for all outcomes.
    pub async fn dispatch_all(self: &Arc<Self>, loans: &[RankedLoan]) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        let mut handles = Vec::with_capacity(loans.len());
        for loan in loans {
            match self.spawn_attempt(loan.clone()) {
                Some(handle) => handles.push(handle),
                None => summary.in_flight += 1,
            }
        }

        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => warn!(error = %e, "Liquidation task aborted"),
            }
        }
        summary
    }

    /// Borrowers with an attempt still running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Outcomes of every attempt finished so far.
    pub fn totals(&self) -> DispatchSummary {
        *self.totals.lock()
    }
}
