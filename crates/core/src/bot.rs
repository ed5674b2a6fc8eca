//! Liquidation bot orchestration.
//!
//! Owns the price cache, the loan book, the health factor engine and the
//! dispatcher, and drives them with three independent schedulers. An
//! evaluation cycle hands unhealthy loans to the dispatcher and returns
//! without waiting for their transactions.

use moola_liquidator_api::LoanBookSource;
use moola_liquidator_chain::{FlashLiquidator, RateSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::assets::AssetRegistry;
use crate::config::BotConfig;
use crate::dispatcher::{DispatchParams, DispatchSummary, LiquidationDispatcher};
use crate::health::HealthFactorEngine;
use crate::loan_book::LoanBookFetcher;
use crate::oracle_cache::PriceOracleCache;
use crate::router::AssetRouter;
use crate::scheduler::{SchedulerStats, SequentialScheduler};

/// Summary of one evaluation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub positions: usize,
    pub healthy: usize,
    pub unhealthy: usize,
    pub skipped: usize,
    /// Attempts started this cycle
    pub dispatched: usize,
    /// Unhealthy loans whose previous attempt is still running
    pub in_flight: usize,
}

pub struct LiquidationBot {
    oracle: Arc<PriceOracleCache>,
    loan_book: Arc<LoanBookFetcher>,
    engine: HealthFactorEngine,
    dispatcher: Arc<LiquidationDispatcher>,
    period: Duration,
    evaluation: Mutex<Option<SequentialScheduler>>,
}

impl LiquidationBot {
    pub fn new(
        config: &BotConfig,
        assets: Arc<AssetRegistry>,
        rates: Arc<dyn RateSource>,
        loans: Arc<dyn LoanBookSource>,
        executor: Arc<dyn FlashLiquidator>,
    ) -> Self {
        let oracle = Arc::new(
            PriceOracleCache::new(rates, assets.clone(), config.polling.oracle_interval())
                .with_timeout(config.polling.fetch_timeout()),
        );
        let loan_book = Arc::new(
            LoanBookFetcher::new(loans, config.polling.subgraph_interval())
                .with_timeout(config.polling.fetch_timeout()),
        );
        let engine = HealthFactorEngine::new(assets.clone(), config.liquidation.health_factor_max);
        let dispatcher = Arc::new(LiquidationDispatcher::new(
            executor,
            AssetRouter::new(assets),
            DispatchParams::from(&config.liquidation),
        ));

        Self {
            oracle,
            loan_book,
            engine,
            dispatcher,
            period: config.polling.bot_interval(),
            evaluation: Mutex::new(None),
        }
    }

    /// Start price and loan-book polling, evaluate once, then keep evaluating.
    pub async fn start(self: &Arc<Self>) {
        if self.is_running() {
            warn!("Bot is already running");
            return;
        }

        self.oracle.start().await;
        self.loan_book.start().await;
        self.run_cycle().await;

        let this = Arc::clone(self);
        let scheduler = SequentialScheduler::start("evaluation", self.period, move || {
            let this = this.clone();
            async move {
                this.run_cycle().await;
                Ok::<_, anyhow::Error>(())
            }
        });
        *self.evaluation.lock() = Some(scheduler);
        info!(period_ms = self.period.as_millis() as u64, "Liquidation bot started");
    }

    /// Evaluate the current snapshots and start a liquidation for every
    /// unhealthy position. Does not wait for the attempts to finish.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let prices = self.oracle.snapshot();
        let positions = self.loan_book.positions();

        if !prices.is_populated() {
            warn!("Evaluating without oracle rates; only CELO-only positions can be priced");
        }

        let evaluation = self.engine.evaluate(&positions, &prices);
        let dispatched = self.dispatcher.submit(&evaluation.unhealthy);

        let report = CycleReport {
            positions: positions.len(),
            healthy: evaluation.healthy,
            unhealthy: evaluation.unhealthy.len(),
            skipped: evaluation.skipped.len(),
            dispatched,
            in_flight: evaluation.unhealthy.len() - dispatched,
        };
        info!(
            positions = report.positions,
            unhealthy = report.unhealthy,
            skipped = report.skipped,
            dispatched = report.dispatched,
            in_flight = report.in_flight,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluation cycle complete"
        );
        report
    }

    /// Stop all polling. Cached prices and positions stay readable; attempts
    /// already started run to completion or their deadline.
    pub fn stop(&self) {
        let Some(evaluation) = self.evaluation.lock().take() else {
            info!("Bot is not running");
            return;
        };
        evaluation.stop();
        self.oracle.stop();
        self.loan_book.stop();
        let totals = self.dispatcher.totals();
        info!(
            in_flight = self.dispatcher.in_flight(),
            submitted = totals.submitted,
            transient = totals.transient,
            rejected = totals.rejected,
            "Liquidation bot stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.evaluation.lock().is_some()
    }

    pub fn oracle(&self) -> &Arc<PriceOracleCache> {
        &self.oracle
    }

    pub fn loan_book(&self) -> &Arc<LoanBookFetcher> {
        &self.loan_book
    }

    /// Outcomes of every liquidation attempt finished so far.
    pub fn dispatch_totals(&self) -> DispatchSummary {
        self.dispatcher.totals()
    }

    pub fn stats(&self) -> Option<SchedulerStats> {
        self.evaluation.lock().as_ref().map(|s| s.stats())
    }
}
