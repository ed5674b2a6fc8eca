//! Liquidator core logic.
//!
//! This crate provides the core liquidation bot functionality:
//! - Asset registry for the Moola markets on Celo
//! - Cached SortedOracles rates and a paginated loan-book snapshot
//! - Health factor evaluation and ranking in exact decimal arithmetic
//! - Swap path routing for flash-loan repayment
//! - Bounded-concurrency liquidation dispatch
//! - Non-overlapping periodic scheduling and bot orchestration

mod assets;
mod bot;
pub mod config;
pub mod decimal_math;
mod dispatcher;
mod error;
mod health;
mod loan_book;
mod oracle_cache;
mod position;
mod router;
mod scheduler;

pub use assets::{Asset, AssetRegistry};
pub use bot::{CycleReport, LiquidationBot};
pub use config::{AppConfig, BotConfig, LiquidationConfig, Network, PollingConfig};
pub use dispatcher::{
    AttemptOutcome, DispatchParams, DispatchSummary, LiquidationDispatcher, RejectReason,
};
pub use error::{ConfigError, MathError, OracleError, RouteError};
pub use health::{
    Evaluation, HealthFactorEngine, RankedLoan, SkipReason, SkippedPosition, ValuedEntry,
};
pub use loan_book::{FetchReport, LoanBookFetcher, PAGE_SIZE};
pub use oracle_cache::{PriceOracleCache, PriceSnapshot};
pub use position::{ReserveEntry, UserPosition};
pub use router::{AssetRouter, SwapPath};
pub use scheduler::{SchedulerStats, SequentialScheduler};
