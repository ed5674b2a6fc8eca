//! Cached CELO exchange rates for the Moola assets.
//!
//! Each refresh reads all quoted assets concurrently and swaps in a new
//! immutable snapshot only if every read succeeded.

use alloy::primitives::Address;
use futures::future::try_join_all;
use moola_liquidator_chain::RateSource;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::assets::{Asset, AssetRegistry};
use crate::decimal_math;
use crate::error::OracleError;
use crate::scheduler::{SchedulerStats, SequentialScheduler};

/// Deadline for one refresh of every quoted asset.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Rates of every quoted asset at one point in time.
#[derive(Debug, Clone)]
pub struct PriceSnapshot {
    /// Units of the asset per 1 CELO
    rates: HashMap<Asset, Decimal>,
    fetched_at: Option<Instant>,
}

impl PriceSnapshot {
    /// Snapshot with no quotes (only the native rate resolves).
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
            fetched_at: None,
        }
    }

    pub fn from_rates(rates: impl IntoIterator<Item = (Asset, Decimal)>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
            fetched_at: Some(Instant::now()),
        }
    }

    /// Rate of `asset` against CELO; always 1 for CELO itself.
    pub fn rate(&self, asset: Asset) -> Option<Decimal> {
        if asset.is_native() {
            return Some(Decimal::ONE);
        }
        self.rates.get(&asset).copied()
    }

    pub fn is_populated(&self) -> bool {
        self.fetched_at.is_some()
    }

    pub fn age(&self) -> Option<Duration> {
        self.fetched_at.map(|t| t.elapsed())
    }
}

/// Periodically refreshed price cache.
pub struct PriceOracleCache {
    source: Arc<dyn RateSource>,
    assets: Arc<AssetRegistry>,
    period: Duration,
    timeout: Duration,
    snapshot: RwLock<Arc<PriceSnapshot>>,
    scheduler: Mutex<Option<SequentialScheduler>>,
}

impl PriceOracleCache {
    pub fn new(source: Arc<dyn RateSource>, assets: Arc<AssetRegistry>, period: Duration) -> Self {
        Self {
            source,
            assets,
            period,
            timeout: DEFAULT_REFRESH_TIMEOUT,
            snapshot: RwLock::new(Arc::new(PriceSnapshot::empty())),
            scheduler: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read every quoted asset and swap in the new snapshot.
    pub async fn refresh(&self) -> Result<Arc<PriceSnapshot>, OracleError> {
        let reads = self.assets.quoted_assets().map(|(asset, token)| async move {
            let median = self
                .source
                .median_rate(token)
                .await
                .map_err(|e| OracleError::Fetch {
                    asset,
                    reason: e.to_string(),
                })?;
            let rate = decimal_math::ratio(median.numerator, median.denominator)
                .map_err(|source| OracleError::InvalidRate { asset, source })?;
            Ok::<_, OracleError>((asset, rate))
        });

        let rates = tokio::time::timeout(self.timeout, try_join_all(reads))
            .await
            .map_err(|_| OracleError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            })??;
        for (asset, rate) in &rates {
            debug!(asset = %asset, rate = %rate, "Oracle rate");
        }

        let snapshot = Arc::new(PriceSnapshot::from_rates(rates));
        *self.snapshot.write() = snapshot.clone();
        Ok(snapshot)
    }

    /// Fetch once, then keep refreshing every period.
    pub async fn start(self: &Arc<Self>) {
        if self.is_running() {
            return;
        }
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Initial oracle fetch failed");
        }

        let this = Arc::clone(self);
        let scheduler = SequentialScheduler::start("oracle", self.period, move || {
            let this = this.clone();
            async move {
                this.refresh().await?;
                Ok::<_, anyhow::Error>(())
            }
        });
        *self.scheduler.lock() = Some(scheduler);
    }

    /// Stop refreshing; cached rates keep being served.
    pub fn stop(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    /// Last known rate of `token` against CELO.
    ///
    /// `Ok(None)` means the asset is supported but no quote is cached yet.
    pub fn rate(&self, token: &Address) -> Result<Option<Decimal>, OracleError> {
        let asset = self.assets.asset_of(token)?;
        if asset.is_native() {
            return Ok(Some(Decimal::ONE));
        }

        let snapshot = self.snapshot();
        if !snapshot.is_populated() {
            warn!(asset = %asset, "Oracle cache not populated yet");
        } else if !self.is_running() {
            warn!(asset = %asset, "Oracle cache stopped, serving last known rate");
        }
        Ok(snapshot.rate(asset))
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<PriceSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn stats(&self) -> Option<SchedulerStats> {
        self.scheduler.lock().as_ref().map(|s| s.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use moola_liquidator_chain::{ChainError, MedianRate};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Quotes every token at 2 / 1, or fails when told to.
    struct FakeRates {
        fail: AtomicBool,
        stall: AtomicBool,
        calls: AtomicUsize,
    }

    impl FakeRates {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                stall: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateSource for FakeRates {
        async fn median_rate(&self, token: Address) -> Result<MedianRate, ChainError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.stall.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(ChainError::NoRate(token));
            }
            Ok(MedianRate::new(U256::from(2u64), U256::from(1u64)))
        }
    }

    fn cache(source: Arc<FakeRates>) -> PriceOracleCache {
        PriceOracleCache::new(source, Arc::new(AssetRegistry::default()), Duration::from_millis(1500))
    }

    #[tokio::test]
    async fn test_native_rate_is_one_before_population() {
        let registry = AssetRegistry::default();
        let cache = cache(Arc::new(FakeRates::new()));

        assert_eq!(cache.rate(&registry.native()).unwrap(), Some(Decimal::ONE));
        // Supported but not fetched yet
        assert_eq!(cache.rate(&registry.address_of(Asset::CUsd)).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unsupported_asset() {
        let cache = cache(Arc::new(FakeRates::new()));
        let unknown = Address::repeat_byte(0x99);
        assert_eq!(cache.rate(&unknown), Err(OracleError::UnsupportedAsset(unknown)));
    }

    #[tokio::test]
    async fn test_refresh_populates_all_quoted_assets() {
        let registry = AssetRegistry::default();
        let source = Arc::new(FakeRates::new());
        let cache = cache(source.clone());

        let snapshot = cache.refresh().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(snapshot.is_populated());

        let two = Decimal::from_str("2").unwrap();
        assert_eq!(cache.rate(&registry.address_of(Asset::CUsd)).unwrap(), Some(two));
        assert_eq!(cache.rate(&registry.address_of(Asset::CEur)).unwrap(), Some(two));
        assert_eq!(snapshot.rate(Asset::Celo), Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_last_snapshot() {
        let registry = AssetRegistry::default();
        let source = Arc::new(FakeRates::new());
        let cache = cache(source.clone());
        cache.refresh().await.unwrap();

        source.fail.store(true, Ordering::SeqCst);
        assert!(matches!(cache.refresh().await, Err(OracleError::Fetch { .. })));
        assert_eq!(
            cache.rate(&registry.address_of(Asset::CUsd)).unwrap(),
            Some(Decimal::from(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_serving() {
        let registry = AssetRegistry::default();
        let cache = Arc::new(cache(Arc::new(FakeRates::new())));

        cache.start().await;
        assert!(cache.is_running());
        cache.stop();
        cache.stop();
        assert!(!cache.is_running());
        assert_eq!(
            cache.rate(&registry.address_of(Asset::CEur)).unwrap(),
            Some(Decimal::from(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_refresh_times_out() {
        let registry = AssetRegistry::default();
        let source = Arc::new(FakeRates::new());
        let cache = Arc::new(cache(source.clone()).with_timeout(Duration::from_secs(2)));
        cache.refresh().await.unwrap();

        source.stall.store(true, Ordering::SeqCst);
        assert_eq!(
            cache.refresh().await.unwrap_err(),
            OracleError::Timeout { after_ms: 2000 }
        );
        assert_eq!(
            cache.rate(&registry.address_of(Asset::CUsd)).unwrap(),
            Some(Decimal::from(2))
        );

        // Ticks keep firing; each stalled run ends at the deadline
        cache.start().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        let stats = cache.stats().unwrap();
        assert!(stats.failures >= 2);
        cache.stop();
    }
}
