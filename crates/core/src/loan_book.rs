//! Loan book snapshot fetched from the Moola subgraph.
//!
//! A refresh pages through every user with cursor pagination and only
//! replaces the snapshot once the last (empty) page has been seen, so a
//! failure halfway leaves the previous snapshot authoritative.

use moola_liquidator_api::{LoanBookSource, SubgraphError};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::position::UserPosition;
use crate::scheduler::{SchedulerStats, SequentialScheduler};

/// Rows requested per subgraph page.
pub const PAGE_SIZE: usize = 1000;

/// Deadline for one full refresh, all pages included.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one full loan-book refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Rows returned across all pages
    pub raw_rows: usize,
    /// Pages requested, including the final empty one
    pub pages: usize,
    /// Positions kept (valid id, non-empty debt)
    pub positions: usize,
    /// Rows whose id is not a borrower address
    pub invalid_rows: usize,
}

/// Periodically refreshed snapshot of all indebted users.
pub struct LoanBookFetcher {
    source: Arc<dyn LoanBookSource>,
    period: Duration,
    timeout: Duration,
    page_size: usize,
    snapshot: RwLock<Arc<Vec<UserPosition>>>,
    scheduler: Mutex<Option<SequentialScheduler>>,
}

impl LoanBookFetcher {
    pub fn new(source: Arc<dyn LoanBookSource>, period: Duration) -> Self {
        Self {
            source,
            period,
            timeout: DEFAULT_FETCH_TIMEOUT,
            page_size: PAGE_SIZE,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            scheduler: Mutex::new(None),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `fetch_all` bounded by the refresh deadline. A refresh abandoned at
    /// the deadline leaves the previous snapshot in place.
    pub async fn refresh(&self) -> Result<FetchReport, SubgraphError> {
        tokio::time::timeout(self.timeout, self.fetch_all())
            .await
            .map_err(|_| SubgraphError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            })?
    }

    /// Fetch every page and swap in the new snapshot.
    pub async fn fetch_all(&self) -> Result<FetchReport, SubgraphError> {
        let start = Instant::now();
        let mut report = FetchReport::default();
        let mut positions = Vec::new();
        let mut cursor = String::new();

        loop {
            let page = self.source.fetch_users_page(&cursor, self.page_size).await?;
            report.pages += 1;

            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id.clone();
            report.raw_rows += page.len();

            for row in &page {
                match UserPosition::from_subgraph(row) {
                    Some(position) if position.has_debt() => positions.push(position),
                    Some(_) => {}
                    None => {
                        report.invalid_rows += 1;
                        debug!(id = %row.id, "Skipping row with invalid user id");
                    }
                }
            }

            debug!(page = report.pages, rows = page.len(), cursor = %cursor, "Fetched loan book page");
        }

        report.positions = positions.len();
        *self.snapshot.write() = Arc::new(positions);

        info!(
            raw_rows = report.raw_rows,
            positions = report.positions,
            pages = report.pages,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loan book refreshed"
        );
        Ok(report)
    }

    /// Fetch once, then keep refreshing every period.
    pub async fn start(self: &Arc<Self>) {
        if self.is_running() {
            return;
        }
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "Initial loan book fetch failed");
        }

        let this = Arc::clone(self);
        let scheduler = SequentialScheduler::start("loan_book", self.period, move || {
            let this = this.clone();
            async move {
                this.refresh().await?;
                Ok::<_, anyhow::Error>(())
            }
        });
        *self.scheduler.lock() = Some(scheduler);
    }

    /// Stop refreshing; the last snapshot stays readable.
    pub fn stop(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.lock().is_some()
    }

    /// Current snapshot of indebted users.
    pub fn positions(&self) -> Arc<Vec<UserPosition>> {
        self.snapshot.read().clone()
    }

    pub fn stats(&self) -> Option<SchedulerStats> {
        self.scheduler.lock().as_ref().map(|s| s.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use moola_liquidator_api::{ReserveInfo, SubgraphUser, UserReserve};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn user_id(n: usize) -> String {
        format!("{:#042x}", n + 1)
    }

    fn reserve() -> UserReserve {
        UserReserve {
            amount: U256::from(1u64),
            reserve: ReserveInfo {
                name: String::new(),
                underlying_asset: Address::repeat_byte(0x76),
                symbol: "cUSD".to_string(),
                decimals: 18,
                liquidation_threshold_bps: 8000,
                liquidation_bonus_bps: 10500,
            },
        }
    }

    /// Serves fixed page sizes; every third user has no debt.
    struct PagedSource {
        pages: Vec<usize>,
        fail_on_call: Option<usize>,
        cursors: Mutex<Vec<String>>,
    }

    impl PagedSource {
        fn new(pages: Vec<usize>) -> Self {
            Self {
                pages,
                fail_on_call: None,
                cursors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LoanBookSource for PagedSource {
        async fn fetch_users_page(
            &self,
            cursor: &str,
            page_size: usize,
        ) -> Result<Vec<SubgraphUser>, SubgraphError> {
            let call = {
                let mut cursors = self.cursors.lock();
                cursors.push(cursor.to_string());
                cursors.len() - 1
            };
            if self.fail_on_call == Some(call) {
                return Err(SubgraphError::Query("indexer unavailable".to_string()));
            }

            let offset: usize = self.pages.iter().take(call).sum();
            let size = self.pages.get(call).copied().unwrap_or(0);
            assert!(size <= page_size);

            Ok((offset..offset + size)
                .map(|n| SubgraphUser {
                    id: user_id(n),
                    collateral_reserve: vec![reserve()],
                    borrow_reserve: if n % 3 == 2 { vec![] } else { vec![reserve()] },
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_paginates_until_empty_page() {
        let source = Arc::new(PagedSource::new(vec![1000, 1000, 437, 0]));
        let fetcher = LoanBookFetcher::new(source.clone(), Duration::from_secs(15));

        let report = fetcher.fetch_all().await.unwrap();

        assert_eq!(report.raw_rows, 2437);
        assert_eq!(report.pages, 4);
        assert_eq!(report.invalid_rows, 0);
        // users 2, 5, 8, ... carry no debt
        let expected = (0..2437).filter(|n| n % 3 != 2).count();
        assert_eq!(report.positions, expected);
        assert_eq!(fetcher.positions().len(), expected);
        assert!(fetcher.positions().iter().all(|p| p.has_debt()));

        let cursors = source.cursors.lock().clone();
        assert_eq!(cursors, vec![String::new(), user_id(999), user_id(1999), user_id(2436)]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let fetcher = LoanBookFetcher::new(
            Arc::new(PagedSource::new(vec![10, 0])),
            Duration::from_secs(15),
        );
        fetcher.fetch_all().await.unwrap();
        let before = fetcher.positions();
        assert!(!before.is_empty());

        let failing = PagedSource {
            fail_on_call: Some(1),
            ..PagedSource::new(vec![1000, 1000, 0])
        };
        let fetcher = LoanBookFetcher {
            source: Arc::new(failing),
            ..fetcher
        };

        assert!(fetcher.fetch_all().await.is_err());
        assert_eq!(fetcher.positions(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop() {
        let fetcher = Arc::new(LoanBookFetcher::new(
            Arc::new(PagedSource::new(vec![5, 0])),
            Duration::from_secs(15),
        ));

        fetcher.start().await;
        assert!(fetcher.is_running());
        assert_eq!(fetcher.positions().len(), 4);

        fetcher.stop();
        fetcher.stop();
        assert!(!fetcher.is_running());
        assert_eq!(fetcher.positions().len(), 4);
    }

    /// Never answers its first request; serves one small page afterwards.
    struct StallingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LoanBookSource for StallingSource {
        async fn fetch_users_page(
            &self,
            cursor: &str,
            _page_size: usize,
        ) -> Result<Vec<SubgraphUser>, SubgraphError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
            }
            if !cursor.is_empty() {
                return Ok(vec![]);
            }
            Ok(vec![SubgraphUser {
                id: user_id(0),
                collateral_reserve: vec![reserve()],
                borrow_reserve: vec![reserve()],
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_fetch_does_not_block_later_refreshes() {
        let fetcher = Arc::new(
            LoanBookFetcher::new(
                Arc::new(StallingSource {
                    calls: AtomicUsize::new(0),
                }),
                Duration::from_secs(15),
            )
            .with_timeout(Duration::from_secs(5)),
        );

        // The initial fetch is abandoned at the deadline
        tokio::time::timeout(Duration::from_secs(60), fetcher.start())
            .await
            .expect("start() should return once the fetch deadline passes");
        assert!(fetcher.is_running());
        assert!(fetcher.positions().is_empty());

        // The first scheduled refresh still runs
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(fetcher.positions().len(), 1);
        let stats = fetcher.stats().unwrap();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.skipped, 0);

        fetcher.stop();
    }
}
