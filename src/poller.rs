//! Main poll loop
//!
//! Orchestrates polling the chain head, fetching per-contract call windows
//! from the data source, and committing them to the metrics store.

use crate::source::ChainDataSource;
use crate::store::MetricsStore;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Height seeded for contracts that have never been tracked. Window fetches
/// start at progress + 1, so the genesis block is never scanned.
pub const PROGRESS_FLOOR: u64 = 1;

/// Failed cycles in a row tolerated before the poll loop gives up.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Polls the chain data source and folds new call activity into the store.
pub struct Poller {
    store: Arc<dyn MetricsStore>,
    source: Arc<dyn ChainDataSource>,
    contracts: Vec<Address>,
    poll_interval: Duration,
    head_margin: u64,
}

impl Poller {
    /// Create a new poller.
    ///
    /// `head_margin` controls how far the chain head must move past a
    /// contract's progress before a window is fetched. With a margin of 1,
    /// a single new block is left to settle until a later cycle.
    pub fn new(
        store: Arc<dyn MetricsStore>,
        source: Arc<dyn ChainDataSource>,
        contracts: Vec<Address>,
        poll_interval: Duration,
        head_margin: u64,
    ) -> Self {
        Self {
            store,
            source,
            contracts,
            poll_interval,
            head_margin,
        }
    }

    /// Seed progress for contracts that have never been tracked.
    ///
    /// Contracts with existing progress are left untouched, so a restart
    /// resumes exactly where the previous run stopped.
    pub fn initialize(&self) -> Result<()> {
        info!("Initializing poller...");

        for contract in &self.contracts {
            let existing = self
                .store
                .get_last_height(*contract)
                .with_context(|| format!("Failed to read progress for {:?}", contract))?;

            if existing.is_none() {
                self.store
                    .set_last_height(*contract, PROGRESS_FLOOR)
                    .with_context(|| format!("Failed to seed progress for {:?}", contract))?;
                info!("Seeded progress for {:?} at height {}", contract, PROGRESS_FLOOR);
            }
        }

        info!("Tracking {} contracts", self.contracts.len());
        Ok(())
    }

    /// Run one poll cycle over all tracked contracts.
    ///
    /// Source failures (head or per-contract fetch) are logged and skipped
    /// so one flaky contract cannot stall the rest. Storage failures abort
    /// the cycle and bubble up to [`run`](Self::run).
    pub async fn poll_cycle(&self) -> Result<()> {
        let head = match self.source.latest_height().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Failed to fetch chain head, skipping cycle: {}", e);
                return Ok(());
            }
        };

        for contract in &self.contracts {
            let last = self
                .store
                .get_last_height(*contract)
                .with_context(|| format!("Failed to read progress for {:?}", contract))?
                .unwrap_or(PROGRESS_FLOOR);

            // Head has not moved far enough past this contract yet
            if head <= last.saturating_add(self.head_margin) {
                debug!("{:?} up to date: progress={}, head={}", contract, last, head);
                continue;
            }

            let from = last + 1;
            let records = match self.source.fetch_calls(*contract, from, head).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        "Failed to fetch calls for {:?} ({}..={}): {}",
                        contract, from, head, e
                    );
                    continue;
                }
            };

            // A record outside the requested window means the source gave
            // us something inconsistent; commit none of it.
            if let Some(bad) = records
                .iter()
                .find(|r| r.block_height <= last || r.block_height > head)
            {
                warn!(
                    "Dropping window for {:?}: record at height {} outside {}..={}",
                    contract, bad.block_height, from, head
                );
                continue;
            }

            self.store
                .commit_window(*contract, head, &records)
                .with_context(|| format!("Failed to commit window for {:?}", contract))?;

            info!(
                "Committed {} calls for {:?}, progress {} -> {}",
                records.len(),
                contract,
                last,
                head
            );
        }

        Ok(())
    }

    /// Run the poll loop until a fatal storage failure.
    ///
    /// Sleeps `poll_interval` between cycles. A failed cycle is retried;
    /// after [`MAX_CONSECUTIVE_FAILURES`] failed cycles in a row the loop
    /// gives up and returns the last error.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting poll loop ({} contracts, every {:?})",
            self.contracts.len(),
            self.poll_interval
        );

        let mut consecutive_failures: u32 = 0;

        loop {
            match self.poll_cycle().await {
                Ok(()) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        return Err(e.context("Giving up after repeated cycle failures"));
                    }
                    error!(
                        "Poll cycle failed ({} of {} tolerated): {:?}",
                        consecutive_failures, MAX_CONSECUTIVE_FAILURES, e
                    );
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::CallRecord;
    use crate::source::SourceError;
    use crate::store::{ContractMetrics, MetricsSnapshot, RocksMetricsStore};
    use alloy_primitives::{B256, U256};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted data source. Returns its canned records for any requested
    /// window, so window validation is exercised by the poller itself.
    struct MockSource {
        head: Option<u64>,
        responses: HashMap<Address, Vec<CallRecord>>,
        failing: Vec<Address>,
        fetches: Mutex<Vec<(Address, u64, u64)>>,
    }

    impl MockSource {
        fn new(head: u64) -> Self {
            Self {
                head: Some(head),
                responses: HashMap::new(),
                failing: Vec::new(),
                fetches: Mutex::new(Vec::new()),
            }
        }

        fn without_head() -> Self {
            Self {
                head: None,
                responses: HashMap::new(),
                failing: Vec::new(),
                fetches: Mutex::new(Vec::new()),
            }
        }

        fn with_calls(mut self, contract: Address, records: Vec<CallRecord>) -> Self {
            self.responses.insert(contract, records);
            self
        }

        fn with_failing(mut self, contract: Address) -> Self {
            self.failing.push(contract);
            self
        }

        fn fetch_log(&self) -> Vec<(Address, u64, u64)> {
            self.fetches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChainDataSource for MockSource {
        async fn latest_height(&self) -> Result<u64, SourceError> {
            self.head
                .ok_or_else(|| SourceError::Unavailable("no head".to_string()))
        }

        async fn fetch_calls(
            &self,
            contract: Address,
            from_height: u64,
            to_height: u64,
        ) -> Result<Vec<CallRecord>, SourceError> {
            self.fetches
                .lock()
                .unwrap()
                .push((contract, from_height, to_height));
            if self.failing.contains(&contract) {
                return Err(SourceError::Unavailable("fetch failed".to_string()));
            }
            Ok(self.responses.get(&contract).cloned().unwrap_or_default())
        }
    }

    /// Store wrapper that fails the next N commits, then delegates.
    struct FailingStore {
        inner: RocksMetricsStore,
        commit_failures: AtomicU32,
    }

    impl FailingStore {
        fn new(inner: RocksMetricsStore, failures: u32) -> Self {
            Self {
                inner,
                commit_failures: AtomicU32::new(failures),
            }
        }
    }

    impl MetricsStore for FailingStore {
        fn get_last_height(&self, contract: Address) -> Result<Option<u64>> {
            self.inner.get_last_height(contract)
        }

        fn set_last_height(&self, contract: Address, height: u64) -> Result<()> {
            self.inner.set_last_height(contract, height)
        }

        fn commit_window(
            &self,
            contract: Address,
            window_end: u64,
            records: &[CallRecord],
        ) -> Result<()> {
            let remaining = self.commit_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.commit_failures.store(remaining - 1, Ordering::SeqCst);
                anyhow::bail!("injected commit failure");
            }
            self.inner.commit_window(contract, window_end, records)
        }

        fn get_aggregate(&self, contract: Address) -> Result<Option<crate::records::ContractAggregate>> {
            self.inner.get_aggregate(contract)
        }

        fn records_in_range(
            &self,
            contract: Address,
            start_height: u64,
            end_height: u64,
        ) -> Result<Vec<CallRecord>> {
            self.inner.records_in_range(contract, start_height, end_height)
        }

        fn all_metrics(&self) -> Result<MetricsSnapshot> {
            self.inner.all_metrics()
        }

        fn contract_metrics(&self, contract: Address) -> Result<ContractMetrics> {
            self.inner.contract_metrics(contract)
        }
    }

    fn rocks_store() -> (Arc<RocksMetricsStore>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = RocksMetricsStore::open(temp_dir.path()).unwrap();
        (Arc::new(store), temp_dir)
    }

    fn call(contract: Address, caller: Address, height: u64, seq: u8, amount: u64) -> CallRecord {
        CallRecord {
            tx_hash: B256::repeat_byte(seq),
            block_height: height,
            contract_address: contract,
            caller_address: caller,
            amount: U256::from(amount),
            timestamp: 1_700_000_000 + height,
        }
    }

    fn poller(
        store: Arc<dyn MetricsStore>,
        source: Arc<dyn ChainDataSource>,
        contracts: Vec<Address>,
    ) -> Poller {
        Poller::new(store, source, contracts, Duration::from_millis(1), 1)
    }

    #[tokio::test]
    async fn test_bootstrap_and_first_window() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        let caller_a = Address::repeat_byte(0x0a);
        let caller_b = Address::repeat_byte(0x0b);

        let records = vec![
            call(contract, caller_a, 2, 1, 10),
            call(contract, caller_a, 50, 2, 20),
            call(contract, caller_b, 100, 3, 5),
        ];
        let source = Arc::new(MockSource::new(100).with_calls(contract, records));
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.initialize().unwrap();
        assert_eq!(store.get_last_height(contract).unwrap(), Some(PROGRESS_FLOOR));

        poller.poll_cycle().await.unwrap();

        // The window starts one past the seeded floor
        assert_eq!(source.fetch_log(), vec![(contract, 2, 100)]);
        assert_eq!(store.get_last_height(contract).unwrap(), Some(100));

        let aggregate = store.get_aggregate(contract).unwrap().unwrap();
        assert_eq!(aggregate.call_count, 3);
        assert_eq!(aggregate.total_amount, U256::from(35u64));
        assert_eq!(aggregate.call_chains, 1);

        let metrics = store.contract_metrics(contract).unwrap();
        assert_eq!(metrics.user_count, 2);
    }

    #[tokio::test]
    async fn test_repeat_cycle_without_new_blocks_changes_nothing() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        let caller = Address::repeat_byte(0x0a);

        let source = Arc::new(
            MockSource::new(100).with_calls(contract, vec![call(contract, caller, 50, 1, 10)]),
        );
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.initialize().unwrap();
        poller.poll_cycle().await.unwrap();
        let aggregate_after_first = store.get_aggregate(contract).unwrap();

        // Head has not moved; a second cycle must not fetch or change state
        poller.poll_cycle().await.unwrap();

        assert_eq!(source.fetch_log().len(), 1);
        assert_eq!(store.get_aggregate(contract).unwrap(), aggregate_after_first);
        assert_eq!(store.get_last_height(contract).unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_caught_up_contract_is_not_fetched() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        store.set_last_height(contract, 100).unwrap();

        let source = Arc::new(MockSource::new(100));
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.poll_cycle().await.unwrap();

        assert!(source.fetch_log().is_empty());
        assert_eq!(store.get_last_height(contract).unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_single_new_block_is_skipped() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        store.set_last_height(contract, 10).unwrap();

        // Head is only one past progress; the default margin of 1 skips it
        let source = Arc::new(MockSource::new(11));
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.poll_cycle().await.unwrap();

        assert!(source.fetch_log().is_empty());
        assert_eq!(store.get_last_height(contract).unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_head_margin_zero_fetches_single_block() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        let caller = Address::repeat_byte(0x0a);
        store.set_last_height(contract, 10).unwrap();

        let source =
            Arc::new(MockSource::new(11).with_calls(contract, vec![call(contract, caller, 11, 1, 7)]));
        let poller = Poller::new(
            store.clone(),
            source.clone(),
            vec![contract],
            Duration::from_millis(1),
            0,
        );

        poller.poll_cycle().await.unwrap();

        assert_eq!(source.fetch_log(), vec![(contract, 11, 11)]);
        assert_eq!(store.get_last_height(contract).unwrap(), Some(11));
        assert_eq!(store.get_aggregate(contract).unwrap().unwrap().call_count, 1);
    }

    #[tokio::test]
    async fn test_empty_window_advances_progress() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        store.set_last_height(contract, 1).unwrap();

        let source = Arc::new(MockSource::new(100));
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.poll_cycle().await.unwrap();

        assert_eq!(store.get_last_height(contract).unwrap(), Some(100));
        assert!(store.get_aggregate(contract).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_head_failure_skips_cycle() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        store.set_last_height(contract, 10).unwrap();

        let source = Arc::new(MockSource::without_head());
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.poll_cycle().await.unwrap();

        assert!(source.fetch_log().is_empty());
        assert_eq!(store.get_last_height(contract).unwrap(), Some(10));
    }

    #[tokio::test]
    async fn test_fetch_failure_isolates_contract() {
        let (store, _temp_dir) = rocks_store();
        let bad = Address::repeat_byte(0x11);
        let good = Address::repeat_byte(0x22);
        let caller = Address::repeat_byte(0x0a);

        let source = Arc::new(
            MockSource::new(50)
                .with_failing(bad)
                .with_calls(good, vec![call(good, caller, 5, 1, 10)]),
        );
        let poller = poller(store.clone(), source.clone(), vec![bad, good]);

        poller.initialize().unwrap();
        poller.poll_cycle().await.unwrap();

        // The failing contract keeps its seed and can be retried next cycle
        assert_eq!(store.get_last_height(bad).unwrap(), Some(PROGRESS_FLOOR));
        assert!(store.get_aggregate(bad).unwrap().is_none());

        assert_eq!(store.get_last_height(good).unwrap(), Some(50));
        assert_eq!(store.get_aggregate(good).unwrap().unwrap().call_count, 1);
    }

    #[tokio::test]
    async fn test_out_of_window_record_rejects_whole_window() {
        let (store, _temp_dir) = rocks_store();
        let contract = Address::repeat_byte(0xab);
        let caller = Address::repeat_byte(0x0a);

        // One valid record and one past the head; neither may land
        let records = vec![
            call(contract, caller, 50, 1, 10),
            call(contract, caller, 200, 2, 20),
        ];
        let source = Arc::new(MockSource::new(100).with_calls(contract, records));
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.initialize().unwrap();
        poller.poll_cycle().await.unwrap();

        assert_eq!(store.get_last_height(contract).unwrap(), Some(PROGRESS_FLOOR));
        assert!(store.get_aggregate(contract).unwrap().is_none());
        assert!(store.records_in_range(contract, 0, u64::MAX).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_then_retry_counts_once() {
        let temp_dir = TempDir::new().unwrap();
        let inner = RocksMetricsStore::open(temp_dir.path()).unwrap();
        let store = Arc::new(FailingStore::new(inner, 1));

        let contract = Address::repeat_byte(0xab);
        let caller = Address::repeat_byte(0x0a);
        let records = vec![
            call(contract, caller, 2, 1, 10),
            call(contract, caller, 50, 2, 20),
        ];
        let source = Arc::new(MockSource::new(100).with_calls(contract, records));
        let poller = poller(store.clone(), source.clone(), vec![contract]);

        poller.initialize().unwrap();

        // First cycle hits the injected failure; nothing may have landed
        assert!(poller.poll_cycle().await.is_err());
        assert_eq!(store.get_last_height(contract).unwrap(), Some(PROGRESS_FLOOR));
        assert!(store.get_aggregate(contract).unwrap().is_none());

        // Retry fetches the identical window and commits it exactly once
        poller.poll_cycle().await.unwrap();
        assert_eq!(
            source.fetch_log(),
            vec![(contract, 2, 100), (contract, 2, 100)]
        );
        let aggregate = store.get_aggregate(contract).unwrap().unwrap();
        assert_eq!(aggregate.call_count, 2);
        assert_eq!(aggregate.total_amount, U256::from(30u64));
        assert_eq!(store.get_last_height(contract).unwrap(), Some(100));
    }

    #[tokio::test]
    async fn test_initialize_preserves_existing_progress() {
        let (store, _temp_dir) = rocks_store();
        let resumed = Address::repeat_byte(0x11);
        let fresh = Address::repeat_byte(0x22);
        store.set_last_height(resumed, 42).unwrap();

        let source = Arc::new(MockSource::new(50));
        let poller = poller(store.clone(), source, vec![resumed, fresh]);

        poller.initialize().unwrap();

        assert_eq!(store.get_last_height(resumed).unwrap(), Some(42));
        assert_eq!(store.get_last_height(fresh).unwrap(), Some(PROGRESS_FLOOR));
    }

    #[tokio::test]
    async fn test_run_gives_up_after_repeated_store_failures() {
        let temp_dir = TempDir::new().unwrap();
        let inner = RocksMetricsStore::open(temp_dir.path()).unwrap();
        let store = Arc::new(FailingStore::new(inner, u32::MAX));

        let contract = Address::repeat_byte(0xab);
        let source = Arc::new(MockSource::new(100));
        let poller = poller(store, source, vec![contract]);

        poller.initialize().unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), poller.run())
            .await
            .expect("run should give up, not loop forever");
        assert!(result.is_err());
    }
}
