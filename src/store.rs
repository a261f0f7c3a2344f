//! MetricsStore trait and RocksDB implementation
//!
//! Provides a persistent store for tracked-contract activity: per-contract
//! progress heights, the call record log, and running aggregates.
//! Uses RocksDB with column families for efficient organization.

use crate::keys::{
    decode_aggregate_key, decode_call_key, encode_aggregate_key, encode_call_key,
    encode_progress_key,
};
use crate::records::{CallRecord, ContractAggregate};
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::HashSet;
use std::path::Path;

/// Trait defining the interface for tracked-contract metrics storage.
///
/// All methods return Results for proper error handling. Writes come from a
/// single sequential poller; reads may happen concurrently from any task.
pub trait MetricsStore: Send + Sync {
    /// Get the last processed block height for a contract.
    ///
    /// Returns None if the contract has never been tracked. Height 0 is a
    /// real value, distinct from absent.
    fn get_last_height(&self, contract: Address) -> Result<Option<u64>>;

    /// Set the last processed block height for a contract.
    ///
    /// Unconditional upsert: the last write wins. Callers that need
    /// monotonic progress enforce it themselves.
    fn set_last_height(&self, contract: Address, height: u64) -> Result<()>;

    /// Atomically commit one fetch window for a contract.
    ///
    /// Inserts every record, folds the window's deltas into the contract
    /// aggregate, and advances progress to `window_end` in a single write
    /// batch. Either all of it lands or none of it does. An empty window
    /// still advances progress but creates no aggregate.
    fn commit_window(
        &self,
        contract: Address,
        window_end: u64,
        records: &[CallRecord],
    ) -> Result<()>;

    /// Get the aggregate for a contract.
    fn get_aggregate(&self, contract: Address) -> Result<Option<ContractAggregate>>;

    /// Get call records for a contract in an inclusive height range.
    fn records_in_range(
        &self,
        contract: Address,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<CallRecord>>;

    /// Read every aggregate plus the global unique caller count.
    ///
    /// The whole read happens against one point-in-time snapshot, so a
    /// concurrently committing window is either fully visible or not at all.
    fn all_metrics(&self) -> Result<MetricsSnapshot>;

    /// Read one contract's aggregate plus its unique caller count, from one
    /// point-in-time snapshot.
    fn contract_metrics(&self, contract: Address) -> Result<ContractMetrics>;
}

/// Point-in-time view of every tracked contract's aggregate.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// (contract, aggregate) pairs in key order.
    pub contracts: Vec<(Address, ContractAggregate)>,
    /// Distinct caller addresses across every stored call record.
    pub total_user_count: u64,
}

/// Point-in-time view of a single contract's metrics.
#[derive(Debug, Clone)]
pub struct ContractMetrics {
    /// The aggregate, if the contract has any committed activity.
    pub aggregate: Option<ContractAggregate>,
    /// Distinct caller addresses across the contract's call records.
    pub user_count: u64,
}

/// RocksDB-backed implementation of MetricsStore.
///
/// Uses column families to organize different types of data:
/// - progress: contract -> last processed height
/// - calls: append-only call record log, keyed by (contract, height, hash)
/// - aggregates: contract -> running metrics
pub struct RocksMetricsStore {
    db: DB,
}

impl RocksMetricsStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families = vec![
            ColumnFamilyDescriptor::new("progress", Options::default()),
            ColumnFamilyDescriptor::new("calls", Options::default()),
            ColumnFamilyDescriptor::new("aggregates", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }
}

impl MetricsStore for RocksMetricsStore {
    fn get_last_height(&self, contract: Address) -> Result<Option<u64>> {
        let cf = self.get_cf("progress")?;
        let key = encode_progress_key(contract);
        match self.db.get_cf(cf, &key).context("Failed to get progress")? {
            Some(bytes) => {
                if bytes.len() != 8 {
                    anyhow::bail!("Progress height must be 8 bytes (u64), got {}", bytes.len());
                }
                Ok(Some(u64::from_be_bytes(
                    bytes.try_into().expect("8 bytes for u64"),
                )))
            }
            None => Ok(None),
        }
    }

    fn set_last_height(&self, contract: Address, height: u64) -> Result<()> {
        let cf = self.get_cf("progress")?;
        let key = encode_progress_key(contract);
        self.db
            .put_cf(cf, &key, height.to_be_bytes())
            .context("Failed to set progress")?;
        Ok(())
    }

    fn commit_window(
        &self,
        contract: Address,
        window_end: u64,
        records: &[CallRecord],
    ) -> Result<()> {
        let calls_cf = self.get_cf("calls")?;
        let aggregates_cf = self.get_cf("aggregates")?;
        let progress_cf = self.get_cf("progress")?;

        let mut batch = WriteBatch::default();

        for record in records {
            let key = encode_call_key(contract, record.block_height, record.tx_hash);
            let value =
                postcard::to_allocvec(record).context("Failed to serialize call record")?;
            batch.put_cf(calls_cf, &key, &value);
        }

        if !records.is_empty() {
            let existing = self.get_aggregate(contract)?;
            let delta_amount = records
                .iter()
                .fold(U256::ZERO, |sum, r| sum.saturating_add(r.amount));
            let merged =
                ContractAggregate::merged(existing, records.len() as u64, delta_amount);
            let value =
                postcard::to_allocvec(&merged).context("Failed to serialize aggregate")?;
            batch.put_cf(aggregates_cf, &encode_aggregate_key(contract), &value);
        }

        batch.put_cf(
            progress_cf,
            &encode_progress_key(contract),
            window_end.to_be_bytes(),
        );

        self.db
            .write(batch)
            .context("Failed to commit window batch")?;
        Ok(())
    }

    fn get_aggregate(&self, contract: Address) -> Result<Option<ContractAggregate>> {
        let cf = self.get_cf("aggregates")?;
        let key = encode_aggregate_key(contract);
        match self.db.get_cf(cf, &key).context("Failed to get aggregate")? {
            Some(bytes) => {
                let aggregate =
                    postcard::from_bytes(&bytes).context("Failed to deserialize aggregate")?;
                Ok(Some(aggregate))
            }
            None => Ok(None),
        }
    }

    fn records_in_range(
        &self,
        contract: Address,
        start_height: u64,
        end_height: u64,
    ) -> Result<Vec<CallRecord>> {
        let cf = self.get_cf("calls")?;
        let start_key = encode_call_key(contract, start_height, B256::ZERO);
        let end_key = encode_call_key(contract, end_height.saturating_add(1), B256::ZERO); // Exclusive end

        let mut records = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start_key, Direction::Forward));

        for item in iter {
            let (key, value) = item.context("Failed to read iterator")?;

            // Stop once we've gone past the end key
            if key.as_ref() >= end_key.as_slice() {
                break;
            }

            // Only include records for this contract (safety check)
            let (key_contract, _, _) =
                decode_call_key(&key).context("Failed to decode call key")?;
            if key_contract != contract {
                continue;
            }

            let record: CallRecord =
                postcard::from_bytes(&value).context("Failed to deserialize call record")?;
            records.push(record);
        }

        Ok(records)
    }

    fn all_metrics(&self) -> Result<MetricsSnapshot> {
        let aggregates_cf = self.get_cf("aggregates")?;
        let calls_cf = self.get_cf("calls")?;

        // One snapshot for both scans, so readers never see a half-applied
        // commit between the aggregates and the record log.
        let snapshot = self.db.snapshot();

        let mut contracts = Vec::new();
        for item in snapshot.iterator_cf(aggregates_cf, IteratorMode::Start) {
            let (key, value) = item.context("Failed to read iterator")?;
            let contract =
                decode_aggregate_key(&key).context("Failed to decode aggregate key")?;
            let aggregate: ContractAggregate =
                postcard::from_bytes(&value).context("Failed to deserialize aggregate")?;
            contracts.push((contract, aggregate));
        }

        let mut callers: HashSet<Address> = HashSet::new();
        for item in snapshot.iterator_cf(calls_cf, IteratorMode::Start) {
            let (_, value) = item.context("Failed to read iterator")?;
            let record: CallRecord =
                postcard::from_bytes(&value).context("Failed to deserialize call record")?;
            callers.insert(record.caller_address);
        }

        Ok(MetricsSnapshot {
            contracts,
            total_user_count: callers.len() as u64,
        })
    }

    fn contract_metrics(&self, contract: Address) -> Result<ContractMetrics> {
        let aggregates_cf = self.get_cf("aggregates")?;
        let calls_cf = self.get_cf("calls")?;

        let snapshot = self.db.snapshot();

        let aggregate = match snapshot
            .get_cf(aggregates_cf, encode_aggregate_key(contract))
            .context("Failed to get aggregate")?
        {
            Some(bytes) => Some(
                postcard::from_bytes(&bytes).context("Failed to deserialize aggregate")?,
            ),
            None => None,
        };

        let start_key = encode_call_key(contract, 0, B256::ZERO);
        let mut callers: HashSet<Address> = HashSet::new();
        for item in snapshot.iterator_cf(calls_cf, IteratorMode::From(&start_key, Direction::Forward))
        {
            let (key, value) = item.context("Failed to read iterator")?;
            let (key_contract, _, _) =
                decode_call_key(&key).context("Failed to decode call key")?;
            if key_contract != contract {
                // Keys are grouped by contract, so we've left this
                // contract's range.
                break;
            }
            let record: CallRecord =
                postcard::from_bytes(&value).context("Failed to deserialize call record")?;
            callers.insert(record.caller_address);
        }

        Ok(ContractMetrics {
            aggregate,
            user_count: callers.len() as u64,
        })
    }
}
