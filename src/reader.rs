//! Read-only metrics access
//!
//! Thin read handle over the metrics store, shared with the HTTP API.

use crate::store::{ContractMetrics, MetricsSnapshot, MetricsStore};
use alloy_primitives::Address;
use anyhow::Result;
use std::sync::Arc;

/// Read-only handle over the metrics store.
///
/// Cheap to clone; every clone reads the same underlying store.
#[derive(Clone)]
pub struct MetricsReader {
    store: Arc<dyn MetricsStore>,
}

impl MetricsReader {
    /// Create a new reader over `store`.
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    /// Every contract aggregate plus the global unique caller count.
    pub fn all_metrics(&self) -> Result<MetricsSnapshot> {
        self.store.all_metrics()
    }

    /// One contract's aggregate plus its unique caller count.
    pub fn contract_metrics(&self, contract: Address) -> Result<ContractMetrics> {
        self.store.contract_metrics(contract)
    }
}
