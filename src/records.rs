//! Record types for tracked contract activity
//!
//! These structs represent the data stored in the metrics store.
//! They use postcard for binary serialization, which is compact and deterministic.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// A single observed call to a tracked contract.
///
/// Records are immutable once committed and feed the unique-caller counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Transaction hash
    pub tx_hash: B256,
    /// Block the transaction was included in
    pub block_height: u64,
    /// The tracked contract that was called
    pub contract_address: Address,
    /// Address that sent the transaction
    pub caller_address: Address,
    /// Native value transferred, in wei
    pub amount: U256,
    /// Block timestamp (Unix epoch seconds)
    pub timestamp: u64,
}

/// Running metrics for one tracked contract.
///
/// Maintained by delta-merging committed windows, never recomputed from the
/// record log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAggregate {
    /// Number of calls observed
    pub call_count: u64,
    /// Sum of transferred value across all calls, in wei
    pub total_amount: U256,
    /// Chain counter, written as 1 when the row is created and left alone
    /// by later merges
    pub call_chains: u64,
}

impl ContractAggregate {
    /// Fold one window's deltas into an aggregate.
    ///
    /// A missing aggregate is created with the deltas as its initial values
    /// and `call_chains` set to 1. An existing aggregate keeps its
    /// `call_chains` untouched.
    pub fn merged(existing: Option<Self>, delta_calls: u64, delta_amount: U256) -> Self {
        match existing {
            Some(agg) => Self {
                call_count: agg.call_count.saturating_add(delta_calls),
                total_amount: agg.total_amount.saturating_add(delta_amount),
                call_chains: agg.call_chains,
            },
            None => Self {
                call_count: delta_calls,
                total_amount: delta_amount,
                call_chains: 1,
            },
        }
    }
}
