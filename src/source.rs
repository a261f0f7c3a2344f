//! Chain data source abstraction
//!
//! The poller talks to the outside world through this trait, so the HTTP
//! explorer client can be swapped for mocks in tests.

use crate::records::CallRecord;
use alloy_primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a chain data source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The provider could not be reached or reported an internal failure.
    /// Retryable: the same window can be fetched again next cycle.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// The provider responded with data that failed validation. The whole
    /// window is rejected; nothing from it may be committed.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A provider of chain data for tracked contracts.
///
/// Implementations return only successful, non-zero value calls addressed to
/// the contract; filtering happens behind this boundary.
#[async_trait]
pub trait ChainDataSource: Send + Sync {
    /// Current chain head height.
    async fn latest_height(&self) -> Result<u64, SourceError>;

    /// All calls to `contract` included at heights in
    /// `[from_height, to_height]`.
    async fn fetch_calls(
        &self,
        contract: Address,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<CallRecord>, SourceError>;
}
