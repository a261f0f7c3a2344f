//! Explorer API client
//!
//! Fetches the chain head and per-contract transaction windows from a
//! Blockscout/Etherscan-compatible HTTP API. This is the production
//! implementation of [`ChainDataSource`].

use crate::records::CallRecord;
use crate::source::{ChainDataSource, SourceError};
use crate::types::{calls_from_entries, BlockNumberResponse, TxListResponse, TxListResult};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// HTTP client for an explorer account API.
pub struct ExplorerClient {
    client: reqwest::Client,
    url: String,
}

impl ExplorerClient {
    /// Create a new explorer client with the given per-request timeout.
    pub fn new(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(&self.url)
            .query(query)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| SourceError::Unavailable(format!("bad status: {}", e)))?;

        response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("invalid JSON: {}", e)))
    }
}

#[async_trait]
impl ChainDataSource for ExplorerClient {
    async fn latest_height(&self) -> Result<u64, SourceError> {
        let query = [
            ("module", "block".to_string()),
            ("action", "eth_block_number".to_string()),
        ];
        let response: BlockNumberResponse = self.get_json(&query).await?;
        parse_height(&response.result)
    }

    async fn fetch_calls(
        &self,
        contract: Address,
        from_height: u64,
        to_height: u64,
    ) -> Result<Vec<CallRecord>, SourceError> {
        let query = [
            ("module", "account".to_string()),
            ("action", "txlist".to_string()),
            ("address", format!("0x{:x}", contract)),
            ("startblock", from_height.to_string()),
            ("endblock", to_height.to_string()),
            ("sort", "asc".to_string()),
        ];
        let response: TxListResponse = self.get_json(&query).await?;

        // Status "0" also covers the benign "No transactions found" case,
        // which still carries an (empty) entry array.
        if response.status != "1" {
            debug!(
                "txlist status {} for 0x{:x}: {}",
                response.status, contract, response.message
            );
        }

        match response.result {
            TxListResult::Entries(entries) => calls_from_entries(entries, contract),
            TxListResult::Message(msg) => Err(SourceError::Unavailable(format!(
                "provider error: {}",
                msg
            ))),
        }
    }
}

/// Parse a block height that may be hex ("0x10d4f") or decimal ("68943").
fn parse_height(raw: &str) -> Result<u64, SourceError> {
    let parsed = match raw.strip_prefix("0x") {
        Some(digits) => u64::from_str_radix(digits, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|_| SourceError::Malformed(format!("bad block height: {:?}", raw)))
}
