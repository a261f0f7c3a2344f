//! Explorer API wire types
//!
//! Type definitions for the Blockscout/Etherscan-style account API.
//! Every field arrives as a string; conversion into domain records happens
//! here so nothing unvalidated crosses into the store.

use crate::records::CallRecord;
use crate::source::SourceError;
use alloy_primitives::{Address, B256, U256};
use serde::Deserialize;

/// Envelope returned by `module=block&action=eth_block_number`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockNumberResponse {
    /// Head height as a hex string (e.g. "0x1a2b3c")
    pub result: String,
}

/// Envelope returned by `module=account&action=txlist`.
#[derive(Debug, Clone, Deserialize)]
pub struct TxListResponse {
    /// "1" on success, "0" for empty results or provider errors
    pub status: String,
    /// Human-readable status ("OK", "No transactions found", ...)
    pub message: String,
    /// Transaction entries, or an error string from the provider
    pub result: TxListResult,
}

/// Result field of a txlist response.
///
/// Providers return an entry array on success (empty when nothing matched)
/// and a bare string describing the failure when the query was rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TxListResult {
    Entries(Vec<TxEntry>),
    Message(String),
}

/// One transaction entry from a txlist response.
///
/// Kept intentionally liberal: only the fields needed for filtering and
/// conversion are required, and the hash field name differs across
/// providers ("hash" vs "transactionHash").
#[derive(Debug, Clone, Deserialize)]
pub struct TxEntry {
    /// Transaction hash
    #[serde(default)]
    pub hash: Option<String>,
    /// Alternate hash field used by some providers
    #[serde(rename = "transactionHash", default)]
    pub transaction_hash: Option<String>,
    /// Block number, decimal string
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    /// Block timestamp, decimal string (Unix epoch seconds)
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    /// Sender address
    pub from: String,
    /// Recipient address, empty or absent for contract creation
    #[serde(default)]
    pub to: Option<String>,
    /// Created contract address, empty unless this is a creation
    #[serde(rename = "contractAddress", default)]
    pub contract_address: Option<String>,
    /// Value transferred in wei, decimal string
    pub value: String,
    /// "0" when the transaction succeeded
    #[serde(rename = "isError")]
    pub is_error: String,
}

impl TxEntry {
    /// Whether this entry is a successful, value-bearing call addressed to
    /// the tracked contract. `contract_hex` is the lower-case unprefixed
    /// hex form of the contract address.
    fn is_relevant(&self, contract_hex: &str) -> bool {
        if self.is_error != "0" {
            return false;
        }
        // Zero-value calls (role grants and the like) are not tracked
        if self.value == "0" {
            return false;
        }
        same_address(self.to.as_deref().unwrap_or(""), contract_hex)
            || same_address(self.contract_address.as_deref().unwrap_or(""), contract_hex)
    }

    /// Convert into a validated [`CallRecord`] for `contract`.
    pub fn into_call_record(self, contract: Address) -> Result<CallRecord, SourceError> {
        let hash = self
            .hash
            .as_deref()
            .or(self.transaction_hash.as_deref())
            .ok_or_else(|| {
                SourceError::Malformed("transaction entry missing hash".to_string())
            })?;
        let tx_hash = parse_tx_hash(hash)?;
        let block_height = self.block_number.parse::<u64>().map_err(|_| {
            SourceError::Malformed(format!("bad block number: {:?}", self.block_number))
        })?;
        let timestamp = self.time_stamp.parse::<u64>().map_err(|_| {
            SourceError::Malformed(format!("bad timestamp: {:?}", self.time_stamp))
        })?;
        let caller_address = parse_entry_address(&self.from)?;
        let amount = U256::from_str_radix(&self.value, 10)
            .map_err(|_| SourceError::Malformed(format!("bad value: {:?}", self.value)))?;

        Ok(CallRecord {
            tx_hash,
            block_height,
            contract_address: contract,
            caller_address,
            amount,
            timestamp,
        })
    }
}

/// Filter a txlist window down to calls on `contract` and validate them.
///
/// Keeps entries that succeeded, moved a non-zero value, and were addressed
/// to the contract (as recipient or as the created contract). A relevant
/// entry that fails validation rejects the whole window.
pub fn calls_from_entries(
    entries: Vec<TxEntry>,
    contract: Address,
) -> Result<Vec<CallRecord>, SourceError> {
    let contract_hex = format!("{:x}", contract);
    let mut records = Vec::new();
    for entry in entries {
        if !entry.is_relevant(&contract_hex) {
            continue;
        }
        records.push(entry.into_call_record(contract)?);
    }
    Ok(records)
}

fn same_address(field: &str, contract_hex: &str) -> bool {
    let field = field.strip_prefix("0x").unwrap_or(field);
    field.eq_ignore_ascii_case(contract_hex)
}

/// Parse a 32-byte transaction hash from an explorer hex string.
fn parse_tx_hash(s: &str) -> Result<B256, SourceError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|_| SourceError::Malformed(format!("bad transaction hash: {:?}", s)))?;
    if bytes.len() != 32 {
        return Err(SourceError::Malformed(format!(
            "bad transaction hash: {:?}",
            s
        )));
    }
    Ok(B256::from_slice(&bytes))
}

/// Parse a 20-byte address from an explorer hex string.
fn parse_entry_address(s: &str) -> Result<Address, SourceError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|_| SourceError::Malformed(format!("bad address: {:?}", s)))?;
    if bytes.len() != 20 {
        return Err(SourceError::Malformed(format!("bad address: {:?}", s)));
    }
    Ok(Address::from_slice(&bytes))
}
