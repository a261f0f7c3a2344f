//! Key encoding and decoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! This ensures deterministic, lexicographically ordered keys in RocksDB.

use alloy_primitives::{Address, B256};
use anyhow::Result;

/// Encode a progress key.
///
/// Format: byte 'P' (0x50) + contract address (20 bytes)
/// Total length: 21 bytes
pub fn encode_progress_key(contract: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'P');
    key.extend_from_slice(contract.as_slice());
    key
}

/// Encode a call record key.
///
/// Format: byte 'C' (0x43) + contract address (20 bytes)
///         + block_height (8 bytes, big-endian) + tx_hash (32 bytes)
/// Total length: 61 bytes
///
/// Big-endian heights keep one contract's records ordered by height, and the
/// trailing hash makes the key unique per (contract, transaction).
pub fn encode_call_key(contract: Address, height: u64, tx_hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(61);
    key.push(b'C');
    key.extend_from_slice(contract.as_slice());
    key.extend_from_slice(&height.to_be_bytes());
    key.extend_from_slice(tx_hash.as_slice());
    key
}

/// Decode a call record key back into (contract, height, tx_hash).
pub fn decode_call_key(key: &[u8]) -> Result<(Address, u64, B256)> {
    if key.len() != 61 {
        anyhow::bail!("Call key must be 61 bytes, got {}", key.len());
    }
    if key[0] != b'C' {
        anyhow::bail!("Call key must start with 'C', got {:#04x}", key[0]);
    }
    let contract = Address::from_slice(&key[1..21]);
    let height = u64::from_be_bytes(key[21..29].try_into()?);
    let tx_hash = B256::from_slice(&key[29..61]);
    Ok((contract, height, tx_hash))
}

/// Encode an aggregate key.
///
/// Format: byte 'G' (0x47) + contract address (20 bytes)
/// Total length: 21 bytes
pub fn encode_aggregate_key(contract: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'G');
    key.extend_from_slice(contract.as_slice());
    key
}

/// Decode an aggregate key back into the contract address.
pub fn decode_aggregate_key(key: &[u8]) -> Result<Address> {
    if key.len() != 21 {
        anyhow::bail!("Aggregate key must be 21 bytes, got {}", key.len());
    }
    if key[0] != b'G' {
        anyhow::bail!("Aggregate key must start with 'G', got {:#04x}", key[0]);
    }
    Ok(Address::from_slice(&key[1..21]))
}
