//! Configuration and contract list loading
//!
//! Handles loading the tracked contract list from a file.
//! Each line should contain one contract address in hex format.

use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Load the tracked contract list from a file.
///
/// Each line should contain one contract address in hex format (with or without 0x prefix).
/// Empty lines and lines starting with '#' are ignored. A contract listed
/// twice is kept once; the poller must process each contract at most once
/// per cycle.
///
/// # Example file format:
/// ```
// 0x34B842D0AcF830134D44075DCbcE43Ba04286c12
// 0xdAC17F958D2ee523a2206206994597C13D831ec7
// # This is a comment
// ```
pub fn load_contract_list(path: &Path) -> Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read contract list file: {:?}", path))?;

    let mut addresses = Vec::new();
    let mut seen = HashSet::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let addr = parse_address(line).with_context(|| {
            format!(
                "Invalid address on line {}: {}",
                line_num + 1,
                line
            )
        })?;

        if !seen.insert(addr) {
            warn!("Duplicate contract on line {}: {:?}", line_num + 1, addr);
            continue;
        }
        addresses.push(addr);
    }

    if addresses.is_empty() {
        anyhow::bail!("Contract list is empty (no valid addresses found)");
    }

    Ok(addresses)
}

/// Pad an odd-length hex string with a leading zero.
fn pad_hex_string(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix.
fn parse_address(s: &str) -> Result<Address> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s)
        .with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_contract_list() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0x34B842D0AcF830134D44075DCbcE43Ba04286c12").unwrap();
        writeln!(file, "# This is a comment").unwrap();
        writeln!(file, "").unwrap();
        writeln!(file, "0xdAC17F958D2ee523a2206206994597C13D831ec7").unwrap();
        file.flush().unwrap();

        let addresses = load_contract_list(file.path()).unwrap();
        assert_eq!(addresses.len(), 2);
    }

    #[test]
    fn test_load_contract_list_empty() {
        let file = NamedTempFile::new().unwrap();
        let result = load_contract_list(file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_contract_list_dedupes() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0x34B842D0AcF830134D44075DCbcE43Ba04286c12").unwrap();
        writeln!(file, "34b842d0acf830134d44075dcbce43ba04286c12").unwrap();
        file.flush().unwrap();

        let addresses = load_contract_list(file.path()).unwrap();
        assert_eq!(addresses.len(), 1);
    }

    #[test]
    fn test_load_contract_list_rejects_bad_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0x34B842D0AcF830134D44075DCbcE43Ba04286c12").unwrap();
        writeln!(file, "not-an-address").unwrap();
        file.flush().unwrap();

        assert!(load_contract_list(file.path()).is_err());
    }

    #[test]
    fn test_parse_address() {
        let addr1 = parse_address("0x34B842D0AcF830134D44075DCbcE43Ba04286c12").unwrap();
        let addr2 = parse_address("34B842D0AcF830134D44075DCbcE43Ba04286c12").unwrap();
        assert_eq!(addr1, addr2);
    }
}
