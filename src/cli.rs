//! CLI implementation for tallyctl
//!
//! Provides a developer-friendly command-line interface for inspecting
//! the metrics store. All commands output pretty JSON.

use crate::{MetricsStore, RocksMetricsStore};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

/// Metrics store CLI tool
#[derive(Parser)]
#[command(name = "tallyctl")]
#[command(about = "Contract activity store CLI tool")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./tally_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get a contract's last processed block height
    GetProgress {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
    },
    /// Set a contract's last processed block height
    ///
    /// Overwrites unconditionally. Rewinding makes the next poll cycle
    /// refetch from the new height.
    SetProgress {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
        /// Last processed block height
        height: u64,
    },
    /// Show metrics for every tracked contract
    Metrics,
    /// Show metrics for one contract
    ContractMetrics {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
    },
    /// List stored call records for a contract in a height range
    Calls {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
        /// Start block height (inclusive)
        from_height: u64,
        /// End block height (inclusive)
        to_height: u64,
    },
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

/// Parse a hex string into a 20-byte address.
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

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RocksMetricsStore::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = match cli.command {
        Commands::GetProgress { address } => {
            let contract = parse_address(&address)?;
            match store.get_last_height(contract)? {
                Some(height) => json!({
                    "address": format!("0x{:x}", contract),
                    "last_height": height,
                }),
                None => json!({
                    "address": format!("0x{:x}", contract),
                    "last_height": null,
                }),
            }
        }
        Commands::SetProgress { address, height } => {
            let contract = parse_address(&address)?;
            store.set_last_height(contract, height)?;
            json!({
                "status": "ok",
                "address": format!("0x{:x}", contract),
                "last_height": height,
            })
        }
        Commands::Metrics => {
            let snapshot = store.all_metrics()?;
            let rows: Vec<_> = snapshot
                .contracts
                .iter()
                .map(|(contract, aggregate)| {
                    json!({
                        "contract_address": format!("0x{:x}", contract),
                        "call_count": aggregate.call_count,
                        "total_amount": aggregate.total_amount.to_string(),
                        "call_chains": aggregate.call_chains,
                    })
                })
                .collect();
            json!({
                "per_contract_metrics": rows,
                "total_user_count": snapshot.total_user_count,
            })
        }
        Commands::ContractMetrics { address } => {
            let contract = parse_address(&address)?;
            let metrics = store.contract_metrics(contract)?;
            let body = metrics.aggregate.map(|aggregate| {
                json!({
                    "contract_address": format!("0x{:x}", contract),
                    "call_count": aggregate.call_count,
                    "total_amount": aggregate.total_amount.to_string(),
                    "call_chains": aggregate.call_chains,
                })
            });
            json!({
                "contract_address": format!("0x{:x}", contract),
                "metrics": body,
                "user_count": metrics.user_count,
            })
        }
        Commands::Calls {
            address,
            from_height,
            to_height,
        } => {
            let contract = parse_address(&address)?;
            let records = store.records_in_range(contract, from_height, to_height)?;
            let calls: Vec<_> = records
                .iter()
                .map(|record| {
                    json!({
                        "tx_hash": format!("0x{:x}", record.tx_hash),
                        "block_height": record.block_height,
                        "caller_address": format!("0x{:x}", record.caller_address),
                        "amount": record.amount.to_string(),
                        "timestamp": record.timestamp,
                    })
                })
                .collect();
            json!({
                "contract_address": format!("0x{:x}", contract),
                "from_height": from_height,
                "to_height": to_height,
                "count": calls.len(),
                "calls": calls,
            })
        }
    };

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
