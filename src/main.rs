//! tallyctl - contract activity store CLI tool
//!
//! A developer-friendly command-line interface for inspecting tracked-contract
//! metrics in a persistent RocksDB store.

use tally::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
