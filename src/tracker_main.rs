//! Contract activity tracker binary
//!
//! Polls an explorer API for calls to tracked contracts, folds them into
//! persistent per-contract metrics, and serves the results over HTTP.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tally::api;
use tally::config::load_contract_list;
use tally::explorer::ExplorerClient;
use tally::poller::Poller;
use tally::reader::MetricsReader;
use tally::store::RocksMetricsStore;
use tracing::{info, Level};
use tracing_subscriber;

/// Contract activity tracker
#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Track contract call activity from an explorer API")]
struct Args {
    /// Explorer API endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:4000/api")]
    api_url: String,

    /// Path to contract list file (one address per line)
    #[arg(short, long, default_value = "contracts.txt")]
    contracts: PathBuf,

    /// Path to RocksDB database directory
    #[arg(short, long, default_value = "./tally_db")]
    db_path: PathBuf,

    /// Listen address for the metrics API
    #[arg(short, long, default_value = "127.0.0.1:3000")]
    listen: String,

    /// Seconds between poll cycles
    #[arg(long, default_value_t = 15)]
    poll_interval_secs: u64,

    /// Blocks the head must move past a contract's progress before a window
    /// is fetched
    #[arg(long, default_value_t = 1)]
    head_margin: u64,

    /// Explorer request timeout in seconds
    #[arg(long, default_value_t = 10)]
    fetch_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    info!("Starting contract activity tracker");
    info!("Explorer API: {}", args.api_url);
    info!("Contract list: {:?}", args.contracts);
    info!("Database: {:?}", args.db_path);

    let contracts =
        load_contract_list(&args.contracts).context("Failed to load contract list")?;

    let store = Arc::new(
        RocksMetricsStore::open(&args.db_path)
            .with_context(|| format!("Failed to open database at {:?}", args.db_path))?,
    );

    let source = Arc::new(
        ExplorerClient::new(args.api_url, Duration::from_secs(args.fetch_timeout_secs))
            .context("Failed to build explorer client")?,
    );

    let poller = Poller::new(
        store.clone(),
        source,
        contracts,
        Duration::from_secs(args.poll_interval_secs),
        args.head_margin,
    );
    poller.initialize().context("Failed to initialize poller")?;

    let reader = MetricsReader::new(store);
    let app = api::router(reader);
    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("Metrics API listening on {}", args.listen);

    let server = async move {
        axum::serve(listener, app)
            .await
            .context("API server error")
    };

    // Handle Ctrl+C gracefully
    tokio::select! {
        result = poller.run() => {
            result.context("Poller error")?;
        }
        result = server => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    info!("Tracker stopped");
    Ok(())
}
