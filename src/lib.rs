//! Tally - on-chain contract activity tracker
//!
//! This library provides a persistent metrics store for tracked contracts,
//! a poller that folds explorer data into it incrementally, and an HTTP API
//! over the aggregated results.

pub mod keys;
pub mod records;
pub mod store;
pub mod cli;

// Poller modules
pub mod config;
pub mod explorer;
pub mod poller;
pub mod source;
pub mod types;

// API modules
pub mod api;
pub mod reader;

// Re-export the main types for convenience
pub use records::{CallRecord, ContractAggregate};
pub use source::{ChainDataSource, SourceError};
pub use store::{ContractMetrics, MetricsSnapshot, MetricsStore, RocksMetricsStore};
