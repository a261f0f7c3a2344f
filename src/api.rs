//! HTTP metrics API
//!
//! Serves the aggregated contract metrics as JSON. Read-only: every request
//! is answered from a point-in-time store snapshot.

use crate::reader::MetricsReader;
use crate::records::ContractAggregate;
use alloy_primitives::Address;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Build the API router.
pub fn router(reader: MetricsReader) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(all_metrics))
        .route("/metrics/:address", get(contract_metrics))
        .with_state(reader)
}

/// One contract's row in the metrics responses.
#[derive(Debug, Serialize)]
struct AggregateBody {
    contract_address: String,
    call_count: u64,
    /// Decimal string; wei-scale sums overflow JSON numbers
    total_amount: String,
    call_chains: u64,
}

impl AggregateBody {
    fn new(contract: Address, aggregate: &ContractAggregate) -> Self {
        Self {
            contract_address: format!("0x{:x}", contract),
            call_count: aggregate.call_count,
            total_amount: aggregate.total_amount.to_string(),
            call_chains: aggregate.call_chains,
        }
    }
}

#[derive(Debug, Serialize)]
struct AllMetricsBody {
    per_contract_metrics: Vec<AggregateBody>,
    total_user_count: u64,
}

#[derive(Debug, Serialize)]
struct ContractMetricsBody {
    contract_address: String,
    /// Null when the contract has no committed activity
    metrics: Option<AggregateBody>,
    user_count: u64,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn all_metrics(State(reader): State<MetricsReader>) -> Response {
    let snapshot = match reader.all_metrics() {
        Ok(snapshot) => snapshot,
        Err(e) => return internal_error(e),
    };

    let per_contract_metrics = snapshot
        .contracts
        .iter()
        .map(|(contract, aggregate)| AggregateBody::new(*contract, aggregate))
        .collect();

    Json(AllMetricsBody {
        per_contract_metrics,
        total_user_count: snapshot.total_user_count,
    })
    .into_response()
}

async fn contract_metrics(
    State(reader): State<MetricsReader>,
    Path(address): Path<String>,
) -> Response {
    let contract: Address = match address.parse() {
        Ok(contract) => contract,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("invalid contract address: {}", address) })),
            )
                .into_response();
        }
    };

    let metrics = match reader.contract_metrics(contract) {
        Ok(metrics) => metrics,
        Err(e) => return internal_error(e),
    };

    Json(ContractMetricsBody {
        contract_address: format!("0x{:x}", contract),
        metrics: metrics
            .aggregate
            .map(|aggregate| AggregateBody::new(contract, &aggregate)),
        user_count: metrics.user_count,
    })
    .into_response()
}

fn internal_error(e: anyhow::Error) -> Response {
    error!("Metrics read failed: {:?}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal error" })),
    )
        .into_response()
}
