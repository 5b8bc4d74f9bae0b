//! Status API
//!
//! Read-only HTTP view of the state store for local consumers.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::state::{LevelTransition, StateStore, StatusSnapshot};

const DEFAULT_TRANSITION_COUNT: usize = 20;

#[derive(Debug, Deserialize)]
struct TransitionsQuery {
    count: Option<usize>,
}

/// Build the router serving `/status`, `/health` and `/transitions`
pub fn router(state: StateStore) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/transitions", get(transitions_handler))
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled
pub async fn serve(
    addr: SocketAddr,
    state: StateStore,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Status API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Status API stopped");
    Ok(())
}

async fn status_handler(State(state): State<StateStore>) -> Json<StatusSnapshot> {
    Json(state.snapshot())
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn transitions_handler(
    State(state): State<StateStore>,
    Query(query): Query<TransitionsQuery>,
) -> Json<Vec<LevelTransition>> {
    let count = query.count.unwrap_or(DEFAULT_TRANSITION_COUNT);
    Json(state.recent_transitions(count))
}
