//! Read-only JSON surface over the backends, one router for all coins.
//! Nothing here can mutate financial state; every money-moving operation
//! stays inside the backend timers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::backend::{BalanceSnapshot, CoinBackend, PoolBalanceSnapshot, PoolStatsSnapshot};
use crate::config::PoolFeeEntry;
use crate::error::{PoolError, Result};

#[derive(Clone)]
pub struct ApiState {
    backends: Arc<HashMap<String, Arc<CoinBackend>>>,
}

impl ApiState {
    pub fn new(backends: impl IntoIterator<Item = Arc<CoinBackend>>) -> Self {
        let map = backends
            .into_iter()
            .map(|backend| (backend.coin().name.to_owned(), backend))
            .collect();

        Self {
            backends: Arc::new(map),
        }
    }

    fn backend(&self, coin: &str) -> Option<&Arc<CoinBackend>> {
        self.backends.get(coin.to_uppercase().as_str())
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/coins", get(list_coins))
        .route("/api/{coin}/stats", get(pool_stats))
        .route("/api/{coin}/balance", get(pool_balance))
        .route("/api/{coin}/balance/{miner}", get(miner_balance))
        .route("/api/{coin}/blocks", get(found_blocks))
        .route("/api/{coin}/rounds", get(recent_rounds))
        .route("/api/{coin}/payouts/{miner}", get(miner_payouts))
        .route("/api/{coin}/stats/{miner}", get(miner_stats))
        .with_state(state)
}

/// Binds the listener and serves the API on a background task.
pub async fn serve(bind: SocketAddr, state: ApiState) -> Result<JoinHandle<()>> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| PoolError::Internal {
            message: format!("can't bind api listener on {bind}: {err}"),
        })?;

    info!(%bind, "api listening");
    let app = router(state);

    Ok(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(%err, "api server terminated");
        }
    }))
}

#[derive(Debug, Serialize)]
struct CoinSummary {
    name: &'static str,
    fullname: &'static str,
    fees: Vec<PoolFeeEntry>,
}

fn internal(err: PoolError) -> StatusCode {
    error!(%err, "api query failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn list_coins(State(state): State<ApiState>) -> Json<Vec<CoinSummary>> {
    let mut coins: Vec<CoinSummary> = state
        .backends
        .values()
        .map(|backend| CoinSummary {
            name: backend.coin().name,
            fullname: backend.coin().fullname,
            fees: backend.fee_config().to_vec(),
        })
        .collect();
    coins.sort_by_key(|coin| coin.name);

    Json(coins)
}

async fn pool_stats(
    State(state): State<ApiState>,
    Path(coin): Path<String>,
) -> std::result::Result<Json<PoolStatsSnapshot>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(backend.pool_stats()))
}

async fn pool_balance(
    State(state): State<ApiState>,
    Path(coin): Path<String>,
) -> std::result::Result<Json<PoolBalanceSnapshot>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    backend.pool_balance().await.map(Json).map_err(internal)
}

async fn miner_balance(
    State(state): State<ApiState>,
    Path((coin, miner)): Path<(String, String)>,
) -> std::result::Result<Json<BalanceSnapshot>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    backend.miner_balance(&miner).await.map(Json).map_err(internal)
}

async fn found_blocks(
    State(state): State<ApiState>,
    Path(coin): Path<String>,
) -> std::result::Result<Json<Vec<orepool_model::entities::rounds::Model>>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    backend.found_blocks(50).await.map(Json).map_err(internal)
}

async fn recent_rounds(
    State(state): State<ApiState>,
    Path(coin): Path<String>,
) -> std::result::Result<Json<Vec<orepool_model::entities::rounds::Model>>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    backend.recent_rounds(50).await.map(Json).map_err(internal)
}

async fn miner_payouts(
    State(state): State<ApiState>,
    Path((coin, miner)): Path<(String, String)>,
) -> std::result::Result<Json<Vec<orepool_model::entities::payouts::Model>>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    backend
        .payouts_for(&miner, 100)
        .await
        .map(Json)
        .map_err(internal)
}

async fn miner_stats(
    State(state): State<ApiState>,
    Path((coin, miner)): Path<(String, String)>,
) -> std::result::Result<Json<Vec<orepool_model::entities::stats::Model>>, StatusCode> {
    let backend = state.backend(&coin).ok_or(StatusCode::NOT_FOUND)?;

    backend
        .miner_stats(&miner, 100)
        .await
        .map(Json)
        .map_err(internal)
}
