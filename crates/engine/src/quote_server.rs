//! Quote HTTP server for forkbench
//!
//! Serves front-run sizing quotes and the active profile as JSON.

use crate::config::Config;
use crate::frontrun::{
    bounded_analytic, max_frontrun_binary, SandwichParams, SandwichQuote, DEFAULT_MARGIN_WEI,
    DEFAULT_UPPER_WEI,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors that can occur when running the quote server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

/// Request counters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuoteStats {
    pub served: u64,
    pub failed: u64,
}

/// State shared by all handlers
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub stats: Arc<RwLock<QuoteStats>>,
}

impl ServerState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            stats: Arc::new(RwLock::new(QuoteStats::default())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub victim_in: f64,
    pub reserve_in: f64,
    pub reserve_out: f64,
    pub min_out: f64,
    pub upper: Option<f64>,
    pub margin: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub binary: SandwichQuote,
    /// Closed-form size; null when `min_out` does not bound the front-run
    pub analytic: Option<f64>,
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_profile(State(state): State<ServerState>) -> Json<Config> {
    Json(state.config.as_ref().clone())
}

async fn get_stats(State(state): State<ServerState>) -> Json<QuoteStats> {
    Json(state.stats.read().await.clone())
}

/// Handler for GET /quote
async fn get_quote(State(state): State<ServerState>, Query(q): Query<QuoteQuery>) -> Response {
    let params = SandwichParams::new(q.victim_in, q.reserve_in, q.reserve_out);
    let upper = q.upper.unwrap_or(DEFAULT_UPPER_WEI);
    let margin = q.margin.unwrap_or(DEFAULT_MARGIN_WEI);

    let result = max_frontrun_binary(&params, q.min_out, 0.0, upper, margin)
        .and_then(|binary| Ok((binary, bounded_analytic(&params, q.min_out)?)));

    let mut stats = state.stats.write().await;
    match result {
        Ok((binary, analytic)) => {
            stats.served += 1;
            Json(QuoteResponse { binary, analytic }).into_response()
        }
        Err(e) => {
            stats.failed += 1;
            log::debug!("quote rejected: {}", e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// Creates the axum Router with all quote endpoints
pub fn create_quote_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profile", get(get_profile))
        .route("/stats", get(get_stats))
        .route("/quote", get(get_quote))
        .with_state(state)
}

/// Runs the quote HTTP server on `addr`
pub async fn run_quote_server(addr: SocketAddr, state: ServerState) -> Result<(), ServerError> {
    let app = create_quote_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Quote server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
