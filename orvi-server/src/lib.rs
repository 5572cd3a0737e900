//! HTTP front-end for the sequence engine.
//!
//! `POST /execute` runs one request to completion and answers 200 with the
//! [`ExecutionReport`], whatever the run's outcome. Only malformed bodies,
//! a full session pool and a browser that will not start are reported as
//! HTTP errors.

pub mod error;

pub use error::ApiError;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::{get, post},
};
use orvi_engine::{ExecutionReport, ExecutionRequest, ExecutionService};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ExecutionService>,
    /// Parent of every run token; cancelled on process shutdown.
    pub runs: CancellationToken,
}

impl AppState {
    pub fn new(service: ExecutionService, runs: CancellationToken) -> Self {
        Self {
            service: Arc::new(service),
            runs,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/execute", post(execute))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn execute(
    State(state): State<AppState>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecutionReport>, ApiError> {
    let Json(request) = payload?;
    info!(
        target: "server.http",
        sequences = request.sequences.len(),
        "execute request accepted"
    );

    // The run lives on its own task so a dropped connection cannot abandon
    // an open browser; dropping this handler cancels the token instead.
    let token = state.runs.child_token();
    let guard = token.clone().drop_guard();
    let service = state.service.clone();
    let task = tokio::spawn(async move { service.execute(request, token).await });

    let outcome = task
        .await
        .map_err(|err| ApiError::internal(format!("execution task failed: {err}")))?;
    guard.disarm();
    Ok(Json(outcome?))
}
