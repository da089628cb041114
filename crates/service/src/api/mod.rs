// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface, versioned under `/v1`.

mod health;
mod ingest;
mod ws;

use crate::state::AppState;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use codeloom_core::Clock;
use tower_http::trace::TraceLayer;

pub fn router<C: Clock>(state: AppState<C>) -> Router {
    Router::new()
        .route("/v1/ingest", post(ingest::start::<C>).get(ingest::list::<C>))
        .route("/v1/ingest/:id", get(ingest::get_job::<C>))
        .route("/v1/ingest/:id/cancel", post(ingest::cancel::<C>))
        .route("/v1/ingest/ws/status/:id", get(ws::job_status::<C>))
        .route("/health", get(health::health::<C>))
        .route("/v1/health", get(health::health::<C>))
        .route("/metrics", get(metrics::<C>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics<C: Clock>(State(state): State<AppState<C>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}
