// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ingestion job endpoints.

use crate::error::ServiceError;
use crate::service::ListRequest;
use crate::state::AppState;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use codeloom_core::{Clock, IngestionRequest, JobRecord};
use serde::Serialize;

/// `POST /v1/ingest`: 202 with the started-job summary.
pub async fn start<C: Clock>(
    State(state): State<AppState<C>>,
    Json(request): Json<IngestionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let started = state.service.start(request).await?;
    Ok((StatusCode::ACCEPTED, Json(started)))
}

/// `GET /v1/ingest/{id}`.
pub async fn get_job<C: Clock>(
    State(state): State<AppState<C>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, ServiceError> {
    Ok(Json(state.service.get(&job_id).await?))
}

/// `POST /v1/ingest/{id}/cancel` (idempotent).
pub async fn cancel<C: Clock>(
    State(state): State<AppState<C>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobRecord>, ServiceError> {
    Ok(Json(state.service.cancel(&job_id).await?))
}

#[derive(Debug, Serialize)]
pub struct PaginatedJobs {
    pub items: Vec<JobRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_more: bool,
}

/// `GET /v1/ingest`: list with `status` (repeatable), `limit`,
/// `offset`, `sort_by`, `sort_order`.
pub async fn list<C: Clock>(
    State(state): State<AppState<C>>,
    RawQuery(query): RawQuery,
) -> Result<Json<PaginatedJobs>, ServiceError> {
    let request = parse_list_params(query.as_deref().unwrap_or(""));
    let limit = request.limit.unwrap_or(10).clamp(1, 100);
    let offset = request.offset.unwrap_or(0);
    let page = state.service.list(&request)?;
    Ok(Json(PaginatedJobs {
        items: page.items,
        total: page.total,
        limit,
        offset,
        has_more: page.has_more,
    }))
}

/// Hand-rolled parse so `status` may repeat (serde query maps collapse
/// repeated keys).
fn parse_list_params(query: &str) -> ListRequest {
    let mut request = ListRequest::default();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, ""),
        };
        match key {
            "status" => request.statuses.push(value.to_string()),
            "limit" => request.limit = value.parse().ok(),
            "offset" => request.offset = value.parse().ok(),
            "sort_by" => request.sort_by = Some(value.to_string()),
            "sort_order" => request.sort_order = Some(value.to_string()),
            _ => {}
        }
    }
    request
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
