// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service error type and its HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use codeloom_broker::BrokerError;
use codeloom_core::ValidationError;
use codeloom_engine::RuntimeError;
use codeloom_storage::StorageError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed client request → 400.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown job id → 404.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Broker unreachable or rejected the submission → 500.
    #[error("failed to dispatch ingestion job: {0}")]
    Dispatch(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Dispatch(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Diagnostic label used for the error counter metric.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Dispatch(_) => "dispatch",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<BrokerError> for ServiceError {
    fn from(e: BrokerError) -> Self {
        ServiceError::Dispatch(e.to_string())
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        ServiceError::Internal(e.to_string())
    }
}

impl From<RuntimeError> for ServiceError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::Validation(v) => ServiceError::Validation(v),
            RuntimeError::Dispatch(b) => ServiceError::Dispatch(b.to_string()),
            RuntimeError::Storage(s) => ServiceError::Internal(s.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({"detail": self.to_string()}))).into_response()
    }
}
