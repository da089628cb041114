// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.

use codeloom_broker::BrokerError;
use codeloom_core::ValidationError;
use codeloom_storage::StorageError;
use thiserror::Error;

/// Errors the orchestration layer can raise.
///
/// Step execution failures are never errors; they are recorded results.
/// Only validation, dispatch, and storage problems surface here.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to dispatch task: {0}")]
    Dispatch(#[from] BrokerError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RuntimeError {
    /// Diagnostic label used for the error counter metric.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::Validation(_) => "validation",
            RuntimeError::Dispatch(_) => "dispatch",
            RuntimeError::Storage(_) => "storage",
        }
    }
}
