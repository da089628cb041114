// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The capability set every pipeline step must provide.

use async_trait::async_trait;
use codeloom_core::{JsonMap, StepStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors a step implementation may surface.
///
/// The runner translates all of these into a failed step result; they
/// never cross the task boundary as errors.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("invalid step parameters: {0}")]
    InvalidParams(String),

    #[error("unknown run id: {0}")]
    UnknownRun(String),

    #[error("step execution failed: {0}")]
    Execution(String),

    #[error("step does not support incremental updates")]
    IncrementalUnsupported,
}

/// Status snapshot a step reports for one of its runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepReport {
    pub fn with_status(status: StepStatus) -> Self {
        Self { status, progress: None, message: None, error: None }
    }
}

/// One unit of ingestion work.
///
/// Implementations run inside a worker process and are free to block;
/// the runner wraps each call in the task's wall-clock timeout. Options
/// arrive already filtered to the keys the step declares it accepts.
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Execute the step against a repository. The returned JSON value is
    /// merged into the runner's result record.
    async fn run(&self, repository_path: &str, options: &JsonMap) -> Result<Value, StepError>;

    /// Report the status of a run started by this step.
    async fn status(&self, run_id: &str) -> Result<StepReport, StepError>;

    /// Ask a run to shut down gracefully.
    async fn stop(&self, run_id: &str) -> Result<StepReport, StepError>;

    /// Terminate a run without waiting for a clean shutdown.
    async fn cancel(&self, run_id: &str) -> Result<StepReport, StepError>;

    /// Apply just this step's graph updates, without the full pipeline.
    async fn ingestion_update(
        &self,
        repository_path: &str,
        options: &JsonMap,
    ) -> Result<Value, StepError>;
}
