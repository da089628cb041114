// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes broker task payloads to the runner and orchestrator.

use crate::orchestrator::PipelineOrchestrator;
use crate::runner::StepRunner;
use async_trait::async_trait;
use codeloom_broker::{TaskExecutor, TaskFailure, TaskPayload};
use codeloom_core::Clock;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The worker-side entry point for both task kinds.
pub struct IngestionExecutor<C: Clock> {
    runner: Arc<StepRunner<C>>,
    orchestrator: Arc<PipelineOrchestrator<C>>,
}

impl<C: Clock> IngestionExecutor<C> {
    pub fn new(runner: Arc<StepRunner<C>>, orchestrator: Arc<PipelineOrchestrator<C>>) -> Self {
        Self { runner, orchestrator }
    }
}

#[async_trait]
impl<C: Clock> TaskExecutor for IngestionExecutor<C> {
    async fn execute(
        &self,
        payload: TaskPayload,
        cancel: CancellationToken,
    ) -> Result<Value, TaskFailure> {
        match payload {
            TaskPayload::RunStep { repository_path, step_name, step_config, job_id } => {
                let result = self
                    .runner
                    .run_step(&repository_path, &step_name, &step_config, &job_id, 0)
                    .await;
                serde_json::to_value(&result).map_err(|e| TaskFailure(e.to_string()))
            }
            TaskPayload::OrchestratePipeline { repository_path, step_configs, job_id } => self
                .orchestrator
                .run_pipeline(&repository_path, step_configs, &job_id, cancel)
                .await
                .map_err(|e| TaskFailure(e.to_string())),
        }
    }
}
