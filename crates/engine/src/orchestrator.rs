// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline orchestrator: drives the ordered step list of one job.
//!
//! Steps run strictly sequentially: step N+1 is not dispatched until
//! step N reached a terminal state. Failed steps are retried with capped
//! exponential backoff; a retry is skipped once the job is cancelling.

use crate::error::RuntimeError;
use crate::metrics::IngestionMetrics;
use codeloom_broker::{TaskBroker, TaskOptions, TaskPayload, TaskState};
use codeloom_core::{
    dominant_job_status, Clock, JobId, JobStatus, ProgressEvent, StepConfig, StepResult,
    StepStatus, ValidationError,
};
use codeloom_storage::{JobStore, ProgressBus};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct PipelineOrchestrator<C: Clock> {
    broker: Arc<dyn TaskBroker>,
    store: Arc<JobStore>,
    bus: Arc<ProgressBus>,
    metrics: Arc<IngestionMetrics>,
    clock: C,
}

impl<C: Clock> PipelineOrchestrator<C> {
    pub fn new(
        broker: Arc<dyn TaskBroker>,
        store: Arc<JobStore>,
        bus: Arc<ProgressBus>,
        metrics: Arc<IngestionMetrics>,
        clock: C,
    ) -> Self {
        Self { broker, store, bus, metrics, clock }
    }

    /// Run the pipeline for one job and return the job-level result.
    ///
    /// Raises only for validation and dispatch problems; every step
    /// outcome, including failure, is part of the returned record.
    pub async fn run_pipeline(
        &self,
        repository_path: &str,
        step_configs: Vec<StepConfig>,
        job_id: &JobId,
        cancel: CancellationToken,
    ) -> Result<Value, RuntimeError> {
        let start_ms = self.clock.epoch_ms();
        validate_step_configs(&step_configs).inspect_err(|_| {
            self.metrics.record_error("validation");
        })?;

        tracing::info!(job_id = %job_id, steps = step_configs.len(), "starting pipeline");
        self.metrics.record_job(JobStatus::Running);

        if step_configs.is_empty() {
            return Ok(self.finish_empty(repository_path, job_id, start_ms).await);
        }

        let first_step = step_configs[0].name.clone();
        self.store.update(job_id.as_str(), |record| {
            record.set_status(JobStatus::Running, start_ms);
            record.current_step = Some(first_step.clone());
        });
        self.publish(ProgressEvent::new(
            job_id.clone(),
            first_step.as_str(),
            StepStatus::Running,
            0.0,
            0.0,
            self.clock.epoch_ms(),
        ))
        .await;

        let mut step_results: Vec<Value> = Vec::new();
        let mut statuses: Vec<StepStatus> = Vec::new();

        for config in &step_configs {
            if self.cancellation_requested(job_id, &cancel) {
                self.finalize_cancelled(job_id).await;
                return Ok(self.job_result(
                    repository_path,
                    job_id,
                    JobStatus::Cancelled,
                    step_results,
                    start_ms,
                    None,
                ));
            }

            let (result, retries) = self.run_step_with_retries(repository_path, config, job_id, &cancel).await?;
            statuses.push(result.status);

            let now_ms = self.clock.epoch_ms();
            self.store.update(job_id.as_str(), |record| {
                record.absorb_step(result.to_progress(retries), now_ms);
            });

            let status = result.status;
            let error = result.error.clone();
            step_results.push(serde_json::to_value(&result).unwrap_or(Value::Null));

            match status {
                StepStatus::Completed => {}
                StepStatus::Failed => {
                    if config.continue_on_failure {
                        tracing::warn!(job_id = %job_id, step = %config.name, "step failed, continuing");
                        continue;
                    }
                    tracing::warn!(job_id = %job_id, step = %config.name, "step failed, stopping pipeline");
                    self.metrics.record_job(JobStatus::Failed);
                    return Ok(self.job_result(
                        repository_path,
                        job_id,
                        JobStatus::Failed,
                        step_results,
                        start_ms,
                        Some(format!(
                            "Step '{}' failed: {}",
                            config.name,
                            error.unwrap_or_else(|| "unknown error".to_string())
                        )),
                    ));
                }
                StepStatus::Cancelled | StepStatus::Stopped => {
                    self.finalize_cancelled(job_id).await;
                    return Ok(self.job_result(
                        repository_path,
                        job_id,
                        JobStatus::Cancelled,
                        step_results,
                        start_ms,
                        None,
                    ));
                }
                StepStatus::Pending | StepStatus::Running => {
                    // Terminal wait cannot surface these; treat as failed dispatch.
                    self.metrics.record_error("dispatch");
                }
            }
        }

        let final_status = dominant_job_status(statuses);
        self.metrics.record_job(final_status);
        let error = match final_status {
            JobStatus::Completed => {
                self.finalize_completed(job_id, &step_configs).await;
                None
            }
            // Reachable only via continue_on_failure: steps failed but the
            // pipeline ran to the end.
            _ => self.finalize_failed(job_id).await,
        };
        Ok(self.job_result(repository_path, job_id, final_status, step_results, start_ms, error))
    }

    async fn finalize_failed(&self, job_id: &JobId) -> Option<String> {
        let now_ms = self.clock.epoch_ms();
        let record = self.store.update(job_id.as_str(), |record| {
            if record.error.is_none() {
                let failed = record
                    .first_failed_step()
                    .map(|step| (step.name.clone(), step.error.clone()));
                if let Some((name, error)) = failed {
                    let detail = error.unwrap_or_else(|| "unknown error".to_string());
                    record.error = Some(format!("Step '{name}' failed: {detail}"));
                }
            }
            record.set_status(JobStatus::Failed, now_ms);
        });
        let (step, overall, error) = record
            .map(|r| {
                (
                    r.current_step.unwrap_or_else(|| "pipeline".to_string()),
                    r.overall_progress,
                    r.error,
                )
            })
            .unwrap_or_else(|| ("pipeline".to_string(), 0.0, None));
        let mut event =
            ProgressEvent::new(job_id.clone(), step, StepStatus::Failed, 0.0, overall, now_ms);
        if let Some(message) = &error {
            event = event.with_message(message.clone());
        }
        self.publish(event).await;
        error
    }

    /// Dispatch one step, re-dispatching failed runs up to the config's
    /// retry budget with exponential backoff.
    async fn run_step_with_retries(
        &self,
        repository_path: &str,
        config: &StepConfig,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<(StepResult, u32), RuntimeError> {
        let policy = config.retry_policy();
        let mut attempt: u32 = 0;
        loop {
            let result = self.dispatch_step(repository_path, config, job_id).await?;
            if result.status != StepStatus::Failed || attempt >= policy.max_retries {
                return Ok((result, attempt));
            }
            if self.cancellation_requested(job_id, cancel) {
                tracing::info!(job_id = %job_id, step = %config.name, "skipping retry, job is cancelling");
                return Ok((result, attempt));
            }
            let backoff = policy.backoff_for_attempt(attempt);
            tracing::info!(
                job_id = %job_id,
                step = %config.name,
                attempt = attempt + 1,
                backoff_seconds = backoff.as_secs(),
                "retrying failed step"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    /// Submit one run_step task and await its terminal state.
    async fn dispatch_step(
        &self,
        repository_path: &str,
        config: &StepConfig,
        job_id: &JobId,
    ) -> Result<StepResult, RuntimeError> {
        let queue = self
            .store
            .get(job_id.as_str())
            .map(|record| record.priority.into())
            .unwrap_or(codeloom_broker::QueueName::Default);

        let payload = TaskPayload::RunStep {
            repository_path: repository_path.to_string(),
            step_name: config.name.clone(),
            step_config: config.clone(),
            job_id: job_id.clone(),
        };
        let mut handle =
            self.broker.dispatch(payload, TaskOptions::default().queue(queue)).await?;
        let state = handle.wait().await;
        let inspection = self.broker.inspect(handle.id()).await;

        let result = match state {
            TaskState::Success => inspection
                .result
                .and_then(|value| serde_json::from_value::<StepResult>(value).ok()),
            TaskState::Revoked => Some(self.synthesize_result(
                config,
                job_id,
                StepStatus::Cancelled,
                inspection.error,
            )),
            _ => Some(self.synthesize_result(
                config,
                job_id,
                StepStatus::Failed,
                inspection.error.or_else(|| Some("task lost by broker".to_string())),
            )),
        };
        Ok(result.unwrap_or_else(|| {
            self.synthesize_result(
                config,
                job_id,
                StepStatus::Failed,
                Some("step task produced no result".to_string()),
            )
        }))
    }

    /// A result record for outcomes the runner never got to report
    /// (revoked or lost tasks).
    fn synthesize_result(
        &self,
        config: &StepConfig,
        job_id: &JobId,
        status: StepStatus,
        error: Option<String>,
    ) -> StepResult {
        let now_ms = self.clock.epoch_ms();
        StepResult {
            step: config.name.clone(),
            status,
            job_id: job_id.clone(),
            repository_path: String::new(),
            start_time_ms: now_ms,
            end_time_ms: now_ms,
            duration_seconds: 0.0,
            error,
            extra: codeloom_core::JsonMap::new(),
        }
    }

    fn cancellation_requested(&self, job_id: &JobId, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return true;
        }
        matches!(
            self.store.get(job_id.as_str()).map(|record| record.status),
            Some(JobStatus::Cancelling) | Some(JobStatus::Cancelled)
        )
    }

    async fn finish_empty(&self, repository_path: &str, job_id: &JobId, start_ms: u64) -> Value {
        let now_ms = self.clock.epoch_ms();
        self.store.update(job_id.as_str(), |record| {
            record.set_status(JobStatus::Running, start_ms);
            record.set_status(JobStatus::Completed, now_ms);
            record.overall_progress = 100.0;
        });
        self.metrics.record_job(JobStatus::Completed);
        self.publish(
            ProgressEvent::new(job_id.clone(), "pipeline", StepStatus::Completed, 100.0, 100.0, now_ms)
                .with_message("no steps configured"),
        )
        .await;
        self.job_result(repository_path, job_id, JobStatus::Completed, Vec::new(), start_ms, None)
    }

    async fn finalize_completed(&self, job_id: &JobId, step_configs: &[StepConfig]) {
        let now_ms = self.clock.epoch_ms();
        let record = self.store.update(job_id.as_str(), |record| {
            record.recompute_overall_progress();
            record.set_status(JobStatus::Completed, now_ms);
        });
        let last_step = step_configs.last().map(|c| c.name.as_str()).unwrap_or("pipeline");
        let overall = record.map(|r| r.overall_progress).unwrap_or(100.0);
        self.publish(ProgressEvent::new(
            job_id.clone(),
            last_step,
            StepStatus::Completed,
            100.0,
            overall,
            now_ms,
        ))
        .await;
    }

    async fn finalize_cancelled(&self, job_id: &JobId) {
        let now_ms = self.clock.epoch_ms();
        let record = self.store.update(job_id.as_str(), |record| {
            record.set_status(JobStatus::Cancelled, now_ms);
        });
        self.metrics.record_job(JobStatus::Cancelled);
        let (step, overall) = record
            .map(|r| (r.current_step.unwrap_or_else(|| "pipeline".to_string()), r.overall_progress))
            .unwrap_or_else(|| ("pipeline".to_string(), 0.0));
        self.publish(
            ProgressEvent::new(job_id.clone(), step, StepStatus::Cancelled, 0.0, overall, now_ms)
                .with_message("job was cancelled"),
        )
        .await;
    }

    fn job_result(
        &self,
        repository_path: &str,
        job_id: &JobId,
        status: JobStatus,
        steps: Vec<Value>,
        start_ms: u64,
        error: Option<String>,
    ) -> Value {
        let end_ms = self.clock.epoch_ms();
        let mut result = json!({
            "job_id": job_id,
            "status": status,
            "repository_path": repository_path,
            "steps": steps,
            "start_time": start_ms,
            "end_time": end_ms,
            "duration": end_ms.saturating_sub(start_ms) as f64 / 1_000.0,
        });
        if let Some(error) = error {
            result["error"] = json!(error);
            self.store.update(job_id.as_str(), |record| {
                if record.error.is_none() {
                    record.error = Some(error.clone());
                }
            });
        }
        self.store.update(job_id.as_str(), |record| {
            record.result = Some(result.clone());
        });
        result
    }

    async fn publish(&self, event: ProgressEvent) {
        if let Err(e) = self.bus.publish(&event).await {
            tracing::warn!(job_id = %event.job_id, error = %e, "failed to publish progress");
        }
    }
}

/// Duplicate step names are rejected before any dispatch.
fn validate_step_configs(step_configs: &[StepConfig]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for config in step_configs {
        if !seen.insert(config.name.as_str()) {
            return Err(ValidationError::DuplicateStep(config.name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
