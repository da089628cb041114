// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step runner: executes one step of one job inside a worker.
//!
//! The runner resolves the step factory, filters its options, enforces
//! the wall-clock timeout, records metrics, and emits the start and
//! terminal progress events. Every failure mode becomes a `StepResult`;
//! nothing escapes the task boundary as an error.

use crate::metrics::IngestionMetrics;
use codeloom_core::{
    Clock, JobId, JsonMap, ProgressEvent, StepConfig, StepProgress, StepResult, StepStatus,
};
use codeloom_steps::{filter_options, StepRegistry};
use codeloom_storage::{JobStore, ProgressBus};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct StepRunner<C: Clock> {
    registry: Arc<StepRegistry>,
    store: Arc<JobStore>,
    bus: Arc<ProgressBus>,
    metrics: Arc<IngestionMetrics>,
    clock: C,
    /// Ceiling when a step config does not carry its own `timeout`.
    default_timeout: Duration,
}

impl<C: Clock> StepRunner<C> {
    pub fn new(
        registry: Arc<StepRegistry>,
        store: Arc<JobStore>,
        bus: Arc<ProgressBus>,
        metrics: Arc<IngestionMetrics>,
        clock: C,
        default_timeout: Duration,
    ) -> Self {
        Self { registry, store, bus, metrics, clock, default_timeout }
    }

    /// Execute one step. Infallible by design: errors become failed results.
    pub async fn run_step(
        &self,
        repository_path: &str,
        step_name: &str,
        config: &StepConfig,
        job_id: &JobId,
        retry_count: u32,
    ) -> StepResult {
        let start_ms = self.clock.epoch_ms();
        tracing::info!(job_id = %job_id, step = step_name, "starting step");

        self.metrics.step_started();
        self.metrics.record_step(step_name, StepStatus::Running, None);

        let mut result = StepResult {
            step: step_name.to_string(),
            status: StepStatus::Running,
            job_id: job_id.clone(),
            repository_path: repository_path.to_string(),
            start_time_ms: start_ms,
            end_time_ms: start_ms,
            duration_seconds: 0.0,
            error: None,
            extra: JsonMap::new(),
        };
        self.record_progress(&result, retry_count).await;

        match self.registry.find(step_name) {
            Some(factory) => {
                let step = factory();
                let options = filter_options(step_name, &config.options);
                let budget = self.step_timeout(&config.options);

                match tokio::time::timeout(budget, step.run(repository_path, &options)).await {
                    Ok(Ok(output)) => {
                        result.status = StepStatus::Completed;
                        result.merge_step_output(output);
                    }
                    Ok(Err(step_error)) => {
                        tracing::error!(job_id = %job_id, step = step_name, error = %step_error, "step failed");
                        self.metrics.record_error("execution");
                        result.status = StepStatus::Failed;
                        result.error = Some(step_error.to_string());
                    }
                    Err(_elapsed) => {
                        tracing::error!(job_id = %job_id, step = step_name, "step timed out");
                        self.metrics.record_error("timeout");
                        result.status = StepStatus::Failed;
                        result.error =
                            Some(format!("step timed out after {}s", budget.as_secs()));
                    }
                }
            }
            None => {
                tracing::error!(job_id = %job_id, step = step_name, "step not found in registry");
                self.metrics.record_error("not_found");
                result.status = StepStatus::Failed;
                result.error = Some(format!("step not found: {step_name}"));
            }
        }

        let end_ms = self.clock.epoch_ms();
        result.end_time_ms = end_ms;
        result.duration_seconds = end_ms.saturating_sub(start_ms) as f64 / 1_000.0;

        self.metrics.step_finished();
        self.metrics.record_step(step_name, result.status, Some(result.duration_seconds));
        self.record_progress(&result, retry_count).await;

        tracing::info!(
            job_id = %job_id,
            step = step_name,
            status = %result.status,
            duration_seconds = result.duration_seconds,
            "step finished"
        );
        result
    }

    fn step_timeout(&self, options: &JsonMap) -> Duration {
        options
            .get("timeout")
            .and_then(Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Write the step's progress into the job record and publish the
    /// matching event. Job-level failure is the orchestrator's call (it
    /// owns retries), so only step state changes here.
    async fn record_progress(&self, result: &StepResult, retry_count: u32) {
        // A job that ended (cancelled under us) keeps its terminal event
        // in the latest-value cache.
        let terminal = self
            .store
            .get(result.job_id.as_str())
            .is_some_and(|record| record.status.is_terminal());
        if terminal {
            tracing::debug!(job_id = %result.job_id, step = %result.step, "job already terminal, dropping step progress");
            return;
        }
        let progress = result.to_progress(retry_count);
        let overall = self.update_store(&result.job_id, progress.clone());
        let event = ProgressEvent {
            job_id: result.job_id.clone(),
            step: result.step.clone(),
            status: result.status,
            progress: progress.progress,
            overall_progress: overall,
            message: progress.message.clone(),
            cpu_percent: progress.cpu_percent,
            memory_mb: progress.memory_mb,
            timestamp: self.clock.epoch_ms(),
        };
        if let Err(e) = self.bus.publish(&event).await {
            tracing::warn!(job_id = %result.job_id, error = %e, "failed to publish progress");
        }
    }

    fn update_store(&self, job_id: &JobId, progress: StepProgress) -> f64 {
        let now_ms = self.clock.epoch_ms();
        let updated = self.store.update(job_id.as_str(), |record| {
            record.current_step = Some(progress.name.clone());
            record.steps.insert(progress.name.clone(), progress);
            record.recompute_overall_progress();
            record.updated_at_ms = now_ms;
        });
        updated.map(|record| record.overall_progress).unwrap_or(0.0)
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
