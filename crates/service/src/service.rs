// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application layer: the operations behind the HTTP surface.

use crate::error::ServiceError;
use codeloom_broker::{TaskBroker, TaskOptions, TaskPayload, TaskState};
use codeloom_core::{
    Clock, IngestionRequest, IngestionStarted, JobId, JobRecord, JobStatus, JsonMap,
    ProgressEvent, StepConfig, StepStatus, TaskId, ValidationError,
};
use codeloom_engine::{DependencyScheduler, IngestionMetrics};
use codeloom_steps::{filter_options, StepRegistry};
use codeloom_storage::{JobPage, JobStore, ListQuery, ProgressBus, SortField, SortOrder};
use std::sync::Arc;

/// Parameters of the list endpoint, still in wire form.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    pub statuses: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Orchestrates broker, store, bus, and scheduler for the API layer.
pub struct IngestionService<C: Clock> {
    registry: Arc<StepRegistry>,
    broker: Arc<dyn TaskBroker>,
    store: Arc<JobStore>,
    bus: Arc<ProgressBus>,
    scheduler: Arc<DependencyScheduler>,
    metrics: Arc<IngestionMetrics>,
    clock: C,
}

impl<C: Clock> IngestionService<C> {
    pub fn new(
        registry: Arc<StepRegistry>,
        broker: Arc<dyn TaskBroker>,
        store: Arc<JobStore>,
        bus: Arc<ProgressBus>,
        scheduler: Arc<DependencyScheduler>,
        metrics: Arc<IngestionMetrics>,
        clock: C,
    ) -> Self {
        Self { registry, broker, store, bus, scheduler, metrics, clock }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Start an ingestion job: hold it if it has dependencies, dispatch
    /// it otherwise.
    pub async fn start(&self, request: IngestionRequest) -> Result<IngestionStarted, ServiceError> {
        self.validate(&request).inspect_err(|_| self.metrics.record_error("validation"))?;

        if request.dependencies.is_empty() {
            return self.submit(request, None).await;
        }
        self.hold(request).await
    }

    /// Path B: park the request until its dependencies complete.
    async fn hold(&self, request: IngestionRequest) -> Result<IngestionStarted, ServiceError> {
        let job_id = JobId::generate();
        let now_ms = self.clock.epoch_ms();
        let message =
            format!("waiting for dependencies: {}", request.dependencies.join(", "));

        self.scheduler.hold(&job_id, &request).await?;

        let mut record = self.record_from_request(&job_id, &request, now_ms);
        record.message = Some(message.clone());
        self.store.insert(record);

        let event = ProgressEvent::new(
            job_id.clone(),
            "waiting_for_dependencies",
            StepStatus::Pending,
            0.0,
            0.0,
            now_ms,
        )
        .with_message(message.clone());
        self.bus.publish(&event).await?;

        tracing::info!(job_id = %job_id, dependencies = ?request.dependencies, "job waiting for dependencies");
        Ok(IngestionStarted {
            job_id,
            status: JobStatus::Pending,
            source: request.source.clone(),
            steps: request.step_names(),
            message: Some(message),
            eta: None,
        })
    }

    /// Path A: build the step configs and dispatch the pipeline.
    ///
    /// `job_id` is set when resubmitting a dependency-released job so the
    /// id the client holds keeps tracking the same job.
    pub async fn submit(
        &self,
        request: IngestionRequest,
        job_id: Option<JobId>,
    ) -> Result<IngestionStarted, ServiceError> {
        let job_id = job_id.unwrap_or_else(JobId::generate);
        let now_ms = self.clock.epoch_ms();
        let step_configs = build_step_configs(&request);

        let mut record = self.record_from_request(&job_id, &request, now_ms);
        record.step_configs = step_configs.clone();
        record.steps = step_configs
            .iter()
            .map(|config| (config.name.clone(), codeloom_core::StepProgress::pending(&config.name)))
            .collect();
        record.dependencies = Vec::new();
        self.store.insert(record);

        let payload = TaskPayload::OrchestratePipeline {
            repository_path: request.source.clone(),
            step_configs,
            job_id: job_id.clone(),
        };
        let mut options = TaskOptions::default()
            .queue(request.priority.into())
            .task_id(TaskId::new(job_id.as_str()));
        if let Some(eta) = request.eta {
            options = options.eta(eta);
        } else if let Some(countdown) = request.countdown {
            options = options.countdown_seconds(countdown);
        }

        if let Err(e) = self.broker.dispatch(payload, options).await {
            // No job record is created for a failed submission.
            self.store.remove(job_id.as_str());
            self.metrics.record_error("dispatch");
            return Err(e.into());
        }

        let event = ProgressEvent::new(
            job_id.clone(),
            "initializing",
            StepStatus::Pending,
            0.0,
            0.0,
            now_ms,
        )
        .with_message("preparing to start ingestion");
        self.bus.publish(&event).await?;

        let now_secs = now_ms / 1_000;
        let eta = request.eta.or(request.countdown.map(|c| now_secs + c)).or(Some(now_secs));
        tracing::info!(job_id = %job_id, source = %request.source, "ingestion job submitted");
        Ok(IngestionStarted {
            job_id,
            status: JobStatus::Pending,
            source: request.source.clone(),
            steps: request.step_names(),
            message: Some("ingestion job submitted successfully".to_string()),
            eta,
        })
    }

    /// Current state of one job, joining the broker's view with the
    /// store. A completed job triggers the dependent-release scan.
    pub async fn get(&self, job_id: &str) -> Result<JobRecord, ServiceError> {
        let record = match self.store.get(job_id) {
            Some(record) => self.overlay_broker_state(record).await,
            None => {
                let inspection = self.broker.inspect(&TaskId::new(job_id)).await;
                if inspection.state == TaskState::Unknown
                    && self.bus.latest(job_id).await?.is_none()
                {
                    self.metrics.record_error("not_found");
                    return Err(ServiceError::NotFound(job_id.to_string()));
                }
                synthesize_record(job_id, inspection.state, self.clock.epoch_ms())
            }
        };

        if record.status == JobStatus::Completed {
            self.release_dependents(job_id).await;
        }
        Ok(record)
    }

    /// Cancel a job. Idempotent: a terminal job is returned unchanged.
    pub async fn cancel(&self, job_id: &str) -> Result<JobRecord, ServiceError> {
        let record = self
            .store
            .get(job_id)
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))?;
        if record.status.is_terminal() {
            return Ok(record);
        }

        let now_ms = self.clock.epoch_ms();
        self.store.update(job_id, |record| {
            record.set_status(JobStatus::Cancelling, now_ms);
        });
        // A job still held for dependencies must not come back when its
        // upstream completes.
        self.scheduler.drop_waiting(job_id).await?;
        self.broker.revoke(&TaskId::new(job_id), true).await?;

        let record = self
            .store
            .update(job_id, |record| {
                record.set_status(JobStatus::Cancelled, now_ms);
                record.message = Some("job was cancelled by user".to_string());
            })
            .ok_or_else(|| ServiceError::NotFound(job_id.to_string()))?;
        self.metrics.record_job(JobStatus::Cancelled);

        let event = ProgressEvent::new(
            JobId::new(job_id),
            record.current_step.clone().unwrap_or_else(|| "cancelled".to_string()),
            StepStatus::Cancelled,
            0.0,
            record.overall_progress,
            now_ms,
        )
        .with_message("job was cancelled by user");
        self.bus.publish(&event).await?;

        tracing::info!(job_id = %job_id, "job cancelled");
        Ok(record)
    }

    /// List jobs with filtering, sorting, and pagination.
    pub fn list(&self, request: &ListRequest) -> Result<JobPage, ServiceError> {
        let mut statuses = Vec::new();
        for raw in &request.statuses {
            let status: JobStatus = serde_json::from_value(serde_json::Value::String(raw.clone()))
                .map_err(|_| ValidationError::InvalidStatusFilter(raw.clone()))?;
            statuses.push(status);
        }
        let query = ListQuery {
            statuses,
            limit: request.limit.unwrap_or(10).clamp(1, 100),
            offset: request.offset.unwrap_or(0),
            sort_by: match &request.sort_by {
                Some(raw) => SortField::parse(raw)?,
                None => SortField::CreatedAt,
            },
            sort_order: match &request.sort_order {
                Some(raw) => SortOrder::parse(raw),
                None => SortOrder::Desc,
            },
        };
        Ok(self.store.list(&query))
    }

    /// Whether a job id is known to any of the service's views.
    pub async fn exists(&self, job_id: &str) -> bool {
        if self.store.contains(job_id) {
            return true;
        }
        if matches!(self.bus.latest(job_id).await, Ok(Some(_))) {
            return true;
        }
        self.broker.inspect(&TaskId::new(job_id)).await.state != TaskState::Unknown
    }

    /// Run the dependent-release scan for a completed job and resubmit
    /// everything it released.
    pub async fn release_dependents(&self, completed_job_id: &str) {
        let released = self.scheduler.release_ready(completed_job_id).await;
        for (held_id, request) in released {
            tracing::info!(job_id = %held_id, "dependencies complete, submitting held job");
            let mut request = request;
            request.dependencies = Vec::new();
            if let Err(e) = self.submit(request, Some(held_id.clone())).await {
                tracing::error!(job_id = %held_id, error = %e, "failed to submit released job");
            }
        }
    }

    /// Background loop: watch the bus firehose and release dependents as
    /// soon as any job publishes its terminal completed event.
    pub async fn run_release_loop(self: Arc<Self>) {
        let mut events = self.bus.events();
        loop {
            match events.recv().await {
                Ok(event) => {
                    if event.status == StepStatus::Completed && event.is_job_terminal() {
                        self.release_dependents(event.job_id.as_str()).await;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "release loop lagged behind progress events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    fn validate(&self, request: &IngestionRequest) -> Result<(), ValidationError> {
        request.validate()?;
        for name in request.step_names() {
            if !self.registry.knows(&name) {
                return Err(ValidationError::UnknownStep(name));
            }
        }
        Ok(())
    }

    fn record_from_request(
        &self,
        job_id: &JobId,
        request: &IngestionRequest,
        now_ms: u64,
    ) -> JobRecord {
        let step_configs = request
            .step_names()
            .into_iter()
            .map(StepConfig::new)
            .collect();
        let mut record = JobRecord::new(
            job_id.clone(),
            request.source_type,
            request.source.clone(),
            step_configs,
            now_ms,
        );
        record.branch = request.branch.clone();
        record.priority = request.priority;
        record.dependencies = request.dependencies.clone();
        record.eta = request.eta;
        record.countdown_seconds = request.countdown;
        record.created_by = request.created_by.clone();
        record.tags = request.tags.clone();
        record
    }

    /// A revoked task forces the record to cancelled even if the
    /// orchestrator never got to write the transition.
    async fn overlay_broker_state(&self, record: JobRecord) -> JobRecord {
        if record.status.is_terminal() {
            return record;
        }
        let inspection = self.broker.inspect(&TaskId::new(record.job_id.as_str())).await;
        if inspection.state == TaskState::Revoked {
            let now_ms = self.clock.epoch_ms();
            return self
                .store
                .update(record.job_id.as_str(), |record| {
                    record.set_status(JobStatus::Cancelled, now_ms);
                })
                .unwrap_or(record);
        }
        record
    }
}

/// Build per-step configs from the request: global retry block merged in,
/// per-step knobs lifted out of the options, and the option allow-list
/// applied per step.
fn build_step_configs(request: &IngestionRequest) -> Vec<StepConfig> {
    let policy = request.retry_policy();
    let options = request.options.clone().unwrap_or_else(JsonMap::new);
    request
        .step_names()
        .into_iter()
        .map(|name| {
            let mut config = StepConfig::from_options(&name, &options, policy);
            config.options = filter_options(&name, &config.options);
            config
        })
        .collect()
}

/// Minimal record for a job the broker knows but the store does not
/// (e.g. after a restart).
fn synthesize_record(job_id: &str, state: TaskState, now_ms: u64) -> JobRecord {
    let status = match state {
        TaskState::Pending => JobStatus::Pending,
        TaskState::Running => JobStatus::Running,
        TaskState::Success => JobStatus::Completed,
        TaskState::Failure => JobStatus::Failed,
        TaskState::Revoked => JobStatus::Cancelled,
        TaskState::Unknown => JobStatus::Unknown,
    };
    let mut record = JobRecord::new(
        JobId::new(job_id),
        codeloom_core::SourceKind::LocalPath,
        String::new(),
        Vec::new(),
        now_ms,
    );
    record.status = status;
    if status == JobStatus::Completed {
        record.overall_progress = 100.0;
    }
    record
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
