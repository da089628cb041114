// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and its derived-field maintenance.

use crate::id::JobId;
use crate::request::{Priority, SourceKind};
use crate::status::{JobStatus, StepStatus};
use crate::step::{StepConfig, StepProgress};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One ingestion run: an ordered sequence of steps plus derived state.
///
/// Created by the job service, mutated only by the orchestrator
/// (job-level transitions) and the step runner (per-step updates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub source_kind: SourceKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub status: JobStatus,
    /// Mean progress of the steps that have started, in [0, 100].
    pub overall_progress: f64,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub step_configs: Vec<StepConfig>,
    /// Per-step progress, in pipeline order.
    #[serde(default)]
    pub steps: IndexMap<String, StepProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Requested absolute start time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a pending job with every configured step initialized to pending.
    pub fn new(
        job_id: JobId,
        source_kind: SourceKind,
        source: impl Into<String>,
        step_configs: Vec<StepConfig>,
        now_ms: u64,
    ) -> Self {
        let steps = step_configs
            .iter()
            .map(|config| (config.name.clone(), StepProgress::pending(&config.name)))
            .collect();
        Self {
            job_id,
            source_kind,
            source: source.into(),
            branch: None,
            status: JobStatus::Pending,
            overall_progress: 0.0,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            started_at_ms: None,
            completed_at_ms: None,
            duration_seconds: None,
            step_configs,
            steps,
            current_step: None,
            priority: Priority::default(),
            dependencies: Vec::new(),
            eta: None,
            countdown_seconds: None,
            created_by: None,
            tags: Vec::new(),
            message: None,
            result: None,
            error: None,
        }
    }

    /// Names of the configured steps, in pipeline order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.step_configs.iter().map(|config| config.name.as_str())
    }

    /// Transition the job status.
    ///
    /// Terminal statuses are monotonic: once set, the status never changes
    /// again. Returns whether the transition was applied.
    pub fn set_status(&mut self, status: JobStatus, now_ms: u64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.updated_at_ms = now_ms;
        match status {
            JobStatus::Running => {
                if self.started_at_ms.is_none() {
                    self.started_at_ms = Some(now_ms);
                }
            }
            _ if status.is_terminal() => {
                self.completed_at_ms = Some(now_ms);
                if let Some(started) = self.started_at_ms {
                    self.duration_seconds = Some(now_ms.saturating_sub(started) as f64 / 1_000.0);
                }
            }
            _ => {}
        }
        true
    }

    /// Merge a step's progress into the record and refresh derived fields.
    ///
    /// If the step ended `failed`, the job becomes `failed` with an error
    /// naming the step, unless its config says to continue on failure.
    pub fn absorb_step(&mut self, progress: StepProgress, now_ms: u64) {
        self.current_step = Some(progress.name.clone());
        let failed = progress.status == StepStatus::Failed;
        let step_name = progress.name.clone();
        let step_error = progress.error.clone();
        self.steps.insert(step_name.clone(), progress);
        self.recompute_overall_progress();
        self.updated_at_ms = now_ms;

        if failed && !self.continues_on_failure(&step_name) {
            let detail = step_error.unwrap_or_else(|| "unknown error".to_string());
            self.error = Some(format!("Step '{step_name}' failed: {detail}"));
            self.set_status(JobStatus::Failed, now_ms);
        }
    }

    fn continues_on_failure(&self, step_name: &str) -> bool {
        self.step_configs
            .iter()
            .find(|config| config.name == step_name)
            .map(|config| config.continue_on_failure)
            .unwrap_or(false)
    }

    /// Recompute `overall_progress` as the mean progress of non-pending
    /// steps; exactly 100 when every step completed.
    pub fn recompute_overall_progress(&mut self) {
        let started: Vec<f64> = self
            .steps
            .values()
            .filter(|step| step.status != StepStatus::Pending)
            .map(|step| step.progress)
            .collect();
        if !started.is_empty() {
            self.overall_progress = started.iter().sum::<f64>() / started.len() as f64;
        }
        if !self.steps.is_empty()
            && self.steps.values().all(|step| step.status == StepStatus::Completed)
        {
            self.overall_progress = 100.0;
        }
    }

    /// First step that ended `failed`, in pipeline order.
    pub fn first_failed_step(&self) -> Option<&StepProgress> {
        self.steps.values().find(|step| step.status == StepStatus::Failed)
    }
}

/// Test builder for job records.
#[cfg(any(test, feature = "test-support"))]
pub struct JobRecordBuilder {
    job_id: JobId,
    source: String,
    steps: Vec<StepConfig>,
    status: JobStatus,
    now_ms: u64,
}

#[cfg(any(test, feature = "test-support"))]
impl Default for JobRecordBuilder {
    fn default() -> Self {
        Self {
            job_id: JobId::new("job-test"),
            source: "/repo".to_string(),
            steps: vec![StepConfig::new("filesystem")],
            status: JobStatus::Pending,
            now_ms: 1_000_000,
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobRecordBuilder {
    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.job_id = JobId::new(id);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn steps(mut self, names: &[&str]) -> Self {
        self.steps = names.iter().map(|name| StepConfig::new(*name)).collect();
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn now_ms(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    pub fn build(self) -> JobRecord {
        let mut record = JobRecord::new(
            self.job_id,
            SourceKind::LocalPath,
            self.source,
            self.steps,
            self.now_ms,
        );
        record.status = self.status;
        record
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobRecord {
    /// Create a builder with test defaults.
    pub fn builder() -> JobRecordBuilder {
        JobRecordBuilder::default()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
