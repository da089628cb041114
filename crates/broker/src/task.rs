// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task payloads, states, and dispatch options.

use codeloom_core::{JobId, Priority, StepConfig, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Task names workers register; part of the broker contract.
pub const TASK_KINDS: [&str; 2] = ["run_step", "orchestrate_pipeline"];

/// A unit of work the broker can hand to a worker.
///
/// Payloads are JSON on the wire; richer values must be pre-flattened
/// into the step configs before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Execute one step of one job.
    RunStep {
        repository_path: String,
        step_name: String,
        step_config: StepConfig,
        job_id: JobId,
    },

    /// Drive the ordered step list of one job.
    OrchestratePipeline {
        repository_path: String,
        step_configs: Vec<StepConfig>,
        job_id: JobId,
    },
}

impl TaskPayload {
    pub fn job_id(&self) -> &JobId {
        match self {
            TaskPayload::RunStep { job_id, .. } => job_id,
            TaskPayload::OrchestratePipeline { job_id, .. } => job_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::RunStep { .. } => "run_step",
            TaskPayload::OrchestratePipeline { .. } => "orchestrate_pipeline",
        }
    }
}

/// Broker-level task state.
///
/// `Unknown` means the broker could not be reached or has no record of
/// the task; callers must not treat it as failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Failure,
    Revoked,
    Unknown,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure | TaskState::Revoked)
    }
}

codeloom_core::simple_display! {
    TaskState {
        Pending => "PENDING",
        Running => "RUNNING",
        Success => "SUCCESS",
        Failure => "FAILURE",
        Revoked => "REVOKED",
        Unknown => "UNKNOWN",
    }
}

/// The three named queues. Workers drain them in strict priority order;
/// there is no cross-queue rebalancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    High,
    Default,
    Low,
}

impl QueueName {
    /// Claim order for workers.
    pub const ALL: [QueueName; 3] = [QueueName::High, QueueName::Default, QueueName::Low];

    pub fn index(&self) -> usize {
        match self {
            QueueName::High => 0,
            QueueName::Default => 1,
            QueueName::Low => 2,
        }
    }
}

impl From<Priority> for QueueName {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::High => QueueName::High,
            Priority::Default => QueueName::Default,
            Priority::Low => QueueName::Low,
        }
    }
}

codeloom_core::simple_display! {
    QueueName {
        High => "high",
        Default => "default",
        Low => "low",
    }
}

/// Options for one dispatch.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub queue: Option<QueueName>,
    /// Absolute start time (epoch seconds).
    pub eta: Option<u64>,
    /// Relative start delay; ignored when `eta` is set.
    pub countdown_seconds: Option<u64>,
    /// Caller-chosen task id (the job service reuses the job id).
    pub task_id: Option<TaskId>,
}

impl TaskOptions {
    pub fn queue(mut self, queue: QueueName) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn eta(mut self, eta: u64) -> Self {
        self.eta = Some(eta);
        self
    }

    pub fn countdown_seconds(mut self, secs: u64) -> Self {
        self.countdown_seconds = Some(secs);
        self
    }

    pub fn task_id(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }
}

/// Snapshot of one task, as reported by `inspect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInspection {
    pub state: TaskState,
    /// In-flight progress payload, when the worker reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    /// Final result, once the task succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskInspection {
    pub fn unknown() -> Self {
        Self { state: TaskState::Unknown, info: None, result: None, error: None }
    }
}

/// Worker fleet summary for health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFleet {
    pub active_count: usize,
    pub registered_task_count: usize,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
