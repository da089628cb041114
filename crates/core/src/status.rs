// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step and job status machines.

use serde::{Deserialize, Serialize};

/// Status of a single pipeline step.
///
/// `Stopped` is a cooperative shutdown; `Cancelled` is forced.
/// Both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting to start
    Pending,
    /// Step is executing in a worker
    Running,
    /// Step completed
    Completed,
    /// Step failed
    Failed,
    /// Step was asked to shut down and complied
    Stopped,
    /// Step was forcibly terminated
    Cancelled,
}

impl StepStatus {
    /// Check if this status is terminal (will never change again).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Stopped | StepStatus::Cancelled
        )
    }
}

crate::simple_display! {
    StepStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
        Cancelled => "cancelled",
    }
}

/// Status of an ingestion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Cancellation was requested but the broker has not confirmed yet
    Cancelling,
    /// The broker could not be reached or the task is not known to it
    Unknown,
}

impl JobStatus {
    /// Check if this status is terminal (will never change again).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Cancelling => "cancelling",
        Unknown => "unknown",
    }
}

/// Derive a job-level terminal status from the terminal statuses of its steps.
///
/// `failed` dominates `cancelled` dominates `completed`; a `stopped` step
/// counts as `cancelled` for the job.
pub fn dominant_job_status<I>(steps: I) -> JobStatus
where
    I: IntoIterator<Item = StepStatus>,
{
    let mut saw_cancelled = false;
    for status in steps {
        match status {
            StepStatus::Failed => return JobStatus::Failed,
            StepStatus::Cancelled | StepStatus::Stopped => saw_cancelled = true,
            _ => {}
        }
    }
    if saw_cancelled {
        JobStatus::Cancelled
    } else {
        JobStatus::Completed
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
