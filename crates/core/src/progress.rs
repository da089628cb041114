// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress events published from workers to subscribers.

use crate::id::JobId;
use crate::status::StepStatus;
use serde::{Deserialize, Serialize};

/// One progress update for one job.
///
/// Serialized as-is onto the progress channel and the latest-value cache,
/// and delivered verbatim to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// Step the event refers to (a step name, or a phase marker such as
    /// "initializing" before the first step starts).
    pub step: String,
    pub status: StepStatus,
    pub progress: f64,
    pub overall_progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    /// Epoch milliseconds at publish time.
    pub timestamp: u64,
}

impl ProgressEvent {
    pub fn new(
        job_id: JobId,
        step: impl Into<String>,
        status: StepStatus,
        progress: f64,
        overall_progress: f64,
        timestamp: u64,
    ) -> Self {
        Self {
            job_id,
            step: step.into(),
            status,
            progress,
            overall_progress,
            message: None,
            cpu_percent: None,
            memory_mb: None,
            timestamp,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether this event marks the end of the whole job.
    ///
    /// A completed step only ends the job once overall progress reached
    /// 100; failure, stop, and cancellation end it immediately.
    pub fn is_job_terminal(&self) -> bool {
        match self.status {
            StepStatus::Completed => self.overall_progress >= 100.0,
            StepStatus::Failed | StepStatus::Stopped | StepStatus::Cancelled => true,
            StepStatus::Pending | StepStatus::Running => false,
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
