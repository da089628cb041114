// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step configuration, progress tracking, and the result record a
//! step runner hands back across the task boundary.

use crate::id::JobId;
use crate::status::StepStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// JSON object type used for step options and step result payloads.
pub type JsonMap = serde_json::Map<String, Value>;

/// Retry ceiling applied to exponential backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Retry settings merged into every step config; per-step values win.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub back_off_seconds: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, back_off_seconds: 10 }
    }
}

impl RetryPolicy {
    /// Backoff before retry `attempt` (0-based): `back_off_seconds * 2^attempt`,
    /// capped at five minutes.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let secs = self.back_off_seconds.saturating_mul(factor);
        Duration::from_secs(secs).min(MAX_BACKOFF)
    }
}

/// Configuration for one step of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,
    /// Options forwarded to the step (after per-step filtering).
    #[serde(default)]
    pub options: JsonMap,
    pub max_retries: u32,
    pub back_off_seconds: u64,
    /// When true, a failed step does not stop the pipeline.
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl StepConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_policy(name, RetryPolicy::default())
    }

    pub fn with_policy(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            options: JsonMap::new(),
            max_retries: policy.max_retries,
            back_off_seconds: policy.back_off_seconds,
            continue_on_failure: false,
        }
    }

    /// Build a step config from request options.
    ///
    /// The retry/continue keys (`max_retries`, `back_off_seconds`,
    /// `continue_on_failure`) are control knobs for the orchestrator, not
    /// step parameters: they are lifted out of `options` and never
    /// forwarded to the step.
    pub fn from_options(name: impl Into<String>, options: &JsonMap, policy: RetryPolicy) -> Self {
        let mut config = Self::with_policy(name, policy);
        for (key, value) in options {
            match key.as_str() {
                "max_retries" => {
                    if let Some(n) = value.as_u64() {
                        config.max_retries = n as u32;
                    }
                }
                "back_off_seconds" => {
                    if let Some(n) = value.as_u64() {
                        config.back_off_seconds = n;
                    }
                }
                "continue_on_failure" => {
                    if let Some(b) = value.as_bool() {
                        config.continue_on_failure = b;
                    }
                }
                _ => {
                    config.options.insert(key.clone(), value.clone());
                }
            }
        }
        config
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy { max_retries: self.max_retries, back_off_seconds: self.back_off_seconds }
    }
}

/// Progress of one step within one job.
///
/// Created on first execution, then mutated only by the step that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub name: String,
    pub status: StepStatus,
    /// Completion percentage in [0, 100].
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StepProgress {
    /// A step that has not started yet.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Pending,
            progress: 0.0,
            message: None,
            error: None,
            started_at_ms: None,
            completed_at_ms: None,
            duration_seconds: None,
            cpu_percent: None,
            memory_mb: None,
            retry_count: 0,
            last_error: None,
        }
    }
}

/// Result record a step runner returns across the task boundary.
///
/// Runners never raise out of a task: every outcome, including an
/// execution error, becomes one of these. Extra keys returned by the
/// step's `run` are carried in `extra` (flattened on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub status: StepStatus,
    pub job_id: JobId,
    pub repository_path: String,
    #[serde(rename = "start_time")]
    pub start_time_ms: u64,
    #[serde(rename = "end_time")]
    pub end_time_ms: u64,
    #[serde(rename = "duration")]
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub extra: JsonMap,
}

/// Keys a step's returned mapping may not override in the runner's record.
pub const RESERVED_RESULT_KEYS: [&str; 4] = ["step", "repository_path", "start_time", "task_id"];

impl StepResult {
    /// Merge a step's returned value into this record.
    ///
    /// A mapping is merged key-by-key minus the reserved keys; anything
    /// else is stored as `{"job_id": value}` rather than failing.
    pub fn merge_step_output(&mut self, output: Value) {
        match output {
            Value::Object(map) => {
                for (key, value) in map {
                    if RESERVED_RESULT_KEYS.contains(&key.as_str()) {
                        continue;
                    }
                    match key.as_str() {
                        "status" => {
                            if let Ok(status) = serde_json::from_value::<StepStatus>(value.clone())
                            {
                                self.status = status;
                            }
                        }
                        "error" => {
                            if let Some(message) = value.as_str() {
                                self.error = Some(message.to_string());
                            }
                        }
                        "job_id" => {
                            if let Some(id) = value.as_str() {
                                self.job_id = JobId::new(id);
                            }
                        }
                        _ => {
                            self.extra.insert(key, value);
                        }
                    }
                }
            }
            other => {
                self.extra.insert("job_id".to_string(), other);
            }
        }
    }

    /// Project this result onto a step progress record.
    pub fn to_progress(&self, retry_count: u32) -> StepProgress {
        let progress = match self.status {
            StepStatus::Completed => 100.0,
            _ => self
                .extra
                .get("progress")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        };
        StepProgress {
            name: self.step.clone(),
            status: self.status,
            progress,
            message: self.extra.get("message").and_then(Value::as_str).map(String::from),
            error: self.error.clone(),
            started_at_ms: Some(self.start_time_ms),
            completed_at_ms: Some(self.end_time_ms),
            duration_seconds: Some(self.duration_seconds),
            cpu_percent: self.extra.get("cpu_percent").and_then(Value::as_f64),
            memory_mb: self.extra.get("memory_mb").and_then(Value::as_f64),
            retry_count,
            last_error: self.error.clone(),
        }
    }
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
