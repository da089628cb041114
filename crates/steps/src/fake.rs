// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scriptable fake step for tests.

use crate::step::{PipelineStep, StepError, StepReport};
use async_trait::async_trait;
use codeloom_core::{JsonMap, StepStatus};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

/// What the next `run` call should do.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Succeed(Value),
    Fail(String),
}

/// A step whose outcomes are scripted and whose invocations are recorded.
///
/// Scripted outcomes are consumed front to back; once the script is
/// exhausted, runs succeed with an empty object.
pub struct FakeStep {
    outcomes: Mutex<VecDeque<FakeOutcome>>,
    invocations: Mutex<Vec<JsonMap>>,
    delay: Duration,
}

impl FakeStep {
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Sleep this long inside `run` (cancellation and timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push_outcome(&self, outcome: FakeOutcome) -> &Self {
        self.outcomes.lock().push_back(outcome);
        self
    }

    pub fn succeed_with(&self, value: Value) -> &Self {
        self.push_outcome(FakeOutcome::Succeed(value))
    }

    pub fn fail_with(&self, error: impl Into<String>) -> &Self {
        self.push_outcome(FakeOutcome::Fail(error.into()))
    }

    /// Option maps received by `run`, in call order.
    pub fn recorded_options(&self) -> Vec<JsonMap> {
        self.invocations.lock().clone()
    }

    pub fn run_count(&self) -> usize {
        self.invocations.lock().len()
    }
}

impl Default for FakeStep {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStep for FakeStep {
    async fn run(&self, _repository_path: &str, options: &JsonMap) -> Result<Value, StepError> {
        self.invocations.lock().push(options.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = self.outcomes.lock().pop_front();
        match outcome {
            Some(FakeOutcome::Succeed(value)) => Ok(value),
            Some(FakeOutcome::Fail(error)) => Err(StepError::Execution(error)),
            None => Ok(json!({})),
        }
    }

    async fn status(&self, _run_id: &str) -> Result<StepReport, StepError> {
        Ok(StepReport::with_status(StepStatus::Running))
    }

    async fn stop(&self, _run_id: &str) -> Result<StepReport, StepError> {
        Ok(StepReport::with_status(StepStatus::Stopped))
    }

    async fn cancel(&self, _run_id: &str) -> Result<StepReport, StepError> {
        Ok(StepReport::with_status(StepStatus::Cancelled))
    }

    async fn ingestion_update(
        &self,
        repository_path: &str,
        options: &JsonMap,
    ) -> Result<Value, StepError> {
        self.run(repository_path, options).await
    }
}
