// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker and executor trait seams.

use crate::task::{TaskInspection, TaskOptions, TaskPayload, TaskState, WorkerFleet};
use async_trait::async_trait;
use codeloom_core::TaskId;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("task broker unreachable: {0}")]
    Unreachable(String),

    #[error("failed to serialize task payload: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A task execution failure, carried into the task's FAILURE state.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TaskFailure(pub String);

/// Executes one task payload inside a worker.
///
/// The engine provides the implementation; the broker only routes.
/// A cancelled token means cooperative shutdown was requested.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        payload: TaskPayload,
        cancel: CancellationToken,
    ) -> Result<Value, TaskFailure>;
}

/// Handle to one dispatched task.
pub struct TaskHandle {
    id: TaskId,
    state_rx: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, state_rx: watch::Receiver<TaskState>) -> Self {
        Self { id, state_rx }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn state(&self) -> TaskState {
        *self.state_rx.borrow()
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait(&mut self) -> TaskState {
        loop {
            let state = *self.state_rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if self.state_rx.changed().await.is_err() {
                // Broker dropped: report what we last saw.
                return *self.state_rx.borrow();
            }
        }
    }
}

/// Dispatches work to the worker fleet.
#[async_trait]
pub trait TaskBroker: Send + Sync {
    /// Submit a task. At most one worker will ever execute this
    /// submission.
    async fn dispatch(
        &self,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> Result<TaskHandle, BrokerError>;

    /// Inspect a task. Broker errors surface as `Unknown`, never as
    /// failure; re-dispatch is the caller's choice.
    async fn inspect(&self, task_id: &TaskId) -> TaskInspection;

    /// Revoke a task. `terminate` kills the running task; otherwise a
    /// cooperative shutdown is requested.
    async fn revoke(&self, task_id: &TaskId, terminate: bool) -> Result<(), BrokerError>;

    /// Worker fleet summary for health checks.
    async fn inspect_workers(&self) -> Result<WorkerFleet, BrokerError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), BrokerError>;
}
