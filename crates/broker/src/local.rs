// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process broker: priority queues plus a pool of worker tasks.
//!
//! Each worker fetches one task at a time (prefetch = 1), so a long
//! task never blocks a queued one behind the same worker. Payloads are
//! stored serialized; a worker deserializes at claim time, keeping the
//! JSON-only contract honest even in-process.

use crate::broker::{BrokerError, TaskBroker, TaskExecutor, TaskHandle};
use crate::task::{
    QueueName, TaskInspection, TaskOptions, TaskPayload, TaskState, WorkerFleet, TASK_KINDS,
};
use async_trait::async_trait;
use codeloom_core::{Clock, SystemClock, TaskId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Tuning for the local broker.
#[derive(Debug, Clone)]
pub struct LocalBrokerConfig {
    /// Worker pool size. Must be at least 2 so an orchestrate task can
    /// await the run_step tasks it dispatches.
    pub concurrency: usize,
    /// Hard wall-clock budget per task.
    pub task_timeout: Duration,
}

impl Default for LocalBrokerConfig {
    fn default() -> Self {
        Self { concurrency: 4, task_timeout: Duration::from_secs(3600) }
    }
}

struct TaskEntry {
    queue: QueueName,
    payload: Value,
    state: TaskState,
    state_tx: watch::Sender<TaskState>,
    result: Option<Value>,
    error: Option<String>,
    cancel: CancellationToken,
    abort: Option<AbortHandle>,
    terminate_requested: bool,
}

struct Inner {
    queues: Mutex<[VecDeque<TaskId>; 3]>,
    tasks: Mutex<HashMap<TaskId, TaskEntry>>,
    wake: Notify,
    task_timeout: Duration,
    workers: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl Inner {
    fn enqueue(&self, task_id: TaskId) {
        {
            let mut queues = self.queues.lock();
            let queue = {
                let tasks = self.tasks.lock();
                match tasks.get(&task_id) {
                    Some(entry) if entry.state == TaskState::Pending => entry.queue,
                    // Revoked or gone while delayed: drop silently.
                    _ => return,
                }
            };
            queues[queue.index()].push_back(task_id);
        }
        self.wake.notify_one();
    }

    /// Claim the next runnable task, highest priority first.
    /// Pending → Running happens under the lock: at-most-once dispatch.
    fn claim_next(&self) -> Option<(TaskId, Value, CancellationToken)> {
        let mut queues = self.queues.lock();
        let mut tasks = self.tasks.lock();
        for queue in &mut *queues {
            while let Some(task_id) = queue.pop_front() {
                let Some(entry) = tasks.get_mut(&task_id) else { continue };
                if entry.state != TaskState::Pending {
                    continue;
                }
                entry.state = TaskState::Running;
                let _ = entry.state_tx.send(TaskState::Running);
                return Some((task_id, entry.payload.clone(), entry.cancel.clone()));
            }
        }
        None
    }

    fn finish(&self, task_id: &TaskId, state: TaskState, result: Option<Value>, error: Option<String>) {
        let mut tasks = self.tasks.lock();
        if let Some(entry) = tasks.get_mut(task_id) {
            entry.state = state;
            entry.result = result;
            entry.error = error;
            entry.abort = None;
            let _ = entry.state_tx.send(state);
        }
    }

    async fn run_one(
        &self,
        executor: &Arc<dyn TaskExecutor>,
        task_id: TaskId,
        payload: Value,
        cancel: CancellationToken,
    ) {
        let payload: TaskPayload = match serde_json::from_value(payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.finish(
                    &task_id,
                    TaskState::Failure,
                    None,
                    Some(format!("malformed task payload: {e}")),
                );
                return;
            }
        };

        tracing::info!(task_id = %task_id, kind = payload.kind(), job_id = %payload.job_id(), "task started");

        let exec = Arc::clone(executor);
        let token = cancel.clone();
        let join = tokio::spawn(async move { exec.execute(payload, token).await });
        let abort = join.abort_handle();

        // Publish the abort handle, honoring a terminate that raced us.
        {
            let mut tasks = self.tasks.lock();
            if let Some(entry) = tasks.get_mut(&task_id) {
                entry.abort = Some(join.abort_handle());
                if entry.terminate_requested {
                    join.abort();
                }
            }
        }

        match tokio::time::timeout(self.task_timeout, join).await {
            Err(_elapsed) => {
                abort.abort();
                self.finish(
                    &task_id,
                    TaskState::Failure,
                    None,
                    Some(format!(
                        "task timed out after {}s",
                        self.task_timeout.as_secs()
                    )),
                );
                tracing::warn!(task_id = %task_id, "task timed out");
            }
            Ok(Err(join_error)) if join_error.is_cancelled() => {
                self.finish(&task_id, TaskState::Revoked, None, None);
                tracing::info!(task_id = %task_id, "task revoked");
            }
            Ok(Err(join_error)) => {
                self.finish(
                    &task_id,
                    TaskState::Failure,
                    None,
                    Some(format!("task aborted: {join_error}")),
                );
            }
            Ok(Ok(Ok(value))) => {
                self.finish(&task_id, TaskState::Success, Some(value), None);
                tracing::info!(task_id = %task_id, "task succeeded");
            }
            Ok(Ok(Err(failure))) => {
                if cancel.is_cancelled() {
                    self.finish(&task_id, TaskState::Revoked, None, Some(failure.0));
                } else {
                    tracing::warn!(task_id = %task_id, error = %failure, "task failed");
                    self.finish(&task_id, TaskState::Failure, None, Some(failure.0));
                }
            }
        }
    }

    async fn worker_loop(self: Arc<Self>, executor: Arc<dyn TaskExecutor>) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            match self.claim_next() {
                Some((task_id, payload, cancel)) => {
                    self.run_one(&executor, task_id, payload, cancel).await;
                }
                None => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.wake.notified() => {}
                    }
                }
            }
        }
    }
}

/// The bundled [`TaskBroker`] implementation.
pub struct LocalBroker<C: Clock = SystemClock> {
    inner: Arc<Inner>,
    config: LocalBrokerConfig,
    clock: C,
}

impl LocalBroker<SystemClock> {
    pub fn new(config: LocalBrokerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> LocalBroker<C> {
    pub fn with_clock(config: LocalBrokerConfig, clock: C) -> Self {
        let inner = Inner {
            queues: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            tasks: Mutex::new(HashMap::new()),
            wake: Notify::new(),
            task_timeout: config.task_timeout,
            workers: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
        };
        Self { inner: Arc::new(inner), config, clock }
    }

    /// Spawn the worker pool. Tasks dispatched earlier start draining
    /// immediately.
    pub fn start_workers(&self, executor: Arc<dyn TaskExecutor>) {
        let mut workers = self.inner.workers.lock();
        for _ in 0..self.config.concurrency {
            let inner = Arc::clone(&self.inner);
            let executor = Arc::clone(&executor);
            workers.push(tokio::spawn(inner.worker_loop(executor)));
        }
        // Wake everyone in case work was queued before start.
        self.inner.wake.notify_waiters();
    }

    /// Stop accepting work and wait for workers to wind down.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();
        self.inner.wake.notify_waiters();
        let workers: Vec<_> = std::mem::take(&mut *self.inner.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }

    fn dispatch_delay(&self, options: &TaskOptions) -> Duration {
        if let Some(eta) = options.eta {
            let eta_ms = eta.saturating_mul(1_000);
            return Duration::from_millis(eta_ms.saturating_sub(self.clock.epoch_ms()));
        }
        Duration::from_secs(options.countdown_seconds.unwrap_or(0))
    }
}

#[async_trait]
impl<C: Clock> TaskBroker for LocalBroker<C> {
    async fn dispatch(
        &self,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> Result<TaskHandle, BrokerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrokerError::Unreachable("broker is stopped".to_string()));
        }
        let task_id = options.task_id.clone().unwrap_or_else(TaskId::generate);
        let payload = serde_json::to_value(&payload)?;
        let queue = options.queue.unwrap_or(QueueName::Default);
        let (state_tx, state_rx) = watch::channel(TaskState::Pending);

        self.inner.tasks.lock().insert(
            task_id.clone(),
            TaskEntry {
                queue,
                payload,
                state: TaskState::Pending,
                state_tx,
                result: None,
                error: None,
                cancel: CancellationToken::new(),
                abort: None,
                terminate_requested: false,
            },
        );

        let delay = self.dispatch_delay(&options);
        if delay.is_zero() {
            self.inner.enqueue(task_id.clone());
        } else {
            let inner = Arc::clone(&self.inner);
            let delayed_id = task_id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.enqueue(delayed_id);
            });
        }
        tracing::debug!(task_id = %task_id, queue = %queue, "task dispatched");
        Ok(TaskHandle::new(task_id, state_rx))
    }

    async fn inspect(&self, task_id: &TaskId) -> TaskInspection {
        let tasks = self.inner.tasks.lock();
        match tasks.get(task_id) {
            Some(entry) => TaskInspection {
                state: entry.state,
                info: None,
                result: entry.result.clone(),
                error: entry.error.clone(),
            },
            None => TaskInspection::unknown(),
        }
    }

    async fn revoke(&self, task_id: &TaskId, terminate: bool) -> Result<(), BrokerError> {
        let mut tasks = self.inner.tasks.lock();
        let Some(entry) = tasks.get_mut(task_id) else {
            return Ok(());
        };
        match entry.state {
            state if state.is_terminal() => {}
            TaskState::Pending => {
                entry.state = TaskState::Revoked;
                let _ = entry.state_tx.send(TaskState::Revoked);
                tracing::info!(task_id = %task_id, "queued task revoked");
            }
            _ => {
                if terminate {
                    entry.terminate_requested = true;
                    if let Some(abort) = &entry.abort {
                        abort.abort();
                    }
                } else {
                    entry.cancel.cancel();
                }
            }
        }
        Ok(())
    }

    async fn inspect_workers(&self) -> Result<WorkerFleet, BrokerError> {
        let workers = self.inner.workers.lock();
        let active_count = workers.iter().filter(|worker| !worker.is_finished()).count();
        let registered_task_count = active_count * TASK_KINDS.len();
        Ok(WorkerFleet { active_count, registered_task_count })
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrokerError::Unreachable("broker is stopped".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
