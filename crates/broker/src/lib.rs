// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! codeloom-broker: dispatches pipeline work to a worker fleet.
//!
//! The [`TaskBroker`] trait captures the semantics the deployment's
//! message system must provide (three priority queues, at-most-once
//! dispatch, revocation, JSON-only payloads). [`LocalBroker`] is the
//! bundled in-process implementation: a pool of tokio worker tasks,
//! each fetching one task at a time.

pub mod broker;
pub mod local;
pub mod task;

pub use broker::{BrokerError, TaskBroker, TaskExecutor, TaskFailure, TaskHandle};
pub use local::{LocalBroker, LocalBrokerConfig};
pub use task::{
    QueueName, TaskInspection, TaskOptions, TaskPayload, TaskState, WorkerFleet, TASK_KINDS,
};
