// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency scheduler: holds jobs until their upstream jobs complete.
//!
//! Held requests live at `waiting:<job_id>` in the key-value store. A
//! completed job triggers a scan: every waiting entry naming it gets its
//! full dependency list re-checked against the latest-value cache, and
//! entries whose dependencies all completed are released for
//! resubmission.
//!
//! No deadlock or cycle detection: a failed dependency leaves its
//! dependents waiting until the entry's TTL runs out. Callers observe
//! upstream failure and cancel dependents explicitly.

use codeloom_core::{IngestionRequest, JobId};
use codeloom_storage::{keys, KeyValueStore, ProgressBus, StorageError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// How long a held request survives without resolution.
pub const WAITING_TTL: Duration = Duration::from_secs(24 * 3600);

/// Payload stored at `waiting:<job_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitingEntry {
    pub request: IngestionRequest,
    pub dependencies: Vec<String>,
    pub status: String,
}

impl WaitingEntry {
    fn new(request: IngestionRequest) -> Self {
        let dependencies = request.dependencies.clone();
        Self { request, dependencies, status: "waiting".to_string() }
    }
}

pub struct DependencyScheduler {
    kv: Arc<dyn KeyValueStore>,
    bus: Arc<ProgressBus>,
}

impl DependencyScheduler {
    pub fn new(kv: Arc<dyn KeyValueStore>, bus: Arc<ProgressBus>) -> Self {
        Self { kv, bus }
    }

    /// Park a request until its dependencies complete.
    pub async fn hold(&self, job_id: &JobId, request: &IngestionRequest) -> Result<(), StorageError> {
        let entry = WaitingEntry::new(request.clone());
        let payload = serde_json::to_string(&entry)?;
        self.kv.put(&keys::waiting(job_id.as_str()), payload, Some(WAITING_TTL)).await?;
        tracing::info!(job_id = %job_id, dependencies = ?entry.dependencies, "job held for dependencies");
        Ok(())
    }

    /// Remove a held entry (cancelled before its dependencies resolved).
    pub async fn drop_waiting(&self, job_id: &str) -> Result<(), StorageError> {
        self.kv.delete(&keys::waiting(job_id)).await
    }

    /// The waiting entry for a job, if it is still held.
    pub async fn waiting_entry(&self, job_id: &str) -> Result<Option<WaitingEntry>, StorageError> {
        let Some(payload) = self.kv.get(&keys::waiting(job_id)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&payload).ok())
    }

    /// Scan the waiting queue after `completed_job_id` finished.
    ///
    /// Returns the released (job id, request) pairs; entries are removed
    /// before being returned, so a resubmission failure is not retried.
    pub async fn release_ready(&self, completed_job_id: &str) -> Vec<(JobId, IngestionRequest)> {
        let keys = match self.kv.keys(keys::WAITING_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "failed to scan waiting queue");
                return Vec::new();
            }
        };

        let mut released = Vec::new();
        for key in keys {
            let Some(held_id) = keys::job_id_from_waiting(&key) else { continue };
            let entry = match self.waiting_entry(held_id).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(key = %key, error = %e, "failed to read waiting entry");
                    continue;
                }
            };
            if !entry.dependencies.iter().any(|dep| dep == completed_job_id) {
                continue;
            }
            if !self.all_dependencies_completed(&entry.dependencies).await {
                continue;
            }
            if let Err(e) = self.kv.delete(&key).await {
                tracing::error!(key = %key, error = %e, "failed to remove waiting entry");
                continue;
            }
            tracing::info!(job_id = held_id, "all dependencies complete, releasing job");
            released.push((JobId::new(held_id), entry.request));
        }
        released
    }

    /// Every dependency's latest event must mark a completed job.
    async fn all_dependencies_completed(&self, dependencies: &[String]) -> bool {
        for dep in dependencies {
            let latest = match self.bus.latest(dep).await {
                Ok(latest) => latest,
                Err(e) => {
                    tracing::warn!(dependency = %dep, error = %e, "failed to read dependency status");
                    return false;
                }
            };
            let completed = latest
                .map(|event| {
                    event.status == codeloom_core::StepStatus::Completed && event.is_job_terminal()
                })
                .unwrap_or(false);
            if !completed {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
