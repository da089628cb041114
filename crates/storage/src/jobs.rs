// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized job store.
//!
//! Holds the authoritative [`JobRecord`] for every job this process has
//! seen. Writers: the job service on create/cancel, the orchestrator and
//! step runner via their update closures. Terminal-status monotonicity
//! is enforced by `JobRecord::set_status`.

use codeloom_core::{JobRecord, JobStatus, ValidationError};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Whitelisted sort fields for the list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Status,
}

impl SortField {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw {
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            "status" => Ok(SortField::Status),
            other => Err(ValidationError::InvalidSortField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Anything other than "asc" sorts descending, newest first.
    pub fn parse(raw: &str) -> Self {
        if raw == "asc" {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

/// Query for the list endpoint.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Empty = no status filter.
    pub statuses: Vec<JobStatus>,
    pub limit: usize,
    pub offset: usize,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
}

impl ListQuery {
    pub fn new() -> Self {
        Self { limit: 10, ..Default::default() }
    }
}

/// One page of jobs.
#[derive(Debug, Clone)]
pub struct JobPage {
    pub items: Vec<JobRecord>,
    pub total: usize,
    pub has_more: bool,
}

/// In-process registry of job records.
#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: JobRecord) {
        self.jobs.write().insert(record.job_id.to_string(), record);
    }

    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().get(job_id).cloned()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.jobs.read().contains_key(job_id)
    }

    /// Drop a record (dispatch-failure rollback; no job record survives a
    /// failed submission).
    pub fn remove(&self, job_id: &str) {
        self.jobs.write().remove(job_id);
    }

    /// Mutate a record in place; returns the updated copy.
    pub fn update<F>(&self, job_id: &str, mutate: F) -> Option<JobRecord>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut jobs = self.jobs.write();
        let record = jobs.get_mut(job_id)?;
        mutate(record);
        Some(record.clone())
    }

    /// Filter, sort, and paginate for the list endpoint.
    pub fn list(&self, query: &ListQuery) -> JobPage {
        let jobs = self.jobs.read();
        let mut items: Vec<JobRecord> = jobs
            .values()
            .filter(|job| query.statuses.is_empty() || query.statuses.contains(&job.status))
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SortField::CreatedAt => a.created_at_ms.cmp(&b.created_at_ms),
                SortField::UpdatedAt => a.updated_at_ms.cmp(&b.updated_at_ms),
                SortField::Status => a.status.to_string().cmp(&b.status.to_string()),
            };
            // Job id as tie-break keeps pagination stable.
            let ordering = ordering.then_with(|| a.job_id.as_str().cmp(b.job_id.as_str()));
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = items.len();
        let items: Vec<JobRecord> =
            items.into_iter().skip(query.offset).take(query.limit).collect();
        let has_more = query.offset + items.len() < total;
        JobPage { items, total, has_more }
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
