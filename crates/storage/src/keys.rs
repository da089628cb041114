// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted-state key layout.
//!
//! - `progress:<job_id>`: pub/sub channel name (no retained value)
//! - `latest:<job_id>`: last progress event, 24 h TTL
//! - `waiting:<job_id>`: dependency-held request, 24 h TTL

pub const PROGRESS_PREFIX: &str = "progress:";
pub const LATEST_PREFIX: &str = "latest:";
pub const WAITING_PREFIX: &str = "waiting:";

pub fn progress_channel(job_id: &str) -> String {
    format!("{PROGRESS_PREFIX}{job_id}")
}

pub fn latest(job_id: &str) -> String {
    format!("{LATEST_PREFIX}{job_id}")
}

pub fn waiting(job_id: &str) -> String {
    format!("{WAITING_PREFIX}{job_id}")
}

/// Extract the job id from a `waiting:` key.
pub fn job_id_from_waiting(key: &str) -> Option<&str> {
    key.strip_prefix(WAITING_PREFIX)
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
