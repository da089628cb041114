// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Progress bus: per-job pub/sub channels plus a latest-event cache.
//!
//! Publishing writes the event under `latest:<job_id>` (24 h TTL) and
//! fans it out to live subscribers of that job's channel and to the
//! global firehose. Late subscribers catch up from the cache; missed
//! intermediate events are acceptable, delivery is best-effort single.

use crate::keys;
use crate::kv::{KeyValueStore, StorageError};
use codeloom_core::ProgressEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How long the latest-event cache entry lives.
pub const LATEST_TTL: Duration = Duration::from_secs(24 * 3600);

/// Per-channel buffer; a lagging subscriber loses oldest events first.
const CHANNEL_CAPACITY: usize = 256;

/// A live subscription to one job's progress.
pub struct Subscription {
    /// Cached latest event, delivered before any live event.
    pub latest: Option<ProgressEvent>,
    pub receiver: broadcast::Receiver<ProgressEvent>,
}

/// Fan-out of progress events from workers to interactive subscribers.
pub struct ProgressBus {
    kv: Arc<dyn KeyValueStore>,
    channels: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
    firehose: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        let (firehose, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { kv, channels: Mutex::new(HashMap::new()), firehose }
    }

    fn channel(&self, job_id: &str) -> broadcast::Sender<ProgressEvent> {
        let mut channels = self.channels.lock();
        channels
            .entry(keys::progress_channel(job_id))
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Publish an event: cache it, then fan out to subscribers.
    pub async fn publish(&self, event: &ProgressEvent) -> Result<(), StorageError> {
        let payload = serde_json::to_string(event)?;
        self.kv.put(&keys::latest(event.job_id.as_str()), payload, Some(LATEST_TTL)).await?;

        // No live subscribers is not an error.
        let _ = self.channel(event.job_id.as_str()).send(event.clone());
        let _ = self.firehose.send(event.clone());
        tracing::debug!(job_id = %event.job_id, step = %event.step, status = %event.status, "published progress");
        Ok(())
    }

    /// The cached latest event for a job, if any.
    pub async fn latest(&self, job_id: &str) -> Result<Option<ProgressEvent>, StorageError> {
        let Some(payload) = self.kv.get(&keys::latest(job_id)).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&payload).ok())
    }

    /// Subscribe to one job: cached latest first, then live events.
    pub async fn subscribe(&self, job_id: &str) -> Result<Subscription, StorageError> {
        // Register the receiver before reading the cache so an event
        // published in between is seen at most twice, never lost.
        let receiver = self.channel(job_id).subscribe();
        let latest = self.latest(job_id).await?;
        Ok(Subscription { latest, receiver })
    }

    /// Live stream of every job's events (dependency-release scans).
    pub fn events(&self) -> broadcast::Receiver<ProgressEvent> {
        self.firehose.subscribe()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
