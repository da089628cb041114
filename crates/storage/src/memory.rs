// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory key-value store with clock-driven TTL expiry.

use crate::kv::{KeyValueStore, StorageError};
use async_trait::async_trait;
use codeloom_core::Clock;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

struct Entry {
    value: String,
    /// Epoch ms after which the entry is gone. None = no expiry.
    expires_at_ms: Option<u64>,
}

/// Single-node [`KeyValueStore`] used by tests and the bundled deployment.
pub struct MemoryStore<C: Clock> {
    entries: RwLock<HashMap<String, Entry>>,
    clock: C,
}

impl<C: Clock> MemoryStore<C> {
    pub fn new(clock: C) -> Self {
        Self { entries: RwLock::new(HashMap::new()), clock }
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        entry.expires_at_ms.is_some_and(|at| self.clock.epoch_ms() >= at)
    }
}

#[async_trait]
impl<C: Clock> KeyValueStore for MemoryStore<C> {
    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let expires_at_ms = ttl.map(|ttl| self.clock.epoch_ms() + ttl.as_millis() as u64);
        self.entries.write().insert(key.to_string(), Entry { value, expires_at_ms });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !self.is_expired(entry) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop the entry on the way out.
        self.entries.write().remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !self.is_expired(entry))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
