// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value store trait.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from the key-value store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to encode value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Semantics the deployment's key-value store must provide.
///
/// Values are opaque strings (JSON on every key codeloom writes).
/// Updates are last-writer-wins; TTLs are absolute from write time.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>)
        -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All live keys starting with `prefix`.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<(), StorageError>;
}
