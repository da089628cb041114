// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment configuration.
//!
//! Endpoint URIs are required at start; tunables default sensibly.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub const BROKER_URI: &str = "CODELOOM_BROKER_URI";
pub const KV_URI: &str = "CODELOOM_KV_URI";
pub const GRAPH_URI: &str = "CODELOOM_GRAPH_URI";
pub const HTTP_ADDR: &str = "CODELOOM_HTTP_ADDR";
pub const WORKER_CONCURRENCY: &str = "CODELOOM_WORKER_CONCURRENCY";
pub const TASK_TIMEOUT_SECS: &str = "CODELOOM_TASK_TIMEOUT_SECS";
pub const WS_HEARTBEAT_SECS: &str = "CODELOOM_WS_HEARTBEAT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Service configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub broker_uri: String,
    pub kv_uri: String,
    pub graph_uri: String,
    pub http_addr: SocketAddr,
    pub worker_concurrency: usize,
    pub task_timeout: Duration,
    pub ws_heartbeat: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            broker_uri: require(BROKER_URI)?,
            kv_uri: require(KV_URI)?,
            graph_uri: require(GRAPH_URI)?,
            http_addr: parse_or(HTTP_ADDR, "127.0.0.1:8000")?,
            worker_concurrency: parse_or(WORKER_CONCURRENCY, "4")?,
            task_timeout: Duration::from_secs(parse_or(TASK_TIMEOUT_SECS, "3600")?),
            ws_heartbeat: Duration::from_secs(parse_or(WS_HEARTBEAT_SECS, "30")?),
        })
    }

    /// Configuration for tests: in-memory everything, fast heartbeats.
    #[cfg(any(test, feature = "test-support"))]
    pub fn for_tests() -> Self {
        Self {
            broker_uri: "memory://".to_string(),
            kv_uri: "memory://".to_string(),
            graph_uri: "bolt://localhost:7687".to_string(),
            http_addr: "127.0.0.1:0".parse().unwrap_or_else(|_| unreachable!()),
            worker_concurrency: 2,
            task_timeout: Duration::from_secs(3600),
            ws_heartbeat: Duration::from_secs(30),
        }
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|_| ConfigError::Invalid(name, raw))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
