// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composite health report.
//!
//! Overall status is `unhealthy` when the task broker is unhealthy and
//! `degraded` when any other component is non-healthy. Each probe gets
//! five seconds.

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use codeloom_core::Clock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const COMPONENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    fn healthy(details: impl Into<String>) -> Self {
        Self { status: HealthStatus::Healthy, details: Some(details.into()) }
    }

    fn unhealthy(details: impl Into<String>) -> Self {
        Self { status: HealthStatus::Unhealthy, details: Some(details.into()) }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: BTreeMap<&'static str, ComponentHealth>,
}

/// `GET /health` and `GET /v1/health`.
pub async fn health<C: Clock>(State(state): State<AppState<C>>) -> Json<HealthReport> {
    let mut components = BTreeMap::new();
    components.insert("task_broker", broker_health(&state).await);
    components.insert("kv_store", kv_health(&state).await);

    let broker_unhealthy = components["task_broker"].status == HealthStatus::Unhealthy;
    let any_non_healthy =
        components.values().any(|component| component.status != HealthStatus::Healthy);
    let status = if broker_unhealthy {
        HealthStatus::Unhealthy
    } else if any_non_healthy {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthReport { status, components })
}

async fn broker_health<C: Clock>(state: &AppState<C>) -> ComponentHealth {
    let probe = async {
        state.broker.ping().await?;
        state.broker.inspect_workers().await
    };
    match tokio::time::timeout(COMPONENT_TIMEOUT, probe).await {
        Ok(Ok(fleet)) if fleet.active_count > 0 => ComponentHealth::healthy(format!(
            "{} active workers, {} registered tasks",
            fleet.active_count, fleet.registered_task_count
        )),
        Ok(Ok(_)) => ComponentHealth::unhealthy("no active workers"),
        Ok(Err(e)) => ComponentHealth::unhealthy(e.to_string()),
        Err(_) => ComponentHealth::unhealthy("health probe timed out"),
    }
}

async fn kv_health<C: Clock>(state: &AppState<C>) -> ComponentHealth {
    match tokio::time::timeout(COMPONENT_TIMEOUT, state.kv.ping()).await {
        Ok(Ok(())) => ComponentHealth::healthy("reachable"),
        Ok(Err(e)) => ComponentHealth::unhealthy(e.to_string()),
        Err(_) => ComponentHealth::unhealthy("health probe timed out"),
    }
}
