// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear_env() {
    for name in
        [BROKER_URI, KV_URI, GRAPH_URI, HTTP_ADDR, WORKER_CONCURRENCY, TASK_TIMEOUT_SECS, WS_HEARTBEAT_SECS]
    {
        std::env::remove_var(name);
    }
}

fn set_required() {
    std::env::set_var(BROKER_URI, "amqp://localhost:5672");
    std::env::set_var(KV_URI, "redis://localhost:6379");
    std::env::set_var(GRAPH_URI, "bolt://localhost:7687");
}

#[test]
#[serial]
fn missing_broker_uri_is_an_error() {
    clear_env();
    std::env::set_var(KV_URI, "redis://localhost:6379");
    std::env::set_var(GRAPH_URI, "bolt://localhost:7687");
    assert!(matches!(ServiceConfig::from_env(), Err(ConfigError::Missing(BROKER_URI))));
}

#[test]
#[serial]
fn defaults_apply_when_tunables_are_absent() {
    clear_env();
    set_required();
    let config = ServiceConfig::from_env().unwrap();
    assert_eq!(config.worker_concurrency, 4);
    assert_eq!(config.task_timeout, Duration::from_secs(3600));
    assert_eq!(config.ws_heartbeat, Duration::from_secs(30));
    assert_eq!(config.http_addr.port(), 8000);
}

#[test]
#[serial]
fn tunables_override_defaults() {
    clear_env();
    set_required();
    std::env::set_var(WORKER_CONCURRENCY, "8");
    std::env::set_var(TASK_TIMEOUT_SECS, "120");
    std::env::set_var(WS_HEARTBEAT_SECS, "5");
    let config = ServiceConfig::from_env().unwrap();
    assert_eq!(config.worker_concurrency, 8);
    assert_eq!(config.task_timeout, Duration::from_secs(120));
    assert_eq!(config.ws_heartbeat, Duration::from_secs(5));
}

#[test]
#[serial]
fn invalid_tunable_is_an_error() {
    clear_env();
    set_required();
    std::env::set_var(WORKER_CONCURRENCY, "many");
    assert!(matches!(
        ServiceConfig::from_env(),
        Err(ConfigError::Invalid(WORKER_CONCURRENCY, _))
    ));
}

#[test]
#[serial]
fn empty_required_var_counts_as_missing() {
    clear_env();
    set_required();
    std::env::set_var(GRAPH_URI, "");
    assert!(matches!(ServiceConfig::from_env(), Err(ConfigError::Missing(GRAPH_URI))));
}
