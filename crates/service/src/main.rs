// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! codeloomd: the codeloom ingestion service daemon.
//!
//! Serves the HTTP/WebSocket API and runs the embedded worker pool.
//! Exits non-zero on configuration errors, zero on clean shutdown.

use codeloom_core::SystemClock;
use codeloom_service::{api, AppState, ServiceConfig};
use codeloom_steps::StepRegistry;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ExitCode::FAILURE;
        }
    };

    // Step plugin crates register themselves here; a build without any
    // linked step crates still serves the API but rejects every step
    // name at validation.
    let registry = match StepRegistry::builder().discover() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!(error = %e, "step discovery failed");
            return ExitCode::FAILURE;
        }
    };
    if registry.is_empty() {
        tracing::warn!("no pipeline steps registered");
    }

    let state = AppState::assemble(config.clone(), registry, SystemClock);
    let app = api::router(state);

    let listener = match tokio::net::TcpListener::bind(config.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.http_addr, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %config.http_addr, "codeloomd listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown requested");
    });
    if let Err(e) = serve.await {
        tracing::error!(error = %e, "server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
