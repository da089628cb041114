// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live progress over WebSocket.
//!
//! The cached latest event is delivered first, then live events.
//! Heartbeats cover idle stretches; the stream ends when a job-terminal
//! event goes out or the client hangs up. Unknown jobs close with 1008,
//! internal errors with 1011.

use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use codeloom_core::{Clock, ProgressEvent};
use codeloom_storage::Subscription;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

const POLICY_VIOLATION: u16 = 1008;
const INTERNAL_ERROR: u16 = 1011;

/// `WS /v1/ingest/ws/status/{id}`.
pub async fn job_status<C: Clock>(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState<C>>,
) -> Response {
    ws.on_upgrade(move |socket| handle(state, socket, job_id))
}

async fn handle<C: Clock>(state: AppState<C>, mut socket: WebSocket, job_id: String) {
    tracing::info!(job_id = %job_id, "websocket connected");

    if !state.service.exists(&job_id).await {
        close(&mut socket, POLICY_VIOLATION, format!("job not found: {job_id}")).await;
        return;
    }

    let subscription = match state.bus.subscribe(&job_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!(job_id = %job_id, error = %e, "subscription failed");
            close(&mut socket, INTERNAL_ERROR, e.to_string()).await;
            return;
        }
    };

    pump(socket, subscription, state.config.ws_heartbeat).await;
    tracing::info!(job_id = %job_id, "websocket closed");
}

/// Forward events to the socket until the job ends or the client leaves.
async fn pump(mut socket: WebSocket, mut subscription: Subscription, heartbeat: Duration) {
    if let Some(latest) = subscription.latest.take() {
        if send_event(&mut socket, &latest).await.is_err() {
            return;
        }
        if latest.is_job_terminal() {
            close(&mut socket, 1000, "job finished".to_string()).await;
            return;
        }
    }

    let mut heartbeats =
        tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
    loop {
        tokio::select! {
            received = subscription.receiver.recv() => match received {
                Ok(event) => {
                    heartbeats.reset();
                    if send_event(&mut socket, &event).await.is_err() {
                        return;
                    }
                    if event.is_job_terminal() {
                        close(&mut socket, 1000, "job finished".to_string()).await;
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Missed intermediate events are acceptable; the
                    // terminal event will still arrive.
                    tracing::warn!(skipped, "websocket subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    close(&mut socket, 1000, "stream ended".to_string()).await;
                    return;
                }
            },
            _ = heartbeats.tick() => {
                let frame = Message::Text("{\"type\":\"heartbeat\"}".to_string());
                if socket.send(frame).await.is_err() {
                    return;
                }
            }
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                // Client pings and stray frames are ignored.
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &ProgressEvent) -> Result<(), ()> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode progress event");
            return Err(());
        }
    };
    socket.send(Message::Text(payload)).await.map_err(|_| ())
}

async fn close(socket: &mut WebSocket, code: u16, reason: String) {
    let frame = CloseFrame { code, reason: reason.into() };
    let _ = socket.send(Message::Close(Some(frame))).await;
}
