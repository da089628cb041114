// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace-level end-to-end scenarios: submit jobs through the HTTP
//! surface and watch them run through the broker, runner, bus, and
//! dependency scheduler.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use codeloom_core::{FakeClock, JobStatus, StepStatus};
use codeloom_service::{api, AppState, ServiceConfig};
use codeloom_steps::{FakeStep, PipelineStep, StepRegistry};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

struct World {
    router: axum::Router,
    state: AppState<FakeClock>,
    steps: Vec<(String, Arc<FakeStep>)>,
}

impl World {
    /// Fresh service with a plain fake registered for each step name.
    fn new(step_names: &[&str]) -> Self {
        let steps: Vec<(String, Arc<FakeStep>)> = step_names
            .iter()
            .map(|name| (name.to_string(), Arc::new(FakeStep::new())))
            .collect();
        Self::with_steps(steps)
    }

    fn with_steps(steps: Vec<(String, Arc<FakeStep>)>) -> Self {
        let mut builder = StepRegistry::builder();
        for (name, step) in &steps {
            builder = builder
                .register_shared(name.clone(), Arc::clone(step) as Arc<dyn PipelineStep>);
        }
        let registry = Arc::new(builder.discover().expect("valid registry"));
        let state = AppState::assemble(ServiceConfig::for_tests(), registry, FakeClock::new());
        Self { router: api::router(state.clone()), state, steps }
    }

    fn step(&self, name: &str) -> &Arc<FakeStep> {
        &self
            .steps
            .iter()
            .find(|(step_name, _)| step_name == name)
            .expect("registered step")
            .1
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request");
        self.request(request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).expect("request");
        self.request(request).await
    }

    async fn start_job(&self, body: Value) -> String {
        let (status, body) = self.post("/v1/ingest", body).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        body["job_id"].as_str().expect("job id").to_string()
    }

    async fn wait_for(&self, job_id: &str, target: JobStatus) {
        for _ in 0..500 {
            if self.state.store.get(job_id).map(|record| record.status) == Some(target) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached {target}");
    }

    /// Serve the router on an ephemeral port for WebSocket clients.
    async fn serve(&self) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }
}

fn local_request(steps: &[&str]) -> Value {
    json!({"source_type": "local_path", "source": "/r", "steps": steps})
}

// Scenario: a single-step job runs to completion and reports full
// progress through both events and the status endpoint.
#[tokio::test]
async fn simple_success() {
    let world = World::new(&["filesystem"]);
    let mut events = world.state.bus.events();

    let job_id = world.start_job(local_request(&["filesystem"])).await;
    world.wait_for(&job_id, JobStatus::Completed).await;
    // The terminal event publishes right after the store flips; give the
    // bus a beat.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (status, body) = world.get(&format!("/v1/ingest/{job_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["overall_progress"], 100.0);
    assert_eq!(body["steps"]["filesystem"]["status"], "completed");

    let mut first_running = None;
    let mut final_event = None;
    while let Ok(event) = events.try_recv() {
        if event.job_id == job_id.as_str() {
            if event.status == StepStatus::Running && first_running.is_none() {
                first_running = Some(event.clone());
            }
            final_event = Some(event);
        }
    }
    let first_running = first_running.expect("a running event");
    assert_eq!(first_running.progress, 0.0);
    let final_event = final_event.expect("a final event");
    assert_eq!(final_event.status, StepStatus::Completed);
    assert_eq!(final_event.overall_progress, 100.0);
    assert!(final_event.timestamp >= first_running.timestamp);
}

// Scenario: cancelling a job mid-step revokes the broker task, emits a
// cancelled event, and the job reads cancelled afterwards.
#[tokio::test]
async fn cancellation_mid_flight() {
    let world = World::with_steps(vec![
        (
            "filesystem".to_string(),
            Arc::new(FakeStep::new().with_delay(Duration::from_secs(30))),
        ),
        ("blarify".to_string(), Arc::new(FakeStep::new())),
    ]);
    let mut events = world.state.bus.events();

    let job_id = world.start_job(local_request(&["filesystem", "blarify"])).await;
    world.wait_for(&job_id, JobStatus::Running).await;

    let (status, body) = world.post(&format!("/v1/ingest/{job_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (_, body) = world.get(&format!("/v1/ingest/{job_id}")).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(world.step("blarify").run_count(), 0);

    let mut saw_cancelled = false;
    while let Ok(event) = events.try_recv() {
        if event.job_id == job_id.as_str() && event.status == StepStatus::Cancelled {
            saw_cancelled = true;
        }
    }
    assert!(saw_cancelled, "expected a cancelled progress event");
}

// Scenario: a job with a dependency stays pending (with a message naming
// the dependency) until the upstream job completes, then runs.
#[tokio::test]
async fn dependency_hold_and_release() {
    // The upstream step is slow enough that the hold lands before the
    // upstream completion event fires.
    let world = World::with_steps(vec![(
        "filesystem".to_string(),
        Arc::new(FakeStep::new().with_delay(Duration::from_millis(200))),
    )]);

    let upstream = world.start_job(local_request(&["filesystem"])).await;
    let (status, body) = world
        .post(
            "/v1/ingest",
            json!({
                "source_type": "local_path",
                "source": "/r",
                "steps": ["filesystem"],
                "dependencies": [upstream],
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let held = body["job_id"].as_str().expect("job id").to_string();
    assert_eq!(body["status"], "pending");
    assert!(body["message"].as_str().expect("message").contains(&upstream));

    let (_, held_body) = world.get(&format!("/v1/ingest/{held}")).await;
    assert_eq!(held_body["status"], "pending");
    assert_eq!(held_body["overall_progress"], 0.0);

    world.wait_for(&upstream, JobStatus::Completed).await;
    world.wait_for(&held, JobStatus::Completed).await;
    assert_eq!(world.step("filesystem").run_count(), 2);
}

// Scenario: the first failing step stops the pipeline; later steps stay
// pending and the error names the step and cause.
#[tokio::test]
async fn failure_stops_pipeline() {
    let world = World::new(&["x", "y"]);
    world.step("x").fail_with("boom");

    let job_id = world
        .start_job(json!({
            "source_type": "local_path",
            "source": "/r",
            "steps": ["x", "y"],
            "options": {"max_retries": 0},
        }))
        .await;
    world.wait_for(&job_id, JobStatus::Failed).await;

    let (_, body) = world.get(&format!("/v1/ingest/{job_id}")).await;
    assert_eq!(body["status"], "failed");
    let error = body["error"].as_str().expect("error");
    assert!(error.contains("x"));
    assert!(error.contains("boom"));
    assert_eq!(body["steps"]["y"]["status"], "pending");
    assert_eq!(body["overall_progress"], body["steps"]["x"]["progress"]);
    assert_eq!(world.step("y").run_count(), 0);
}

// Scenario: option filtering. blarify never sees `concurrency`, the
// summarizer sees only its safe keys.
#[tokio::test]
async fn parameter_filtering() {
    let world = World::new(&["blarify", "summarizer"]);

    let job_id = world
        .start_job(json!({
            "source_type": "local_path",
            "source": "/r",
            "steps": ["blarify", "summarizer"],
            "options": {"concurrency": 8, "ignore_patterns": [".git"]},
        }))
        .await;
    world.wait_for(&job_id, JobStatus::Completed).await;

    let received = &world.step("blarify").recorded_options()[0];
    assert!(!received.contains_key("concurrency"));
    assert_eq!(received.get("ignore_patterns"), Some(&json!([".git"])));

    let received = &world.step("summarizer").recorded_options()[0];
    assert_eq!(received.keys().collect::<Vec<_>>(), vec!["ignore_patterns"]);
}

// Scenario: a step that fails once succeeds on retry; the job completes
// and the retry count is recorded.
#[tokio::test]
async fn retry_then_success() {
    let world = World::new(&["flaky"]);
    world.step("flaky").fail_with("transient");

    let job_id = world
        .start_job(json!({
            "source_type": "local_path",
            "source": "/r",
            "steps": ["flaky"],
            "options": {"max_retries": 2, "back_off_seconds": 0},
        }))
        .await;
    world.wait_for(&job_id, JobStatus::Completed).await;

    assert_eq!(world.step("flaky").run_count(), 2);
    let (_, body) = world.get(&format!("/v1/ingest/{job_id}")).await;
    assert_eq!(body["steps"]["flaky"]["retry_count"], 1);
}

// Boundary: a priority outside {high, default, low} falls through to the
// default queue instead of rejecting the request.
#[tokio::test]
async fn unknown_priority_falls_back_to_default_queue() {
    let world = World::new(&["filesystem"]);
    let job_id = world
        .start_job(json!({
            "source_type": "local_path",
            "source": "/r",
            "steps": ["filesystem"],
            "priority": "turbo",
        }))
        .await;
    world.wait_for(&job_id, JobStatus::Completed).await;

    let record = world.state.store.get(&job_id).expect("record");
    assert_eq!(record.priority, codeloom_core::Priority::Default);
}

// WebSocket: opening a stream for an unknown job closes with 1008 before
// any event is delivered.
#[tokio::test]
async fn websocket_unknown_job_closes_1008() {
    let world = World::new(&["filesystem"]);
    let addr = world.serve().await;

    let url = format!("ws://{addr}/v1/ingest/ws/status/job-ghost");
    let (mut stream, _) = tokio_tungstenite::connect_async(url).await.expect("connect");

    match stream.next().await {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(u16::from(frame.code), 1008);
        }
        other => panic!("expected close frame, got {other:?}"),
    }
}

// WebSocket: a live subscriber sees progress events and the stream ends
// after the terminal event.
#[tokio::test]
async fn websocket_streams_progress_to_terminal() {
    let world = World::new(&["filesystem"]);
    let addr = world.serve().await;

    let job_id = world.start_job(local_request(&["filesystem"])).await;
    let url = format!("ws://{addr}/v1/ingest/ws/status/{job_id}");
    let (mut stream, _) = tokio_tungstenite::connect_async(url).await.expect("connect");

    let mut saw_terminal = false;
    while let Some(message) = stream.next().await {
        match message.expect("frame") {
            Message::Text(text) => {
                let event: Value = serde_json::from_str(&text).expect("event json");
                if event.get("type").is_some() {
                    continue; // heartbeat
                }
                assert_eq!(event["job_id"], job_id.as_str());
                if event["status"] == "completed" && event["overall_progress"] == 100.0 {
                    saw_terminal = true;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    assert!(saw_terminal, "expected the terminal completed event");
}

// Publish → subscribe: a subscriber attached after an event was
// published receives it first from the latest-value cache.
#[tokio::test]
async fn late_subscriber_catches_up_from_cache() {
    let world = World::new(&["filesystem"]);
    let job_id = world.start_job(local_request(&["filesystem"])).await;
    world.wait_for(&job_id, JobStatus::Completed).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let subscription = world.state.bus.subscribe(&job_id).await.expect("subscribe");
    let latest = subscription.latest.expect("cached event");
    assert_eq!(latest.status, StepStatus::Completed);
    assert_eq!(latest.overall_progress, 100.0);
}
