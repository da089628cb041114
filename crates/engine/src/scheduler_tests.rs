// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use codeloom_core::{FakeClock, ProgressEvent, SourceKind, StepStatus};
use codeloom_storage::MemoryStore;

struct Harness {
    scheduler: DependencyScheduler,
    bus: Arc<ProgressBus>,
    clock: FakeClock,
}

fn harness() -> Harness {
    let clock = FakeClock::new();
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(clock.clone()));
    let bus = Arc::new(ProgressBus::new(Arc::clone(&kv)));
    let scheduler = DependencyScheduler::new(kv, Arc::clone(&bus));
    Harness { scheduler, bus, clock }
}

fn request_with_deps(deps: &[&str]) -> IngestionRequest {
    let mut request = IngestionRequest::new(SourceKind::LocalPath, "/repo");
    request.dependencies = deps.iter().map(|d| d.to_string()).collect();
    request
}

async fn mark_completed(bus: &ProgressBus, job_id: &str, ts: u64) {
    let event = ProgressEvent::new(
        JobId::new(job_id),
        "filesystem",
        StepStatus::Completed,
        100.0,
        100.0,
        ts,
    );
    bus.publish(&event).await.unwrap();
}

#[tokio::test]
async fn hold_persists_a_waiting_entry() {
    let h = harness();
    let request = request_with_deps(&["job-a"]);
    h.scheduler.hold(&JobId::new("job-b"), &request).await.unwrap();

    let entry = h.scheduler.waiting_entry("job-b").await.unwrap().unwrap();
    assert_eq!(entry.status, "waiting");
    assert_eq!(entry.dependencies, vec!["job-a"]);
    assert_eq!(entry.request, request);
}

#[tokio::test]
async fn waiting_entry_expires_with_ttl() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-b"), &request_with_deps(&["job-a"])).await.unwrap();
    h.clock.advance(WAITING_TTL + std::time::Duration::from_secs(1));
    assert!(h.scheduler.waiting_entry("job-b").await.unwrap().is_none());
}

#[tokio::test]
async fn release_when_single_dependency_completes() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-b"), &request_with_deps(&["job-a"])).await.unwrap();
    mark_completed(&h.bus, "job-a", 10).await;

    let released = h.scheduler.release_ready("job-a").await;
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].0, "job-b");

    // The entry is consumed: a second scan finds nothing.
    assert!(h.scheduler.waiting_entry("job-b").await.unwrap().is_none());
    assert!(h.scheduler.release_ready("job-a").await.is_empty());
}

#[tokio::test]
async fn no_release_while_any_dependency_is_missing() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-c"), &request_with_deps(&["job-a", "job-b"])).await.unwrap();
    mark_completed(&h.bus, "job-a", 10).await;

    assert!(h.scheduler.release_ready("job-a").await.is_empty());
    assert!(h.scheduler.waiting_entry("job-c").await.unwrap().is_some());

    mark_completed(&h.bus, "job-b", 20).await;
    let released = h.scheduler.release_ready("job-b").await;
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].0, "job-c");
}

#[tokio::test]
async fn running_dependency_does_not_release() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-b"), &request_with_deps(&["job-a"])).await.unwrap();
    let event = ProgressEvent::new(
        JobId::new("job-a"),
        "filesystem",
        StepStatus::Running,
        50.0,
        50.0,
        10,
    );
    h.bus.publish(&event).await.unwrap();

    assert!(h.scheduler.release_ready("job-a").await.is_empty());
}

#[tokio::test]
async fn mid_pipeline_step_completion_does_not_release() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-b"), &request_with_deps(&["job-a"])).await.unwrap();
    // First of two steps finished: the step completed, the job did not.
    let event = ProgressEvent::new(
        JobId::new("job-a"),
        "filesystem",
        StepStatus::Completed,
        100.0,
        50.0,
        10,
    );
    h.bus.publish(&event).await.unwrap();

    assert!(h.scheduler.release_ready("job-a").await.is_empty());
}

#[tokio::test]
async fn failed_dependency_leaves_job_waiting() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-b"), &request_with_deps(&["job-a"])).await.unwrap();
    let event =
        ProgressEvent::new(JobId::new("job-a"), "filesystem", StepStatus::Failed, 0.0, 0.0, 10);
    h.bus.publish(&event).await.unwrap();

    assert!(h.scheduler.release_ready("job-a").await.is_empty());
    assert!(h.scheduler.waiting_entry("job-b").await.unwrap().is_some());
}

#[tokio::test]
async fn unrelated_completion_does_not_touch_entry() {
    let h = harness();
    h.scheduler.hold(&JobId::new("job-b"), &request_with_deps(&["job-a"])).await.unwrap();
    mark_completed(&h.bus, "job-z", 10).await;

    assert!(h.scheduler.release_ready("job-z").await.is_empty());
    assert!(h.scheduler.waiting_entry("job-b").await.unwrap().is_some());
}
