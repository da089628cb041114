// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

fn running_step(name: &str, progress: f64) -> StepProgress {
    StepProgress {
        status: StepStatus::Running,
        progress,
        ..StepProgress::pending(name)
    }
}

fn completed_step(name: &str) -> StepProgress {
    StepProgress {
        status: StepStatus::Completed,
        progress: 100.0,
        ..StepProgress::pending(name)
    }
}

fn failed_step(name: &str, error: &str) -> StepProgress {
    StepProgress {
        status: StepStatus::Failed,
        error: Some(error.to_string()),
        ..StepProgress::pending(name)
    }
}

#[test]
fn new_job_is_pending_with_pending_steps() {
    let record = JobRecord::builder().steps(&["filesystem", "blarify"]).build();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.overall_progress, 0.0);
    assert_eq!(record.steps.len(), 2);
    assert!(record.steps.values().all(|s| s.status == StepStatus::Pending));
    assert_eq!(record.step_names().collect::<Vec<_>>(), vec!["filesystem", "blarify"]);
}

#[test]
fn set_status_running_stamps_start() {
    let mut record = JobRecord::builder().build();
    assert!(record.set_status(JobStatus::Running, 2_000_000));
    assert_eq!(record.started_at_ms, Some(2_000_000));
    assert_eq!(record.updated_at_ms, 2_000_000);
}

#[test]
fn terminal_status_is_monotonic() {
    let mut record = JobRecord::builder().build();
    record.set_status(JobStatus::Running, 1_000);
    record.set_status(JobStatus::Failed, 2_000);

    assert!(!record.set_status(JobStatus::Running, 3_000));
    assert_eq!(record.status, JobStatus::Failed);
    assert!(!record.set_status(JobStatus::Completed, 4_000));
    assert_eq!(record.status, JobStatus::Failed);
}

#[test]
fn terminal_transition_computes_duration() {
    let mut record = JobRecord::builder().build();
    record.set_status(JobStatus::Running, 10_000);
    record.set_status(JobStatus::Completed, 25_000);
    assert_eq!(record.completed_at_ms, Some(25_000));
    assert_eq!(record.duration_seconds, Some(15.0));
}

#[test]
fn overall_progress_ignores_pending_steps() {
    let mut record = JobRecord::builder().steps(&["a", "b", "c"]).build();
    record.absorb_step(running_step("a", 50.0), 1_000);
    // b and c still pending: mean over started steps only
    assert_eq!(record.overall_progress, 50.0);

    record.absorb_step(completed_step("a"), 2_000);
    record.absorb_step(running_step("b", 0.0), 3_000);
    assert_eq!(record.overall_progress, 50.0);
}

#[test]
fn overall_progress_is_exactly_100_when_all_completed() {
    let mut record = JobRecord::builder().steps(&["a", "b"]).build();
    record.absorb_step(completed_step("a"), 1_000);
    record.absorb_step(completed_step("b"), 2_000);
    assert_eq!(record.overall_progress, 100.0);
}

#[test]
fn failed_step_fails_job_with_named_error() {
    let mut record = JobRecord::builder().steps(&["x", "y"]).build();
    record.set_status(JobStatus::Running, 1_000);
    record.absorb_step(failed_step("x", "boom"), 2_000);

    assert_eq!(record.status, JobStatus::Failed);
    let error = record.error.as_deref().unwrap();
    assert!(error.contains("x"), "error should name the step: {error}");
    assert!(error.contains("boom"), "error should carry the cause: {error}");
    assert_eq!(record.steps["y"].status, StepStatus::Pending);
}

#[test]
fn continue_on_failure_keeps_job_running() {
    let mut steps = vec![StepConfig::new("x"), StepConfig::new("y")];
    steps[0].continue_on_failure = true;
    let mut record =
        JobRecord::new(JobId::new("job-1"), SourceKind::LocalPath, "/repo", steps, 1_000);
    record.set_status(JobStatus::Running, 1_000);
    record.absorb_step(failed_step("x", "boom"), 2_000);

    assert_eq!(record.status, JobStatus::Running);
    assert!(record.error.is_none());
}

#[test]
fn absorb_step_tracks_current_step() {
    let mut record = JobRecord::builder().steps(&["a", "b"]).build();
    record.absorb_step(running_step("a", 0.0), 1_000);
    assert_eq!(record.current_step.as_deref(), Some("a"));
    record.absorb_step(running_step("b", 0.0), 2_000);
    assert_eq!(record.current_step.as_deref(), Some("b"));
}

#[test]
fn first_failed_step_respects_pipeline_order() {
    let mut record = JobRecord::builder().steps(&["a", "b"]).build();
    record.absorb_step(failed_step("b", "later"), 1_000);
    record.absorb_step(failed_step("a", "earlier"), 2_000);
    assert_eq!(record.first_failed_step().map(|s| s.name.as_str()), Some("a"));
}

#[test]
fn serde_round_trip_preserves_step_order() {
    let record = JobRecord::builder().steps(&["filesystem", "blarify", "summarizer"]).build();
    let json = serde_json::to_string(&record).unwrap();
    let parsed: JobRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(
        parsed.steps.keys().collect::<Vec<_>>(),
        vec!["filesystem", "blarify", "summarizer"]
    );
}

proptest! {
    #[test]
    fn overall_progress_is_mean_of_started(progresses in proptest::collection::vec(0.0f64..=100.0, 1..6)) {
        let names: Vec<String> = (0..progresses.len()).map(|i| format!("s{i}")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut record = JobRecord::builder().steps(&name_refs).build();
        for (name, progress) in names.iter().zip(&progresses) {
            record.absorb_step(running_step(name, *progress), 1_000);
        }
        let mean = progresses.iter().sum::<f64>() / progresses.len() as f64;
        prop_assert!((record.overall_progress - mean).abs() < 1e-9);
    }
}
