// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn event(status: StepStatus, overall: f64) -> ProgressEvent {
    ProgressEvent::new(JobId::new("job-1"), "filesystem", status, 0.0, overall, 1_000)
}

#[parameterized(
    pending = { StepStatus::Pending, 0.0, false },
    running = { StepStatus::Running, 50.0, false },
    step_done_midway = { StepStatus::Completed, 50.0, false },
    job_done = { StepStatus::Completed, 100.0, true },
    failed = { StepStatus::Failed, 25.0, true },
    stopped = { StepStatus::Stopped, 25.0, true },
    cancelled = { StepStatus::Cancelled, 0.0, true },
)]
fn job_terminality(status: StepStatus, overall: f64, terminal: bool) {
    assert_eq!(event(status, overall).is_job_terminal(), terminal);
}

#[test]
fn wire_format_omits_absent_optionals() {
    let value = serde_json::to_value(event(StepStatus::Running, 0.0)).unwrap();
    let object = value.as_object().unwrap();
    assert!(!object.contains_key("message"));
    assert!(!object.contains_key("cpu_percent"));
    assert!(!object.contains_key("memory_mb"));
    assert_eq!(object["status"], "running");
    assert_eq!(object["timestamp"], 1_000);
}

#[test]
fn with_message_round_trips() {
    let event = event(StepStatus::Running, 0.0).with_message("walking tree");
    let json = serde_json::to_string(&event).unwrap();
    let parsed: ProgressEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.message.as_deref(), Some("walking tree"));
    assert_eq!(parsed, event);
}
