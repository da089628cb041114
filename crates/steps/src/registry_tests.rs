// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::fake::FakeStep;
use yare::parameterized;

fn fake_factory() -> StepFactory {
    Arc::new(|| Arc::new(FakeStep::new()) as Arc<dyn PipelineStep>)
}

fn registry_with(names: &[&str]) -> StepRegistry {
    let mut builder = StepRegistry::builder();
    for name in names {
        let factory = fake_factory();
        builder = builder.register(*name, move || factory());
    }
    builder.discover().unwrap()
}

#[test]
fn discover_collects_registrations() {
    let registry = registry_with(&["filesystem", "blarify"]);
    assert_eq!(registry.len(), 2);
    assert!(registry.find("filesystem").is_some());
    assert!(registry.find("blarify").is_some());
}

#[test]
fn find_unknown_step_is_none() {
    let registry = registry_with(&["filesystem"]);
    assert!(registry.find("nonexistent").is_none());
    assert!(!registry.knows("nonexistent"));
}

#[test]
fn docgrapher_alias_resolves_to_documentation_grapher() {
    let registry = registry_with(&["documentation_grapher"]);
    assert!(registry.find("docgrapher").is_some());
    assert!(registry.knows("docgrapher"));
}

#[test]
fn alias_without_canonical_registration_misses() {
    let registry = registry_with(&["filesystem"]);
    assert!(registry.find("docgrapher").is_none());
}

#[test]
fn duplicate_registration_keeps_first() {
    let marker = Arc::new(FakeStep::new());
    marker.succeed_with(serde_json::json!({"which": "first"}));
    let registry = StepRegistry::builder()
        .register_shared("filesystem", marker)
        .register("filesystem", || Arc::new(FakeStep::new()) as Arc<dyn PipelineStep>)
        .discover()
        .unwrap();
    assert_eq!(registry.len(), 1);
}

#[test]
fn malformed_name_is_an_error() {
    let result = StepRegistry::builder()
        .register("Bad-Name", || Arc::new(FakeStep::new()) as Arc<dyn PipelineStep>)
        .discover();
    assert!(matches!(result, Err(RegistryError::MalformedName(_))));
}

#[parameterized(
    simple = { "filesystem", true },
    underscore_start = { "_private", true },
    with_digits = { "step2", true },
    empty = { "", false },
    digit_start = { "2step", false },
    uppercase = { "Filesystem", false },
    hyphen = { "doc-grapher", false },
)]
fn step_name_validity(name: &str, valid: bool) {
    assert_eq!(is_valid_step_name(name), valid);
}

#[test]
fn names_are_sorted() {
    let registry = registry_with(&["summarizer", "blarify", "filesystem"]);
    assert_eq!(registry.names(), vec!["blarify", "filesystem", "summarizer"]);
}
