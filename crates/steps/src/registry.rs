// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Step registry: name → factory table assembled at composition time.
//!
//! Replaces the runtime extension-point scan with a startup-time table:
//! each step crate registers its factory into the builder, `discover`
//! validates the entries, and `find` falls back to the builtin alias
//! table for the bundled steps.

use crate::step::PipelineStep;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Produces a step instance for one execution.
pub type StepFactory = Arc<dyn Fn() -> Arc<dyn PipelineStep> + Send + Sync>;

/// Canonical names of the bundled steps.
pub const BUILTIN_STEPS: [&str; 4] = ["filesystem", "blarify", "summarizer", "documentation_grapher"];

/// Short aliases accepted in requests for bundled steps.
const ALIASES: [(&str, &str); 1] = [("docgrapher", "documentation_grapher")];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("malformed step name '{0}': must match [a-z_][a-z0-9_]*")]
    MalformedName(String),
}

/// Accumulates registrations before validation.
#[derive(Default)]
pub struct StepRegistryBuilder {
    entries: Vec<(String, StepFactory)>,
}

impl StepRegistryBuilder {
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn PipelineStep> + Send + Sync + 'static,
    {
        self.entries.push((name.into(), Arc::new(factory)));
        self
    }

    /// Register a shared instance (steps that track their own runs).
    pub fn register_shared(self, name: impl Into<String>, step: Arc<dyn PipelineStep>) -> Self {
        self.register(name, move || Arc::clone(&step))
    }

    /// Validate the registrations and build the registry.
    ///
    /// Duplicate names are logged and skipped (first registration wins);
    /// a malformed name is an error.
    pub fn discover(self) -> Result<StepRegistry, RegistryError> {
        let mut steps: HashMap<String, StepFactory> = HashMap::new();
        for (name, factory) in self.entries {
            if !is_valid_step_name(&name) {
                return Err(RegistryError::MalformedName(name));
            }
            if steps.contains_key(&name) {
                tracing::warn!(step = %name, "duplicate step registration, keeping first");
                continue;
            }
            tracing::info!(step = %name, "discovered pipeline step");
            steps.insert(name, factory);
        }
        for name in BUILTIN_STEPS {
            if !steps.contains_key(name) {
                tracing::debug!(step = name, "bundled step not registered in this build");
            }
        }
        Ok(StepRegistry { steps })
    }
}

/// Immutable name → factory table, written once at process start.
pub struct StepRegistry {
    steps: HashMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// Look up a step factory, resolving builtin aliases.
    pub fn find(&self, name: &str) -> Option<StepFactory> {
        if let Some(factory) = self.steps.get(name) {
            return Some(factory.clone());
        }
        let canonical = resolve_alias(name)?;
        self.steps.get(canonical).cloned()
    }

    /// Whether a request may name this step.
    pub fn knows(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Registered canonical names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.steps.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn resolve_alias(name: &str) -> Option<&'static str> {
    ALIASES.iter().find(|(alias, _)| *alias == name).map(|(_, canonical)| *canonical)
}

/// Step names match `[a-z_][a-z0-9_]*`.
pub fn is_valid_step_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
