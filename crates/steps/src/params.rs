// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-step option filtering.
//!
//! Different steps accept different option keys; forwarding an unknown
//! key is an argument error inside the step. The runner filters every
//! option map through this table before invoking a step.

use codeloom_core::JsonMap;

/// Keys the summarizer and documentation grapher accept.
const SAFE_KEYS: [&str; 4] = ["job_id", "ignore_patterns", "timeout", "incremental"];

/// Filter a step's options according to its allow-list.
///
/// - `blarify`: everything except `concurrency`
/// - `summarizer` / `documentation_grapher`: only the safe keys plus
///   `<step>_specific`
/// - all others: passed through unchanged
pub fn filter_options(step_name: &str, options: &JsonMap) -> JsonMap {
    match step_name {
        "blarify" => options
            .iter()
            .filter(|(key, _)| key.as_str() != "concurrency")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        "summarizer" | "documentation_grapher" | "docgrapher" => {
            let specific = format!("{step_name}_specific");
            options
                .iter()
                .filter(|(key, _)| SAFE_KEYS.contains(&key.as_str()) || *key == &specific)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        }
        _ => options.clone(),
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
