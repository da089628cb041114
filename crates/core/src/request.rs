// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-facing ingestion request surface and its validation.

use crate::id::JobId;
use crate::status::JobStatus;
use crate::step::{JsonMap, RetryPolicy};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Steps run when the request does not name any.
pub const DEFAULT_STEPS: [&str; 4] = ["filesystem", "blarify", "summarizer", "docgrapher"];

/// Where the repository comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LocalPath,
    GitUrl,
    GithubUrl,
    /// `owner/repo` shorthand
    GithubRepo,
}

crate::simple_display! {
    SourceKind {
        LocalPath => "local_path",
        GitUrl => "git_url",
        GithubUrl => "github_url",
        GithubRepo => "github_repo",
    }
}

/// Dispatch priority; maps 1:1 onto the broker queue names.
///
/// Values outside the closed set fall through to `Default` when
/// deserializing, so an unknown priority never rejects a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Default,
    Low,
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Default,
        })
    }
}

crate::simple_display! {
    Priority {
        High => "high",
        Default => "default",
        Low => "low",
    }
}

/// A malformed client request (HTTP 400).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("source cannot be empty")]
    EmptySource,

    #[error("branch can only be specified for git repositories")]
    BranchWithLocalPath,

    #[error("git URL '{0}' should start with git://, http://, https://, or ssh://")]
    InvalidGitUrl(String),

    #[error("github repo '{0}' should be in the form 'owner/repo'")]
    InvalidGithubRepo(String),

    #[error("unknown step: {0}")]
    UnknownStep(String),

    #[error("duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("unsupported sort field: {0}")]
    InvalidSortField(String),

    #[error("unknown status filter: {0}")]
    InvalidStatusFilter(String),
}

/// Request body for `POST /v1/ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionRequest {
    pub source_type: SourceKind,
    /// Path or URL of the repository.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Steps to run; defaults to the full pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<String>>,
    /// Additional configuration (e.g. a `retry` block).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Options forwarded to each step, subject to per-step filtering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<JsonMap>,
    #[serde(default)]
    pub priority: Priority,
    /// Job ids that must complete before this job may start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Absolute start time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    /// Relative start delay in seconds; ignored when `eta` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl IngestionRequest {
    pub fn new(source_type: SourceKind, source: impl Into<String>) -> Self {
        Self {
            source_type,
            source: source.into(),
            branch: None,
            steps: None,
            config: None,
            options: None,
            priority: Priority::Default,
            dependencies: Vec::new(),
            eta: None,
            countdown: None,
            created_by: None,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Structural validation; step-name checks happen against the registry
    /// in the service layer.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        match self.source_type {
            SourceKind::LocalPath => {
                if self.branch.is_some() {
                    return Err(ValidationError::BranchWithLocalPath);
                }
            }
            SourceKind::GitUrl | SourceKind::GithubUrl => {
                let ok = ["git://", "http://", "https://", "ssh://"]
                    .iter()
                    .any(|scheme| self.source.starts_with(scheme));
                if !ok {
                    return Err(ValidationError::InvalidGitUrl(self.source.clone()));
                }
            }
            SourceKind::GithubRepo => {
                if self.source.matches('/').count() != 1 {
                    return Err(ValidationError::InvalidGithubRepo(self.source.clone()));
                }
            }
        }
        let mut seen = std::collections::HashSet::new();
        for name in self.step_names() {
            if !seen.insert(name.clone()) {
                return Err(ValidationError::DuplicateStep(name));
            }
        }
        Ok(())
    }

    /// The step names this request will run, defaulted when absent.
    pub fn step_names(&self) -> Vec<String> {
        match &self.steps {
            Some(steps) if !steps.is_empty() => steps.clone(),
            _ => DEFAULT_STEPS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The global retry block from `config.retry`, defaulted when absent.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config
            .as_ref()
            .and_then(|config| config.get("retry"))
            .and_then(|retry| serde_json::from_value(retry.clone()).ok())
            .unwrap_or_default()
    }
}

/// Response body for a successful `POST /v1/ingest` (HTTP 202).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionStarted {
    pub job_id: JobId,
    pub status: JobStatus,
    pub source: String,
    pub steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Estimated start time (epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
