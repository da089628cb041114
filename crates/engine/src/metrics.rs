// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Prometheus metric families. The metric names are an external
//! contract; dashboards and alerts key on them.

use codeloom_core::{JobStatus, StepStatus};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct IngestionMetrics {
    registry: Registry,
    jobs_total: IntCounterVec,
    steps_total: IntCounterVec,
    step_duration_seconds: HistogramVec,
    active_steps: IntGauge,
    errors_total: IntCounterVec,
}

impl IngestionMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let jobs_total = IntCounterVec::new(
            Opts::new("codeloom_ingestion_jobs_total", "Total number of ingestion jobs"),
            &["status"],
        )
        .unwrap_or_else(|e| unreachable!("static metric definition: {e}"));

        let steps_total = IntCounterVec::new(
            Opts::new(
                "codeloom_ingestion_steps_total",
                "Total number of ingestion steps executed",
            ),
            &["step_name", "status"],
        )
        .unwrap_or_else(|e| unreachable!("static metric definition: {e}"));

        let step_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "codeloom_ingestion_step_duration_seconds",
                "Duration of ingestion steps in seconds",
            ),
            &["step_name"],
        )
        .unwrap_or_else(|e| unreachable!("static metric definition: {e}"));

        let active_steps = IntGauge::new(
            "codeloom_ingestion_active_steps",
            "Number of currently executing ingestion steps",
        )
        .unwrap_or_else(|e| unreachable!("static metric definition: {e}"));

        let errors_total = IntCounterVec::new(
            Opts::new("codeloom_ingestion_errors_total", "Ingestion errors by kind"),
            &["kind"],
        )
        .unwrap_or_else(|e| unreachable!("static metric definition: {e}"));

        for collector in [
            Box::new(jobs_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(steps_total.clone()),
            Box::new(step_duration_seconds.clone()),
            Box::new(active_steps.clone()),
            Box::new(errors_total.clone()),
        ] {
            registry
                .register(collector)
                .unwrap_or_else(|e| unreachable!("fresh registry: {e}"));
        }

        Self { registry, jobs_total, steps_total, step_duration_seconds, active_steps, errors_total }
    }

    pub fn record_job(&self, status: JobStatus) {
        self.jobs_total.with_label_values(&[&status.to_string()]).inc();
    }

    pub fn record_step(&self, step_name: &str, status: StepStatus, duration_seconds: Option<f64>) {
        self.steps_total.with_label_values(&[step_name, &status.to_string()]).inc();
        if let Some(duration) = duration_seconds {
            self.step_duration_seconds.with_label_values(&[step_name]).observe(duration);
        }
    }

    pub fn step_started(&self) {
        self.active_steps.inc();
    }

    pub fn step_finished(&self) {
        self.active_steps.dec();
    }

    pub fn record_error(&self, kind: &str) {
        self.errors_total.with_label_values(&[kind]).inc();
    }

    pub fn active_steps(&self) -> i64 {
        self.active_steps.get()
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for IngestionMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
