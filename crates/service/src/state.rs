// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root: assembles registry, broker, store, bus, scheduler,
//! and service, and owns the handles the API layer needs.

use crate::env::ServiceConfig;
use crate::service::IngestionService;
use codeloom_broker::{LocalBroker, LocalBrokerConfig, TaskBroker};
use codeloom_core::{Clock, SystemClock};
use codeloom_engine::{
    DependencyScheduler, IngestionExecutor, IngestionMetrics, PipelineOrchestrator, StepRunner,
};
use codeloom_steps::StepRegistry;
use codeloom_storage::{JobStore, KeyValueStore, MemoryStore, ProgressBus};
use std::sync::Arc;

/// Shared state for every request handler.
pub struct AppState<C: Clock = SystemClock> {
    pub service: Arc<IngestionService<C>>,
    pub broker: Arc<dyn TaskBroker>,
    pub kv: Arc<dyn KeyValueStore>,
    pub bus: Arc<ProgressBus>,
    pub store: Arc<JobStore>,
    pub metrics: Arc<IngestionMetrics>,
    pub config: ServiceConfig,
}

impl<C: Clock> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            broker: Arc::clone(&self.broker),
            kv: Arc::clone(&self.kv),
            bus: Arc::clone(&self.bus),
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

impl<C: Clock> AppState<C> {
    /// Wire everything together and start the worker pool and the
    /// dependency-release loop. Must run inside a tokio runtime.
    pub fn assemble(config: ServiceConfig, registry: Arc<StepRegistry>, clock: C) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(clock.clone()));
        let bus = Arc::new(ProgressBus::new(Arc::clone(&kv)));
        let store = Arc::new(JobStore::new());
        let metrics = Arc::new(IngestionMetrics::new());

        let local_broker = Arc::new(LocalBroker::with_clock(
            LocalBrokerConfig {
                concurrency: config.worker_concurrency.max(2),
                task_timeout: config.task_timeout,
            },
            clock.clone(),
        ));
        let broker: Arc<dyn TaskBroker> = Arc::clone(&local_broker) as Arc<dyn TaskBroker>;

        let runner = Arc::new(StepRunner::new(
            Arc::clone(&registry),
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&metrics),
            clock.clone(),
            config.task_timeout,
        ));
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            Arc::clone(&broker),
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&metrics),
            clock.clone(),
        ));
        local_broker.start_workers(Arc::new(IngestionExecutor::new(runner, orchestrator)));

        let scheduler = Arc::new(DependencyScheduler::new(Arc::clone(&kv), Arc::clone(&bus)));
        let service = Arc::new(IngestionService::new(
            registry,
            Arc::clone(&broker),
            Arc::clone(&store),
            Arc::clone(&bus),
            scheduler,
            Arc::clone(&metrics),
            clock,
        ));
        tokio::spawn(Arc::clone(&service).run_release_loop());

        Self { service, broker, kv, bus, store, metrics, config }
    }
}
