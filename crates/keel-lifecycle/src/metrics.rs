//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::sync::Arc;

use keel_common::Topic;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

use crate::module::Phase;

/// Metrics published by the lifecycle engine.
#[derive(Clone)]
pub struct LifecycleMetrics {
    actions: IntCounterVec,
    failures: IntCounterVec,
    started: IntGauge,
    #[allow(dead_code)]
    registry: Arc<Registry>,
}

impl LifecycleMetrics {
    /// Register all lifecycle metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> prometheus::Result<Self> {
        let actions = IntCounterVec::new(
            Opts::new(
                "keel_lifecycle_actions_total",
                "Total number of lifecycle actions that completed successfully",
            ),
            &["topic", "phase"],
        )?;
        registry.register(Box::new(actions.clone()))?;

        let failures = IntCounterVec::new(
            Opts::new(
                "keel_lifecycle_action_failures_total",
                "Total number of lifecycle actions that returned an error",
            ),
            &["topic", "phase"],
        )?;
        registry.register(Box::new(failures.clone()))?;

        let started = IntGauge::with_opts(Opts::new(
            "keel_lifecycle_started_modules",
            "Number of modules currently started",
        ))?;
        registry.register(Box::new(started.clone()))?;

        Ok(Self {
            actions,
            failures,
            started,
            registry,
        })
    }

    /// Count a successful action.
    pub fn record_action(&self, topic: &Topic, phase: Phase) {
        self.actions
            .with_label_values(&[topic.as_str(), &phase.to_string()])
            .inc();
    }

    /// Count a failed action.
    pub fn record_failure(&self, topic: &Topic, phase: Phase) {
        self.failures
            .with_label_values(&[topic.as_str(), &phase.to_string()])
            .inc();
    }

    /// Publish the number of started modules.
    pub fn set_started(&self, count: usize) {
        self.started.set(count as i64);
    }

    /// Successful action count for `topic` in `phase`.
    pub fn actions(&self, topic: &Topic, phase: Phase) -> u64 {
        self.actions
            .with_label_values(&[topic.as_str(), &phase.to_string()])
            .get()
    }

    /// Failed action count for `topic` in `phase`.
    pub fn failures(&self, topic: &Topic, phase: Phase) -> u64 {
        self.failures
            .with_label_values(&[topic.as_str(), &phase.to_string()])
            .get()
    }

    /// Started module gauge value.
    pub fn started(&self) -> i64 {
        self.started.get()
    }
}

impl std::fmt::Debug for LifecycleMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleMetrics").finish_non_exhaustive()
    }
}
