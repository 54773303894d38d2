//! ---
//! keel_section: "04-versioning"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Version patch registry and sequencer."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::sync::Arc;

use keel_common::Topic;
use prometheus::{IntCounterVec, Opts, Registry};

use crate::registry::Direction;

/// Metrics published by the patch sequencer.
#[derive(Clone)]
pub struct PatchMetrics {
    executed: IntCounterVec,
    failed: IntCounterVec,
    #[allow(dead_code)]
    registry: Arc<Registry>,
}

impl PatchMetrics {
    /// Register all patch metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> prometheus::Result<Self> {
        let executed = IntCounterVec::new(
            Opts::new(
                "keel_patches_executed_total",
                "Total number of patch actions that completed successfully",
            ),
            &["topic", "direction"],
        )?;
        registry.register(Box::new(executed.clone()))?;

        let failed = IntCounterVec::new(
            Opts::new(
                "keel_patch_failures_total",
                "Total number of patch actions that returned an error",
            ),
            &["topic", "direction"],
        )?;
        registry.register(Box::new(failed.clone()))?;

        Ok(Self {
            executed,
            failed,
            registry,
        })
    }

    /// Count a successful patch action.
    pub fn record_executed(&self, topic: &Topic, direction: Direction) {
        self.executed
            .with_label_values(&[topic.as_str(), &direction.to_string()])
            .inc();
    }

    /// Count a failed patch action.
    pub fn record_failed(&self, topic: &Topic, direction: Direction) {
        self.failed
            .with_label_values(&[topic.as_str(), &direction.to_string()])
            .inc();
    }

    /// Successful patch count for `topic` in `direction`.
    pub fn executed(&self, topic: &Topic, direction: Direction) -> u64 {
        self.executed
            .with_label_values(&[topic.as_str(), &direction.to_string()])
            .get()
    }

    /// Failed patch count for `topic` in `direction`.
    pub fn failed(&self, topic: &Topic, direction: Direction) -> u64 {
        self.failed
            .with_label_values(&[topic.as_str(), &direction.to_string()])
            .get()
    }
}

impl std::fmt::Debug for PatchMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchMetrics").finish_non_exhaustive()
    }
}
