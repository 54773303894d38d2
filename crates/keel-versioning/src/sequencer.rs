//! ---
//! keel_section: "04-versioning"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Version patch registry and sequencer."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use keel_common::{Topic, Version};
use keel_persistence::VersionStore;
use parking_lot::{ReentrantMutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::metrics::PatchMetrics;
use crate::registry::{Direction, PatchAction, PatchRegistry};
use crate::{Result, VersioningError};

/// Ordered patches selected to move a topic from one version to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchPlan {
    /// Topic being migrated.
    pub topic: Topic,
    /// Normalised starting version.
    pub from: Version,
    /// Requested version.
    pub to: Version,
    /// Direction of travel.
    pub direction: Direction,
    /// Patch versions in execution order.
    pub steps: Vec<Version>,
}

/// Result of [`PatchSequencer::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Current and target were already equal; nothing ran.
    Unchanged {
        /// The version the topic is at.
        version: Version,
    },
    /// Every selected patch ran and the target was recorded.
    Applied {
        /// Version before the call.
        from: Version,
        /// Version after the call.
        to: Version,
        /// Direction of travel.
        direction: Direction,
        /// Patch versions that ran, in order.
        executed: Vec<Version>,
    },
}

impl ApplyOutcome {
    /// Whether the call moved the topic to a new version.
    pub fn is_changed(&self) -> bool {
        matches!(self, ApplyOutcome::Applied { .. })
    }

    /// The version the topic is at after the call.
    pub fn version(&self) -> &Version {
        match self {
            ApplyOutcome::Unchanged { version } => version,
            ApplyOutcome::Applied { to, .. } => to,
        }
    }

    /// Patch versions that ran, in order.
    pub fn executed(&self) -> &[Version] {
        match self {
            ApplyOutcome::Unchanged { .. } => &[],
            ApplyOutcome::Applied { executed, .. } => executed,
        }
    }
}

/// Selects, orders, and runs patches, then records the reached version.
///
/// `apply` calls are serialised by a reentrant lock, so a patch action may
/// itself level another topic through the same sequencer.
pub struct PatchSequencer {
    registry: Arc<PatchRegistry>,
    store: RwLock<Option<Arc<dyn VersionStore>>>,
    metrics: Option<PatchMetrics>,
    apply_lock: ReentrantMutex<()>,
}

impl PatchSequencer {
    /// Sequencer over `registry` without a version store.
    pub fn new(registry: Arc<PatchRegistry>) -> Self {
        Self {
            registry,
            store: RwLock::new(None),
            metrics: None,
            apply_lock: ReentrantMutex::new(()),
        }
    }

    /// Bind a version store.
    pub fn with_version_store(self, store: Arc<dyn VersionStore>) -> Self {
        *self.store.write() = Some(store);
        self
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: PatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry the sequencer reads patches and targets from.
    pub fn registry(&self) -> &Arc<PatchRegistry> {
        &self.registry
    }

    /// Currently bound version store.
    pub fn store(&self) -> Option<Arc<dyn VersionStore>> {
        self.store.read().clone()
    }

    /// Replace the bound store, returning the previous binding.
    ///
    /// Waits for any `apply` in progress on another thread.
    pub fn set_store(&self, store: Option<Arc<dyn VersionStore>>) -> Option<Arc<dyn VersionStore>> {
        let _serial = self.apply_lock.lock();
        std::mem::replace(&mut *self.store.write(), store)
    }

    /// Run `f` with `store` bound, restoring the previous binding afterwards.
    ///
    /// Other threads cannot apply patches until `f` returns, so they never
    /// observe the scoped store.
    pub fn with_store<T>(&self, store: Arc<dyn VersionStore>, f: impl FnOnce(&Self) -> T) -> T {
        let _serial = self.apply_lock.lock();
        let previous = self.set_store(Some(store));
        let _restore = RestoreStore {
            sequencer: self,
            previous: Some(previous),
        };
        f(self)
    }

    /// Compute which patches `apply` would run, without running them.
    ///
    /// Returns `None` when `current` and `target` are equal.
    pub fn plan(
        &self,
        topic: &Topic,
        current: impl Into<Version>,
        target: impl Into<Version>,
    ) -> Option<PatchPlan> {
        let current = current.into();
        let target = target.into();
        self.select(topic, &current, &target).map(|(direction, steps)| PatchPlan {
            topic: topic.clone(),
            from: current,
            to: target,
            direction,
            steps: steps.into_iter().map(|(version, _)| version).collect(),
        })
    }

    /// Move `topic` from `current` to `target`.
    ///
    /// Upgrades run every patch in `(current, target]` ascending; downgrades
    /// run every downgrade patch in `(target, current]` descending. The first
    /// failing action aborts the call and nothing is recorded. On success the
    /// target is written to the version store, when one is bound.
    pub fn apply(
        &self,
        topic: &Topic,
        current: impl Into<Version>,
        target: impl Into<Version>,
    ) -> Result<ApplyOutcome> {
        let _serial = self.apply_lock.lock();
        let current = current.into();
        let target = target.into();
        let Some((direction, steps)) = self.select(topic, &current, &target) else {
            debug!(%topic, version = %current, "topic already at target version");
            return Ok(ApplyOutcome::Unchanged { version: current });
        };

        info!(%topic, from = %current, to = %target, %direction, patches = steps.len(), "applying patches");
        let mut executed = Vec::with_capacity(steps.len());
        for (version, action) in steps {
            if let Err(source) = action() {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failed(topic, direction);
                }
                error!(%topic, %version, %direction, error = %format!("{source:#}"), "patch failed; installed version unchanged");
                return Err(VersioningError::PatchFailed {
                    topic: topic.clone(),
                    version,
                    direction,
                    source,
                });
            }
            if let Some(metrics) = &self.metrics {
                metrics.record_executed(topic, direction);
            }
            debug!(%topic, %version, %direction, "patch executed");
            executed.push(version);
        }

        if let Some(store) = self.store() {
            store.write(topic, &target)?;
        }
        info!(%topic, version = %target, "topic version recorded");
        Ok(ApplyOutcome::Applied {
            from: current,
            to: target,
            direction,
            executed,
        })
    }

    /// Installed version of `topic`: the topic's override when registered,
    /// else the version store, else `"0"`.
    pub fn installed(&self, topic: &Topic) -> Result<Version> {
        let _serial = self.apply_lock.lock();
        if let Some(resolver) = self.registry.installed_override(topic) {
            return resolver().map_err(|source| VersioningError::InstalledOverrideFailed {
                topic: topic.clone(),
                source,
            });
        }
        match self.store() {
            Some(store) => Ok(store.read(topic)?),
            None => Ok(Version::origin()),
        }
    }

    /// Reconcile `topic` from its installed version to its declared target.
    pub fn level(&self, topic: &Topic) -> Result<ApplyOutcome> {
        let _serial = self.apply_lock.lock();
        let target = self
            .registry
            .target(topic)
            .ok_or_else(|| VersioningError::TargetNotDeclared(topic.clone()))?;
        let current = self.installed(topic)?;
        self.apply(topic, current, target)
    }

    /// Level every topic with a declared target, in declaration order,
    /// stopping at the first failure.
    pub fn level_all(&self) -> Result<Vec<(Topic, ApplyOutcome)>> {
        let _serial = self.apply_lock.lock();
        let mut outcomes = Vec::new();
        for topic in self.registry.targets().into_keys() {
            let outcome = self.level(&topic)?;
            outcomes.push((topic, outcome));
        }
        Ok(outcomes)
    }

    fn select(
        &self,
        topic: &Topic,
        current: &Version,
        target: &Version,
    ) -> Option<(Direction, Vec<(Version, PatchAction)>)> {
        if current == target {
            return None;
        }
        let direction = if target > current {
            Direction::Upgrade
        } else {
            Direction::Downgrade
        };
        let mut steps: Vec<(Version, PatchAction)> = self
            .registry
            .actions(topic, direction)
            .into_iter()
            .filter(|(version, _)| match direction {
                Direction::Upgrade => version > current && version <= target,
                Direction::Downgrade => version > target && version <= current,
            })
            .collect();
        match direction {
            Direction::Upgrade => steps.sort_by(|(a, _), (b, _)| a.cmp(b)),
            Direction::Downgrade => steps.sort_by(|(a, _), (b, _)| b.cmp(a)),
        }
        Some((direction, steps))
    }
}

impl fmt::Debug for PatchSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchSequencer")
            .field("registry", &self.registry)
            .field("store_bound", &self.store.read().is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

struct RestoreStore<'a> {
    sequencer: &'a PatchSequencer,
    previous: Option<Option<Arc<dyn VersionStore>>>,
}

impl Drop for RestoreStore<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.sequencer.set_store(previous);
        }
    }
}
