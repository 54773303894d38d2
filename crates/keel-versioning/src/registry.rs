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

use indexmap::{IndexMap, IndexSet};
use keel_common::{Topic, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::{Result, VersioningError};

/// Action run when a topic crosses a version boundary.
pub type PatchAction = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Topic-specific lookup of the installed version, bypassing the store.
pub type InstalledResolver = Arc<dyn Fn() -> anyhow::Result<Version> + Send + Sync>;

/// Direction of travel between two versions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    /// Moving to a higher version.
    Upgrade,
    /// Moving to a lower version.
    Downgrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PatchKey {
    topic: Topic,
    version: Version,
    direction: Direction,
}

/// Registered action together with the version spelling it was registered under.
struct PatchEntry {
    version: Version,
    action: PatchAction,
}

#[derive(Default)]
struct RegistryInner {
    patches: IndexMap<PatchKey, PatchEntry>,
    targets: IndexMap<Topic, Version>,
    installed: IndexMap<Topic, InstalledResolver>,
}

/// Patch entries, declared target versions, and installed-version overrides.
///
/// Entries are keyed by `(topic, version, direction)`; registering the same
/// key again replaces the earlier action.
#[derive(Default)]
pub struct PatchRegistry {
    inner: RwLock<RegistryInner>,
}

impl PatchRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` for `topic` at `version` in `direction`.
    ///
    /// Returns `true` when an earlier action for the same key was replaced.
    /// Reports name the version as spelled by the latest registration.
    pub fn register<F>(
        &self,
        topic: impl Into<Topic>,
        version: impl Into<Version>,
        direction: Direction,
        action: F,
    ) -> bool
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let version = version.into();
        let key = PatchKey {
            topic: topic.into(),
            version: version.clone(),
            direction,
        };
        let entry = PatchEntry {
            version: version.clone(),
            action: Arc::new(action),
        };
        let replaced = self
            .inner
            .write()
            .patches
            .insert(key.clone(), entry)
            .is_some();
        if replaced {
            debug!(topic = %key.topic, %version, %direction, "patch re-registered; last registration wins");
        }
        replaced
    }

    /// Register an upgrade patch.
    pub fn upgrade<F>(&self, topic: impl Into<Topic>, version: impl Into<Version>, action: F) -> bool
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(topic, version, Direction::Upgrade, action)
    }

    /// Register a downgrade patch.
    pub fn downgrade<F>(
        &self,
        topic: impl Into<Topic>,
        version: impl Into<Version>,
        action: F,
    ) -> bool
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(topic, version, Direction::Downgrade, action)
    }

    /// Versions with a registered patch for `topic` in `direction`, ascending.
    pub fn patches(&self, topic: &Topic, direction: Direction) -> Vec<Version> {
        let mut versions: Vec<Version> = self
            .actions(topic, direction)
            .into_iter()
            .map(|(version, _)| version)
            .collect();
        versions.sort();
        versions
    }

    /// Registered `(version, action)` pairs for `topic` in `direction`, unordered.
    pub(crate) fn actions(&self, topic: &Topic, direction: Direction) -> Vec<(Version, PatchAction)> {
        self.inner
            .read()
            .patches
            .iter()
            .filter(|(key, _)| key.direction == direction && &key.topic == topic)
            .map(|(_, entry)| (entry.version.clone(), entry.action.clone()))
            .collect()
    }

    /// Declare the version this process expects `topic` to be at.
    ///
    /// Declaring the same version again is a no-op; a different version is
    /// rejected, use [`PatchRegistry::redefine_target`] to replace it.
    pub fn declare_target(&self, topic: impl Into<Topic>, version: impl Into<Version>) -> Result<()> {
        let topic = topic.into();
        let version = version.into();
        let mut inner = self.inner.write();
        match inner.targets.get(&topic) {
            Some(existing) if existing == &version => Ok(()),
            Some(existing) => Err(VersioningError::TargetRedeclared {
                topic,
                existing: existing.clone(),
                requested: version,
            }),
            None => {
                inner.targets.insert(topic, version);
                Ok(())
            }
        }
    }

    /// Replace the declared target for `topic`, returning the previous one.
    pub fn redefine_target(
        &self,
        topic: impl Into<Topic>,
        version: impl Into<Version>,
    ) -> Option<Version> {
        let topic = topic.into();
        let version = version.into();
        let previous = self.inner.write().targets.insert(topic.clone(), version.clone());
        if let Some(previous) = &previous {
            warn!(%topic, %previous, target = %version, "target version redefined");
        }
        previous
    }

    /// Declared target for `topic`.
    pub fn target(&self, topic: &Topic) -> Option<Version> {
        self.inner.read().targets.get(topic).cloned()
    }

    /// Every declared target, in declaration order.
    pub fn targets(&self) -> IndexMap<Topic, Version> {
        self.inner.read().targets.clone()
    }

    /// Resolve the installed version of `topic` with `resolver` instead of the store.
    pub fn override_installed<F>(&self, topic: impl Into<Topic>, resolver: F)
    where
        F: Fn() -> anyhow::Result<Version> + Send + Sync + 'static,
    {
        self.inner
            .write()
            .installed
            .insert(topic.into(), Arc::new(resolver));
    }

    pub(crate) fn installed_override(&self, topic: &Topic) -> Option<InstalledResolver> {
        self.inner.read().installed.get(topic).cloned()
    }

    /// Topics with a patch or a declared target, in first-registration order.
    pub fn topics(&self) -> Vec<Topic> {
        let inner = self.inner.read();
        let mut topics: IndexSet<Topic> = inner.patches.keys().map(|key| key.topic.clone()).collect();
        topics.extend(inner.targets.keys().cloned());
        topics.into_iter().collect()
    }
}

impl fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PatchRegistry")
            .field("patches", &inner.patches.len())
            .field("targets", &inner.targets)
            .field("installed_overrides", &inner.installed.len())
            .finish()
    }
}
