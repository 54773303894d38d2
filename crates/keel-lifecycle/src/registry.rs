//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use indexmap::{IndexMap, IndexSet};
use keel_common::Topic;
use tracing::{debug, warn};

use crate::module::ModuleSpec;
use crate::{LifecycleError, Result};

/// Registered modules keyed by topic, in registration order.
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    modules: IndexMap<Topic, ModuleSpec>,
}

impl ModuleRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the module for `topic`.
    ///
    /// Structural checks only: dependency existence and cycles are checked
    /// when an operation runs, so modules may be registered in any order.
    /// Returns `true` when an earlier registration was replaced.
    pub fn register(&mut self, topic: Topic, spec: ModuleSpec) -> Result<bool> {
        validate(&topic, &spec)?;
        let replaced = self.modules.insert(topic.clone(), spec).is_some();
        if replaced {
            warn!(%topic, "module registration replaced");
        } else {
            debug!(%topic, "module registered");
        }
        Ok(replaced)
    }

    /// Spec registered for `topic`.
    pub fn get(&self, topic: &Topic) -> Option<&ModuleSpec> {
        self.modules.get(topic)
    }

    /// Whether `topic` is registered.
    pub fn contains(&self, topic: &Topic) -> bool {
        self.modules.contains_key(topic)
    }

    /// Registered topics in registration order.
    pub fn topics(&self) -> Vec<Topic> {
        self.modules.keys().cloned().collect()
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Topic to declared dependencies, in registration order.
    pub fn dependency_map(&self) -> IndexMap<Topic, Vec<Topic>> {
        self.modules
            .iter()
            .map(|(topic, spec)| (topic.clone(), spec.dependencies().to_vec()))
            .collect()
    }

    /// Registered modules that declare `topic` as a dependency.
    pub fn dependents_of(&self, topic: &Topic) -> Vec<Topic> {
        self.modules
            .iter()
            .filter(|(_, spec)| spec.dependencies().contains(topic))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }
}

fn validate(topic: &Topic, spec: &ModuleSpec) -> Result<()> {
    let invalid = |reason: String| LifecycleError::InvalidModuleSpec {
        topic: topic.clone(),
        reason,
    };
    if !topic.is_well_formed() {
        return Err(invalid("topic must not be blank".into()));
    }
    let mut seen = IndexSet::new();
    for dependency in spec.dependencies() {
        if !dependency.is_well_formed() {
            return Err(invalid("dependency topic must not be blank".into()));
        }
        if dependency == topic {
            return Err(invalid("module must not depend on itself".into()));
        }
        if !seen.insert(dependency) {
            return Err(invalid(format!("dependency {dependency} declared twice")));
        }
    }
    Ok(())
}
