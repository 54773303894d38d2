//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
//! Dependency graph resolution.

use std::collections::{HashMap, VecDeque};

use indexmap::{IndexMap, IndexSet};
use keel_common::Topic;
use serde::Serialize;

use crate::{LifecycleError, Result};

/// Order `modules` so every module follows all of its dependencies.
///
/// Kahn's algorithm; ties are broken by map order, so the result is
/// deterministic. Fails with `MissingDependency` when an edge leaves the map
/// and with `CircularDependency` naming every module that could not be
/// ordered.
pub fn topological_order(modules: &IndexMap<Topic, Vec<Topic>>) -> Result<Vec<Topic>> {
    let mut pending: IndexMap<&Topic, usize> = IndexMap::with_capacity(modules.len());
    let mut dependents: HashMap<&Topic, Vec<&Topic>> = HashMap::new();
    for (topic, dependencies) in modules {
        let unique: IndexSet<&Topic> = dependencies.iter().collect();
        for dependency in &unique {
            if !modules.contains_key(*dependency) {
                return Err(LifecycleError::MissingDependency {
                    topic: topic.clone(),
                    dependency: (*dependency).clone(),
                });
            }
            dependents.entry(*dependency).or_default().push(topic);
        }
        pending.insert(topic, unique.len());
    }

    let mut ready: VecDeque<&Topic> = pending
        .iter()
        .filter(|(_, remaining)| **remaining == 0)
        .map(|(topic, _)| *topic)
        .collect();
    let mut order = Vec::with_capacity(modules.len());
    while let Some(topic) = ready.pop_front() {
        order.push(topic.clone());
        for dependent in dependents.get(topic).into_iter().flatten() {
            if let Some(remaining) = pending.get_mut(*dependent) {
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push_back(*dependent);
                }
            }
        }
    }

    if order.len() < modules.len() {
        let unresolved = pending
            .into_iter()
            .filter(|(_, remaining)| *remaining > 0)
            .map(|(topic, _)| topic.clone())
            .collect();
        return Err(LifecycleError::CircularDependency { unresolved });
    }
    Ok(order)
}

/// `root` and everything it transitively depends on.
///
/// Fails with `MissingDependency` on the first unregistered edge reached.
pub fn dependency_closure(
    modules: &IndexMap<Topic, Vec<Topic>>,
    root: &Topic,
) -> Result<IndexSet<Topic>> {
    if !modules.contains_key(root) {
        return Err(LifecycleError::ModuleNotRegistered(root.clone()));
    }
    let mut closure = IndexSet::new();
    let mut stack = vec![root.clone()];
    while let Some(topic) = stack.pop() {
        if !closure.insert(topic.clone()) {
            continue;
        }
        for dependency in modules.get(&topic).into_iter().flatten() {
            if !modules.contains_key(dependency) {
                return Err(LifecycleError::MissingDependency {
                    topic,
                    dependency: dependency.clone(),
                });
            }
            stack.push(dependency.clone());
        }
    }
    Ok(closure)
}

/// `root` and every registered module that transitively depends on it.
pub fn dependents_closure(modules: &IndexMap<Topic, Vec<Topic>>, root: &Topic) -> IndexSet<Topic> {
    let mut closure = IndexSet::new();
    let mut stack = vec![root.clone()];
    while let Some(topic) = stack.pop() {
        if !closure.insert(topic.clone()) {
            continue;
        }
        for (dependent, dependencies) in modules {
            if dependencies.contains(&topic) {
                stack.push(dependent.clone());
            }
        }
    }
    closure
}

/// Restrict `modules` to `members`, dropping edges that leave the subset.
pub fn subgraph(
    modules: &IndexMap<Topic, Vec<Topic>>,
    members: &IndexSet<Topic>,
) -> IndexMap<Topic, Vec<Topic>> {
    modules
        .iter()
        .filter(|(topic, _)| members.contains(*topic))
        .map(|(topic, dependencies)| {
            let inside = dependencies
                .iter()
                .filter(|dependency| members.contains(*dependency))
                .cloned()
                .collect();
            (topic.clone(), inside)
        })
        .collect()
}

/// Forward and reverse dependency edges of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    /// Module to the modules it depends on.
    pub dependencies: IndexMap<Topic, Vec<Topic>>,
    /// Module to the registered modules depending on it.
    pub dependents: IndexMap<Topic, Vec<Topic>>,
}

impl DependencyGraph {
    /// Build both edge directions from a dependency map.
    pub fn from_dependencies(dependencies: IndexMap<Topic, Vec<Topic>>) -> Self {
        let mut dependents: IndexMap<Topic, Vec<Topic>> = dependencies
            .keys()
            .map(|topic| (topic.clone(), Vec::new()))
            .collect();
        for (topic, deps) in &dependencies {
            for dependency in deps {
                if let Some(list) = dependents.get_mut(dependency) {
                    list.push(topic.clone());
                }
            }
        }
        Self {
            dependencies,
            dependents,
        }
    }

    /// Declared dependencies that are not registered, as `(module, dependency)`.
    pub fn missing(&self) -> Vec<(Topic, Topic)> {
        let mut missing = Vec::new();
        for (topic, deps) in &self.dependencies {
            for dependency in deps {
                if !self.dependencies.contains_key(dependency) {
                    missing.push((topic.clone(), dependency.clone()));
                }
            }
        }
        missing
    }
}
