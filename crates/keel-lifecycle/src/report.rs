//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
//! Read-only views of engine state.

use indexmap::IndexMap;
use keel_common::Topic;
use keel_persistence::LifecycleState;
use serde::Serialize;

use crate::engine::LifecycleEngine;
use crate::ledger::ErrorRecord;
use crate::resolver::{self, DependencyGraph};
use crate::Result;

/// Everything the engine knows about one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    /// Module topic.
    pub topic: Topic,
    /// Declared dependencies.
    pub depends_on: Vec<Topic>,
    /// Registered modules declaring this one as a dependency.
    pub dependents: Vec<Topic>,
    /// Whether the module is currently started.
    pub started: bool,
    /// Whether a setup action was declared.
    pub has_setup: bool,
    /// Whether a cleanup action was declared.
    pub has_cleanup: bool,
    /// Persisted flags, when a lifecycle store is bound.
    pub persisted: Option<LifecycleState>,
    /// Latest recorded failure.
    pub last_error: Option<ErrorRecord>,
}

/// Coarse state of a module in a [`SystemStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Currently started.
    Started,
    /// Not started, no recorded failure.
    Stopped,
    /// Not started, with a recorded failure.
    Failed,
    /// Declares a dependency that is not registered.
    Unresolved,
}

/// One row of a [`SystemStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatus {
    /// Module topic.
    pub topic: Topic,
    /// Coarse state.
    pub state: ModuleState,
    /// Persisted flags, when a lifecycle store is bound.
    pub persisted: Option<LifecycleState>,
    /// Declared dependencies that are not registered.
    pub missing_dependencies: Vec<Topic>,
    /// Latest recorded failure.
    pub error: Option<ErrorRecord>,
}

/// Snapshot of every registered module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    /// Number of registered modules.
    pub total: usize,
    /// Modules in [`ModuleState::Started`].
    pub started: usize,
    /// Modules in [`ModuleState::Stopped`].
    pub stopped: usize,
    /// Modules in [`ModuleState::Failed`].
    pub failed: usize,
    /// Modules in [`ModuleState::Unresolved`].
    pub unresolved: usize,
    /// Modules whose setup is recorded as complete; `None` without a store.
    pub setup_complete: Option<usize>,
    /// Per-module rows, in registration order.
    pub modules: Vec<ModuleStatus>,
    /// Recorded failures by topic.
    pub errors: IndexMap<Topic, ErrorRecord>,
}

impl SystemStatus {
    /// No failures are recorded and no dependency is missing.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
            && self
                .modules
                .iter()
                .all(|module| module.missing_dependencies.is_empty())
    }
}

impl LifecycleEngine {
    /// Registered topics in registration order.
    pub fn registered_topics(&self) -> Vec<Topic> {
        self.state.lock().registry.topics()
    }

    /// Started topics in start order.
    pub fn started_topics(&self) -> Vec<Topic> {
        self.state.lock().started.iter().cloned().collect()
    }

    /// Details for `topic`.
    pub fn module_info(&self, topic: &Topic) -> Result<ModuleInfo> {
        let _op = self.op_lock.lock();
        let spec = self.spec(topic)?;
        let (dependents, started, last_error) = {
            let state = self.state.lock();
            (
                state.registry.dependents_of(topic),
                state.started.contains(topic),
                state.ledger.get(topic).cloned(),
            )
        };
        let persisted = match self.store() {
            Some(store) => Some(store.read(topic)?),
            None => None,
        };
        Ok(ModuleInfo {
            topic: topic.clone(),
            depends_on: spec.dependencies().to_vec(),
            dependents,
            started,
            has_setup: spec.has_setup(),
            has_cleanup: spec.has_cleanup(),
            persisted,
            last_error,
        })
    }

    /// Forward and reverse dependency edges of every registered module.
    pub fn dependency_graph(&self) -> DependencyGraph {
        DependencyGraph::from_dependencies(self.state.lock().registry.dependency_map())
    }

    /// Order in which every registered module would start.
    pub fn startup_order(&self) -> Result<Vec<Topic>> {
        let modules = self.state.lock().registry.dependency_map();
        resolver::topological_order(&modules)
    }

    /// Recorded failures by topic.
    pub fn errors(&self) -> IndexMap<Topic, ErrorRecord> {
        self.state.lock().ledger.all()
    }

    /// Latest failure recorded for `topic`.
    pub fn error(&self, topic: &Topic) -> Option<ErrorRecord> {
        self.state.lock().ledger.get(topic).cloned()
    }

    /// Forget the failure recorded for `topic`.
    pub fn clear_error(&self, topic: &Topic) -> Option<ErrorRecord> {
        self.state.lock().ledger.clear(topic)
    }

    /// Forget every recorded failure.
    pub fn clear_errors(&self) {
        self.state.lock().ledger.clear_all();
    }

    /// Snapshot of every registered module.
    pub fn status(&self) -> Result<SystemStatus> {
        let _op = self.op_lock.lock();
        let (dependencies, started, errors) = {
            let state = self.state.lock();
            (
                state.registry.dependency_map(),
                state.started.clone(),
                state.ledger.all(),
            )
        };
        let store = self.store();
        let mut modules = Vec::with_capacity(dependencies.len());
        for (topic, deps) in &dependencies {
            let missing_dependencies: Vec<Topic> = deps
                .iter()
                .filter(|dependency| !dependencies.contains_key(*dependency))
                .cloned()
                .collect();
            let state = if started.contains(topic) {
                ModuleState::Started
            } else if !missing_dependencies.is_empty() {
                ModuleState::Unresolved
            } else if errors.contains_key(topic) {
                ModuleState::Failed
            } else {
                ModuleState::Stopped
            };
            let persisted = match &store {
                Some(store) => Some(store.read(topic)?),
                None => None,
            };
            modules.push(ModuleStatus {
                topic: topic.clone(),
                state,
                persisted,
                missing_dependencies,
                error: errors.get(topic).cloned(),
            });
        }
        let count = |wanted: ModuleState| modules.iter().filter(|m| m.state == wanted).count();
        let setup_complete = store.as_ref().map(|_| {
            modules
                .iter()
                .filter(|m| m.persisted.is_some_and(|p| p.setup_complete))
                .count()
        });
        Ok(SystemStatus {
            total: modules.len(),
            started: count(ModuleState::Started),
            stopped: count(ModuleState::Stopped),
            failed: count(ModuleState::Failed),
            unresolved: count(ModuleState::Unresolved),
            setup_complete,
            modules,
            errors,
        })
    }
}
