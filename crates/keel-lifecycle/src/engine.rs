//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use keel_common::{LifecycleConfig, MissingActionPolicy, Topic};
use keel_persistence::{LifecycleState, LifecycleStore};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::ledger::{ErrorLedger, ErrorRecord};
use crate::metrics::LifecycleMetrics;
use crate::module::{ModuleSpec, Phase};
use crate::registry::ModuleRegistry;
use crate::resolver;
use crate::{LifecycleError, Result};

/// Engine behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// What `setup`/`cleanup` do for an explicitly requested module that
    /// declares no such action.
    pub missing_action_policy: MissingActionPolicy,
}

impl From<&LifecycleConfig> for EngineConfig {
    fn from(config: &LifecycleConfig) -> Self {
        Self {
            missing_action_policy: config.missing_action_policy,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct EngineState {
    pub(crate) registry: ModuleRegistry,
    pub(crate) started: IndexSet<Topic>,
    pub(crate) ledger: ErrorLedger,
}

/// Drives modules through setup, start, stop, and cleanup in dependency
/// order.
///
/// Transitions are serialised by a reentrant lock, so a module action may
/// call back into the engine from the same thread. The state mutex is never
/// held while an action runs.
pub struct LifecycleEngine {
    pub(crate) op_lock: ReentrantMutex<()>,
    pub(crate) state: Mutex<EngineState>,
    store: RwLock<Option<Arc<dyn LifecycleStore>>>,
    config: EngineConfig,
    metrics: Option<LifecycleMetrics>,
}

impl LifecycleEngine {
    /// Engine with default configuration and no lifecycle store.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Engine with `config` and no lifecycle store.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            op_lock: ReentrantMutex::new(()),
            state: Mutex::new(EngineState::default()),
            store: RwLock::new(None),
            config,
            metrics: None,
        }
    }

    /// Bind a lifecycle store.
    pub fn with_lifecycle_store(self, store: Arc<dyn LifecycleStore>) -> Self {
        *self.store.write() = Some(store);
        self
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: LifecycleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// Currently bound lifecycle store.
    pub fn store(&self) -> Option<Arc<dyn LifecycleStore>> {
        self.store.read().clone()
    }

    /// Replace the bound store, returning the previous binding.
    ///
    /// Waits for any transition in progress on another thread.
    pub fn set_store(
        &self,
        store: Option<Arc<dyn LifecycleStore>>,
    ) -> Option<Arc<dyn LifecycleStore>> {
        let _op = self.op_lock.lock();
        std::mem::replace(&mut *self.store.write(), store)
    }

    /// Run `f` with `store` bound, restoring the previous binding afterwards.
    ///
    /// Other threads cannot run transitions until `f` returns, so they never
    /// observe the scoped store.
    pub fn with_store<T>(&self, store: Arc<dyn LifecycleStore>, f: impl FnOnce(&Self) -> T) -> T {
        let _op = self.op_lock.lock();
        let previous = self.set_store(Some(store));
        let _restore = RestoreStore {
            engine: self,
            previous: Some(previous),
        };
        f(self)
    }

    /// Add or replace the module for `topic`.
    ///
    /// Dependencies need not be registered yet; they are resolved when an
    /// operation runs.
    pub fn register(&self, topic: impl Into<Topic>, spec: ModuleSpec) -> Result<()> {
        let _op = self.op_lock.lock();
        let topic = topic.into();
        self.state.lock().registry.register(topic, spec)?;
        Ok(())
    }

    /// Whether `topic` is currently started.
    pub fn is_started(&self, topic: &Topic) -> bool {
        self.state.lock().started.contains(topic)
    }

    /// Start `topic` after its dependencies, running its one-time setup first
    /// when a store is bound and setup has not completed.
    ///
    /// Every module is started at most once; starting a started module is a
    /// no-op. Missing dependencies and cycles are reported before any action
    /// runs.
    pub fn start(&self, topic: impl Into<Topic>) -> Result<()> {
        let _op = self.op_lock.lock();
        let topic = topic.into();
        if self.is_started(&topic) {
            debug!(%topic, "module already started");
            return Ok(());
        }
        self.validate_dependencies(&topic)?;
        self.start_module(&topic)
    }

    /// Stop `topic`. Dependencies and dependents are left alone.
    ///
    /// A failing stop action leaves the module started.
    pub fn stop(&self, topic: impl Into<Topic>) -> Result<()> {
        let _op = self.op_lock.lock();
        let topic = topic.into();
        self.spec(&topic)?;
        self.stop_module(&topic)
    }

    /// Stop then start `topic`.
    pub fn restart(&self, topic: impl Into<Topic>) -> Result<()> {
        let _op = self.op_lock.lock();
        let topic = topic.into();
        self.stop(&topic)?;
        self.start(&topic)
    }

    /// Stop every started module in reverse start order, halting at the
    /// first failure.
    pub fn stop_all(&self) -> Result<()> {
        let _op = self.op_lock.lock();
        let started: Vec<Topic> = self.state.lock().started.iter().rev().cloned().collect();
        for topic in started {
            self.stop_module(&topic)?;
        }
        Ok(())
    }

    /// Run one-time setup for each topic, after setting up and starting its
    /// dependencies. Completion is recorded in the lifecycle store.
    ///
    /// Every requested topic is validated before anything runs.
    pub fn setup<I, T>(&self, topics: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        let _op = self.op_lock.lock();
        let store = self.require_store()?;
        let topics: Vec<Topic> = topics.into_iter().map(Into::into).collect();
        for topic in &topics {
            self.validate_dependencies(topic)?;
            let spec = self.spec(topic)?;
            if !spec.has_setup() && self.config.missing_action_policy == MissingActionPolicy::Strict
            {
                return Err(LifecycleError::ModuleHasNoSetupFunction(topic.clone()));
            }
        }
        for topic in &topics {
            self.setup_module(topic, &store)?;
        }
        Ok(())
    }

    /// Undo `topic`'s setup, cleaning up every module that depends on it
    /// first. Completion is recorded in the lifecycle store after the
    /// cleanup action has run.
    pub fn cleanup(&self, topic: impl Into<Topic>) -> Result<()> {
        let _op = self.op_lock.lock();
        let store = self.require_store()?;
        let topic = topic.into();
        let spec = self.spec(&topic)?;
        if !spec.has_cleanup() && self.config.missing_action_policy == MissingActionPolicy::Strict {
            return Err(LifecycleError::ModuleHasNoCleanupFunction(topic));
        }
        self.validate_dependents(&topic)?;
        self.cleanup_module(&topic, &store)
    }

    fn start_module(&self, topic: &Topic) -> Result<()> {
        if self.is_started(topic) {
            return Ok(());
        }
        let spec = self.spec(topic)?;
        let result = self.start_steps(topic, &spec);
        self.recorded(topic, result)
    }

    fn start_steps(&self, topic: &Topic, spec: &ModuleSpec) -> Result<()> {
        if spec.has_setup() {
            if let Some(store) = self.store() {
                if !store.read(topic)?.setup_complete {
                    debug!(%topic, "setup incomplete; running setup before start");
                    self.setup_module(topic, &store)?;
                }
            }
        }
        for dependency in spec.dependencies() {
            self.start_module(dependency)?;
        }
        // setup may already have started this module through a reentrant call
        if self.is_started(topic) {
            return Ok(());
        }
        self.invoke(topic, spec, Phase::Start)?;
        let count = {
            let mut state = self.state.lock();
            state.started.insert(topic.clone());
            state.started.len()
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_started(count);
        }
        info!(%topic, "module started");
        Ok(())
    }

    fn stop_module(&self, topic: &Topic) -> Result<()> {
        if !self.is_started(topic) {
            debug!(%topic, "module not started; nothing to stop");
            return Ok(());
        }
        let spec = self.spec(topic)?;
        let result = self.invoke(topic, &spec, Phase::Stop);
        self.recorded(topic, result)?;
        let count = {
            let mut state = self.state.lock();
            state.started.shift_remove(topic);
            state.started.len()
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_started(count);
        }
        info!(%topic, "module stopped");
        Ok(())
    }

    fn setup_module(&self, topic: &Topic, store: &Arc<dyn LifecycleStore>) -> Result<()> {
        let spec = self.spec(topic)?;
        let result = self.setup_steps(topic, &spec, store);
        self.recorded(topic, result)
    }

    fn setup_steps(
        &self,
        topic: &Topic,
        spec: &ModuleSpec,
        store: &Arc<dyn LifecycleStore>,
    ) -> Result<()> {
        for dependency in spec.dependencies() {
            if !store.read(dependency)?.setup_complete {
                self.setup_module(dependency, store)?;
            }
        }
        for dependency in spec.dependencies() {
            self.start_module(dependency)?;
        }
        if store.read(topic)?.setup_complete {
            debug!(%topic, "setup already complete");
            return Ok(());
        }
        if spec.has_setup() {
            self.invoke(topic, spec, Phase::Setup)?;
        } else {
            debug!(%topic, "no setup action declared; recording setup as complete");
        }
        store.write(topic, LifecycleState::SET_UP)?;
        info!(%topic, "module setup complete");
        Ok(())
    }

    fn cleanup_module(&self, topic: &Topic, store: &Arc<dyn LifecycleStore>) -> Result<()> {
        let spec = self.spec(topic)?;
        let result = self.cleanup_steps(topic, &spec, store);
        self.recorded(topic, result)
    }

    fn cleanup_steps(
        &self,
        topic: &Topic,
        spec: &ModuleSpec,
        store: &Arc<dyn LifecycleStore>,
    ) -> Result<()> {
        let dependents = self.state.lock().registry.dependents_of(topic);
        for dependent in dependents {
            if !store.read(&dependent)?.cleanup_complete {
                self.cleanup_module(&dependent, store)?;
            }
        }
        self.stop_module(topic)?;
        if spec.has_cleanup() {
            self.invoke(topic, spec, Phase::Cleanup)?;
        } else {
            debug!(%topic, "no cleanup action declared; recording cleanup as complete");
        }
        store.write(topic, LifecycleState::CLEANED_UP)?;
        info!(%topic, "module cleanup complete");
        Ok(())
    }

    fn invoke(&self, topic: &Topic, spec: &ModuleSpec, phase: Phase) -> Result<()> {
        let Some(action) = spec.action(phase) else {
            return Ok(());
        };
        debug!(%topic, %phase, "running module action");
        match action() {
            Ok(()) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_action(topic, phase);
                }
                Ok(())
            }
            Err(source) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_failure(topic, phase);
                }
                error!(%topic, %phase, error = %format!("{source:#}"), "module action failed");
                Err(LifecycleError::ActionFailed {
                    topic: topic.clone(),
                    phase,
                    source,
                })
            }
        }
    }

    /// Write runtime failures of `topic` to the error ledger.
    fn recorded<T>(&self, topic: &Topic, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !err.is_validation() {
                warn!(%topic, error = %err, "recording module failure");
                self.state
                    .lock()
                    .ledger
                    .record(topic, ErrorRecord::from_error(err));
            }
        }
        result
    }

    pub(crate) fn spec(&self, topic: &Topic) -> Result<ModuleSpec> {
        self.state
            .lock()
            .registry
            .get(topic)
            .cloned()
            .ok_or_else(|| LifecycleError::ModuleNotRegistered(topic.clone()))
    }

    fn require_store(&self) -> Result<Arc<dyn LifecycleStore>> {
        self.store().ok_or(LifecycleError::NoStoreConfigured)
    }

    /// `topic` is registered, its transitive dependencies exist, and they
    /// form no cycle.
    fn validate_dependencies(&self, topic: &Topic) -> Result<()> {
        let modules = self.state.lock().registry.dependency_map();
        let closure = resolver::dependency_closure(&modules, topic)?;
        resolver::topological_order(&resolver::subgraph(&modules, &closure))?;
        Ok(())
    }

    /// The modules cleanup would recurse into form no cycle.
    fn validate_dependents(&self, topic: &Topic) -> Result<()> {
        let modules = self.state.lock().registry.dependency_map();
        let closure = resolver::dependents_closure(&modules, topic);
        resolver::topological_order(&resolver::subgraph(&modules, &closure))?;
        Ok(())
    }
}

impl Default for LifecycleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LifecycleEngine")
            .field("modules", &state.registry.len())
            .field("started", &state.started.len())
            .field("store_bound", &self.store.read().is_some())
            .field("config", &self.config)
            .finish()
    }
}

struct RestoreStore<'a> {
    engine: &'a LifecycleEngine,
    previous: Option<Option<Arc<dyn LifecycleStore>>>,
}

impl Drop for RestoreStore<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.engine.set_store(previous);
        }
    }
}
