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

use keel_common::Topic;
use serde::Serialize;
use strum::Display;

/// Setup, cleanup, start, or stop callback of a module.
pub type ModuleAction = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Lifecycle action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    /// One-time resource creation.
    Setup,
    /// Per-boot activation.
    Start,
    /// Per-boot deactivation.
    Stop,
    /// Reverse of setup.
    Cleanup,
}

fn noop() -> ModuleAction {
    Arc::new(|| Ok(()))
}

/// Declaration of a module: its dependencies and lifecycle actions.
///
/// `start` and `stop` default to no-ops; `setup` and `cleanup` are optional.
#[derive(Clone)]
pub struct ModuleSpec {
    depends_on: Vec<Topic>,
    setup: Option<ModuleAction>,
    cleanup: Option<ModuleAction>,
    start: ModuleAction,
    stop: ModuleAction,
}

impl ModuleSpec {
    /// A module with no dependencies and no-op start/stop.
    pub fn new() -> Self {
        Self {
            depends_on: Vec::new(),
            setup: None,
            cleanup: None,
            start: noop(),
            stop: noop(),
        }
    }

    /// Declare dependencies, in the order they are started.
    pub fn depends_on<I, T>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        self.depends_on
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Set the one-time setup action.
    pub fn on_setup<F>(mut self, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(action));
        self
    }

    /// Set the cleanup action.
    pub fn on_cleanup<F>(mut self, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.cleanup = Some(Arc::new(action));
        self
    }

    /// Set the start action.
    pub fn on_start<F>(mut self, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.start = Arc::new(action);
        self
    }

    /// Set the stop action.
    pub fn on_stop<F>(mut self, action: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.stop = Arc::new(action);
        self
    }

    /// Declared dependencies.
    pub fn dependencies(&self) -> &[Topic] {
        &self.depends_on
    }

    /// Whether a setup action was declared.
    pub fn has_setup(&self) -> bool {
        self.setup.is_some()
    }

    /// Whether a cleanup action was declared.
    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }

    pub(crate) fn action(&self, phase: Phase) -> Option<&ModuleAction> {
        match phase {
            Phase::Setup => self.setup.as_ref(),
            Phase::Cleanup => self.cleanup.as_ref(),
            Phase::Start => Some(&self.start),
            Phase::Stop => Some(&self.stop),
        }
    }
}

impl Default for ModuleSpec {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSpec")
            .field("depends_on", &self.depends_on)
            .field("has_setup", &self.has_setup())
            .field("has_cleanup", &self.has_cleanup())
            .finish_non_exhaustive()
    }
}
