//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Brings a graph of interdependent modules into a consistent state.
//!
//! One-time resource creation (`setup`/`cleanup`) is tracked in a
//! [`LifecycleStore`](keel_persistence::LifecycleStore) and survives restarts;
//! per-boot activation (`start`/`stop`) is tracked in memory only.

use keel_common::Topic;
use keel_persistence::StoreError;

pub mod engine;
pub mod ledger;
pub mod metrics;
pub mod module;
pub mod registry;
pub mod report;
pub mod resolver;

pub use engine::{EngineConfig, LifecycleEngine};
pub use keel_common::MissingActionPolicy;
pub use ledger::ErrorRecord;
pub use metrics::LifecycleMetrics;
pub use module::{ModuleAction, ModuleSpec, Phase};
pub use registry::ModuleRegistry;
pub use report::{ModuleInfo, ModuleState, ModuleStatus, SystemStatus};
pub use resolver::{topological_order, DependencyGraph};

/// Result alias used throughout the lifecycle crate.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors raised by the module registry, the resolver, and the engine.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The operation referenced a topic that was never registered.
    #[error("module {0} is not registered")]
    ModuleNotRegistered(Topic),
    /// A declared dependency is absent from the registry.
    #[error("module {topic} depends on unregistered module {dependency}")]
    MissingDependency {
        /// Module declaring the dependency.
        topic: Topic,
        /// The absent dependency.
        dependency: Topic,
    },
    /// Topological resolution could not order these modules.
    #[error("circular dependency among modules: {}", join_topics(.unresolved))]
    CircularDependency {
        /// Modules left unordered, in registration order.
        unresolved: Vec<Topic>,
    },
    /// `setup`/`cleanup` was called without a lifecycle store bound.
    #[error("no lifecycle store configured")]
    NoStoreConfigured,
    /// A registration failed structural validation.
    #[error("invalid module spec for {topic}: {reason}")]
    InvalidModuleSpec {
        /// Module being registered.
        topic: Topic,
        /// What was wrong with it.
        reason: String,
    },
    /// Strict policy: `setup` requested for a module without a setup action.
    #[error("module {0} has no setup function")]
    ModuleHasNoSetupFunction(Topic),
    /// Strict policy: `cleanup` requested for a module without a cleanup action.
    #[error("module {0} has no cleanup function")]
    ModuleHasNoCleanupFunction(Topic),
    /// A module's setup, start, stop, or cleanup action failed.
    #[error("{phase} action for module {topic} failed")]
    ActionFailed {
        /// Module whose action failed.
        topic: Topic,
        /// Which action failed.
        phase: Phase,
        /// Error returned by the action.
        #[source]
        source: anyhow::Error,
    },
    /// The lifecycle store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Validation errors are raised before any action runs and are never
    /// written to the error ledger.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            LifecycleError::ActionFailed { .. } | LifecycleError::Store(_)
        )
    }

    /// Phase of the failing action, for action failures.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            LifecycleError::ActionFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

fn join_topics(topics: &[Topic]) -> String {
    topics
        .iter()
        .map(Topic::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circular_dependency_names_every_module() {
        let err = LifecycleError::CircularDependency {
            unresolved: vec!["a".into(), "b".into(), "c".into()],
        };
        assert_eq!(err.to_string(), "circular dependency among modules: a, b, c");
        assert!(err.is_validation());
    }

    #[test]
    fn action_failures_are_not_validation() {
        let err = LifecycleError::ActionFailed {
            topic: "db".into(),
            phase: Phase::Start,
            source: anyhow::anyhow!("port in use"),
        };
        assert_eq!(err.to_string(), "start action for module db failed");
        assert_eq!(err.phase(), Some(Phase::Start));
        assert!(!err.is_validation());
    }
}
