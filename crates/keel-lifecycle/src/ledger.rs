//! ---
//! keel_section: "05-lifecycle-orchestration"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Dependency-aware lifecycle engine for runtime modules."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::error::Error as StdError;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use keel_common::Topic;
use serde::Serialize;

use crate::module::Phase;
use crate::LifecycleError;

/// Last failure recorded for a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    /// Error message including its source chain.
    pub error: String,
    /// Phase of the failing action, when an action failed.
    pub phase: Option<Phase>,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub(crate) fn from_error(err: &LifecycleError) -> Self {
        Self {
            error: error_chain(err),
            phase: err.phase(),
            timestamp: Utc::now(),
        }
    }
}

/// Latest error per topic; a newer failure overwrites the older one.
#[derive(Debug, Default)]
pub(crate) struct ErrorLedger {
    records: IndexMap<Topic, ErrorRecord>,
}

impl ErrorLedger {
    pub(crate) fn record(&mut self, topic: &Topic, record: ErrorRecord) {
        self.records.insert(topic.clone(), record);
    }

    pub(crate) fn get(&self, topic: &Topic) -> Option<&ErrorRecord> {
        self.records.get(topic)
    }

    pub(crate) fn all(&self) -> IndexMap<Topic, ErrorRecord> {
        self.records.clone()
    }

    pub(crate) fn clear(&mut self, topic: &Topic) -> Option<ErrorRecord> {
        self.records.shift_remove(topic)
    }

    pub(crate) fn clear_all(&mut self) {
        self.records.clear();
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_source_chain() {
        let err = LifecycleError::ActionFailed {
            topic: "db".into(),
            phase: Phase::Setup,
            source: anyhow::anyhow!("permission denied").context("creating schema"),
        };
        let record = ErrorRecord::from_error(&err);
        assert_eq!(
            record.error,
            "setup action for module db failed: creating schema: permission denied"
        );
        assert_eq!(record.phase, Some(Phase::Setup));
    }

    #[test]
    fn newer_failure_overwrites() {
        let mut ledger = ErrorLedger::default();
        let topic = Topic::from("db");
        let first = LifecycleError::NoStoreConfigured;
        let second = LifecycleError::ModuleNotRegistered("cache".into());
        ledger.record(&topic, ErrorRecord::from_error(&first));
        ledger.record(&topic, ErrorRecord::from_error(&second));
        assert_eq!(ledger.get(&topic).unwrap().error, second.to_string());
        assert!(ledger.clear(&topic).is_some());
        assert!(ledger.all().is_empty());
    }
}
