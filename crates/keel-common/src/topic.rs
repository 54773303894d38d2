//! ---
//! keel_section: "01-core-functionality"
//! keel_subsection: "module"
//! keel_type: "source"
//! keel_scope: "code"
//! keel_description: "Shared primitives and utilities for the patch and lifecycle engines."
//! keel_version: "v0.0.0-prealpha"
//! keel_owner: "tbd"
//! ---
use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

const NAMESPACE_SEPARATOR: char = '/';

/// Identifier of a versioned or lifecycle-managed component.
///
/// Topics are opaque, comparable names. By convention they are namespaced as
/// `namespace/name`, but nothing in the engines depends on that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from any string-like name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Create a topic of the form `namespace/name`.
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}{NAMESPACE_SEPARATOR}{name}"))
    }

    /// Borrow the raw topic string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace portion of the topic, if it has one.
    pub fn namespace(&self) -> Option<&str> {
        self.0
            .rsplit_once(NAMESPACE_SEPARATOR)
            .map(|(namespace, _)| namespace)
    }

    /// Unqualified name portion of the topic.
    pub fn name(&self) -> &str {
        self.0
            .rsplit_once(NAMESPACE_SEPARATOR)
            .map_or(self.0.as_str(), |(_, name)| name)
    }

    /// A topic is well formed when it is non-empty and free of whitespace.
    pub fn is_well_formed(&self) -> bool {
        !self.0.is_empty() && !self.0.chars().any(char::is_whitespace)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Topic> for Topic {
    fn from(value: &Topic) -> Self {
        value.clone()
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}
