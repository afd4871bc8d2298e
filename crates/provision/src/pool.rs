//! Kind-scoped pool of available projects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Available projects per resource kind.
///
/// Pool members of a kind are interchangeable; [`ProjectPool::pop`] hands
/// out the most recently inserted project first. A run mutates its own
/// clone of the pool, so the broker's backing inventory is untouched until
/// the run succeeds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectPool {
    kinds: BTreeMap<String, Vec<String>>,
}

impl ProjectPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML pool document (resource kind to list of project ids).
    ///
    /// # Errors
    /// Returns an error if the document is not a map of string lists.
    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    /// Add a project to a kind's pool.
    pub fn insert(&mut self, kind: impl Into<String>, project: impl Into<String>) {
        self.kinds.entry(kind.into()).or_default().push(project.into());
    }

    /// Remove and return the last-inserted project for `kind`.
    ///
    /// `None` means the pool is exhausted for that kind, which is fatal to
    /// the run requesting it.
    pub fn pop(&mut self, kind: &str) -> Option<String> {
        self.kinds.get_mut(kind).and_then(Vec::pop)
    }

    /// Number of projects left for `kind`.
    #[must_use]
    pub fn available(&self, kind: &str) -> usize {
        self.kinds.get(kind).map_or(0, Vec::len)
    }
}

/// A popped project together with its pre-fetched zone list.
///
/// Exclusively owned by the coordinator for the duration of one run; never
/// shared across concurrent requests.
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    /// Opaque project identifier.
    pub id: String,
    /// Zones available to the project, in provider order.
    pub zones: Vec<String>,
}
