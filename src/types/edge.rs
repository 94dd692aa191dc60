//! Edge type for the workflow graph.

use serde::{Deserialize, Serialize};

use super::step::StepId;

/// Directed edge from a parent step to a child step.
///
/// Implements `Ord` for canonical ordering: (parent, child).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Parent step (source).
    pub parent: StepId,
    /// Child step (target).
    pub child: StepId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(parent: StepId, child: StepId) -> Self {
        Self { parent, child }
    }
}

// Canonical ordering: parent, then child
impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.parent
            .cmp(&other.parent)
            .then_with(|| self.child.cmp(&other.child))
    }
}
