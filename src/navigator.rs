//! Stateless queries over store adjacency.
//!
//! All queries are total: unknown ids yield `false`/`None` rather than
//! errors, because interactive affordances poll these continuously.

use std::cmp::Ordering;

use crate::store::StepStore;
use crate::types::StepId;

/// Borrowed, side-effect-free query view over a [`StepStore`].
#[derive(Debug, Clone, Copy)]
pub struct Navigator<'a> {
    store: &'a StepStore,
}

impl<'a> Navigator<'a> {
    /// Create a navigator over a store.
    pub fn new(store: &'a StepStore) -> Self {
        Self { store }
    }

    /// Exactly one outbound edge and not Initial.
    pub fn is_pipe(&self, id: StepId) -> bool {
        id != self.store.initial()
            && self.store.contains(id)
            && self.store.out_degree(id) == 1
    }

    /// Exactly one inbound edge and not Initial; eligible to fold into a
    /// predecessor's segment.
    pub fn can_hide(&self, id: StepId) -> bool {
        id != self.store.initial()
            && self.store.contains(id)
            && self.store.in_degree(id) == 1
    }

    /// Zero outbound edges.
    pub fn is_leaf(&self, id: StepId) -> bool {
        self.store.contains(id) && self.store.out_degree(id) == 0
    }

    /// More than one outbound edge.
    pub fn is_branch(&self, id: StepId) -> bool {
        self.store.out_degree(id) > 1
    }

    /// More than one inbound edge.
    pub fn is_merge(&self, id: StepId) -> bool {
        self.store.in_degree(id) > 1
    }

    /// The unique predecessor, if exactly one exists.
    ///
    /// `None` is not an error; callers use this to walk chains cheaply.
    pub fn previous(&self, id: StepId) -> Option<StepId> {
        let parents = self.store.parents_of(id);
        match parents.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The unique successor, if exactly one exists.
    pub fn next(&self, id: StepId) -> Option<StepId> {
        let children = self.store.children_of(id);
        match children.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Head steps: zero outbound edges, Initial excluded unless it is the
    /// only step.
    pub fn heads(&self) -> Vec<StepId> {
        let initial = self.store.initial();
        if self.store.step_count() == 1 {
            return vec![initial];
        }
        self.store
            .all_step_ids()
            .into_iter()
            .filter(|id| *id != initial && self.store.out_degree(*id) == 0)
            .collect()
    }

    /// Whether a step is a head.
    pub fn is_head(&self, id: StepId) -> bool {
        self.heads().contains(&id)
    }

    /// Whether a step is reachable from Initial.
    ///
    /// Attached steps always are (the store enforces it); this answers
    /// `false` for unknown ids without a full walk being observable to the
    /// caller.
    pub fn is_reachable(&self, id: StepId) -> bool {
        if !self.store.contains(id) {
            return false;
        }
        let mut seen = std::collections::BTreeSet::new();
        let mut stack = vec![self.store.initial()];
        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.store.children_of(current));
            }
        }
        false
    }

    /// Chronological comparator: a missing timestamp sorts earliest,
    /// ties break by id.
    pub fn chronological(&self, a: StepId, b: StepId) -> Ordering {
        let ts = |id: StepId| self.store.step(id).and_then(|s| s.recorded_at());
        // Option<DateTime> orders None first, which is exactly the rule.
        ts(a).cmp(&ts(b)).then_with(|| a.cmp(&b))
    }

    /// Sort ids chronologically in place.
    pub fn sort_chronological(&self, ids: &mut [StepId]) {
        ids.sort_by(|a, b| self.chronological(*a, *b));
    }
}

impl StepStore {
    /// Borrow a stateless query view.
    pub fn navigator(&self) -> Navigator<'_> {
        Navigator::new(self)
    }
}
