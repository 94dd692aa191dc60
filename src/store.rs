//! Step store: owns steps and their parent/child adjacency.
//!
//! The store is the only component that mutates graph topology. The graph is
//! a DAG by construction: edges are only ever added from an already-attached
//! step to a brand-new one, so cycles cannot arise.
//!
//! Uses BTreeMap/BTreeSet for deterministic iteration order.

use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::GraphFingerprint;
use crate::error::GraphError;
use crate::types::{Edge, GraphId, IdSchema, Step, StepId};

/// Owner of steps and topology for one workflow graph.
#[derive(Debug, Clone)]
pub struct StepStore {
    graph_id: GraphId,
    initial: StepId,
    steps: BTreeMap<StepId, Step>,
    children: BTreeMap<StepId, BTreeSet<StepId>>,
    parents: BTreeMap<StepId, BTreeSet<StepId>>,
    revision: u64,
}

impl StepStore {
    /// Create a store holding only the permanent Initial step.
    pub fn new(schema: &mut IdSchema) -> Self {
        let graph_id = schema.mint_graph();
        let initial_id = schema.mint_step();
        let initial = Step::new(initial_id, graph_id);

        let mut steps = BTreeMap::new();
        steps.insert(initial_id, initial);

        let mut children = BTreeMap::new();
        children.insert(initial_id, BTreeSet::new());
        let mut parents = BTreeMap::new();
        parents.insert(initial_id, BTreeSet::new());

        Self {
            graph_id,
            initial: initial_id,
            steps,
            children,
            parents,
            revision: 0,
        }
    }

    /// Rebuild a store from persisted parts, validating all invariants.
    ///
    /// Fails `InvalidSeed` if the initial step is missing or has inbound
    /// edges, if any edge references an unknown step, if a non-initial step
    /// has no inbound edge, if any step is unreachable from Initial, or if
    /// the edge set contains a cycle.
    pub fn from_parts(
        graph_id: GraphId,
        initial: StepId,
        steps: Vec<Step>,
        edges: Vec<Edge>,
    ) -> Result<Self, GraphError> {
        let mut step_map = BTreeMap::new();
        for step in steps {
            if step.graph() != graph_id {
                return Err(GraphError::InvalidSeed(format!(
                    "step {} belongs to graph {}",
                    step.id(),
                    step.graph()
                )));
            }
            if step_map.insert(step.id(), step).is_some() {
                return Err(GraphError::InvalidSeed("duplicate step id".to_string()));
            }
        }
        if !step_map.contains_key(&initial) {
            return Err(GraphError::InvalidSeed(
                "initial step not in step set".to_string(),
            ));
        }

        let mut children: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
        let mut parents: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
        for id in step_map.keys() {
            children.insert(*id, BTreeSet::new());
            parents.insert(*id, BTreeSet::new());
        }
        for edge in &edges {
            if !step_map.contains_key(&edge.parent) || !step_map.contains_key(&edge.child) {
                return Err(GraphError::InvalidSeed(format!(
                    "edge {} -> {} references an unknown step",
                    edge.parent, edge.child
                )));
            }
            if let Some(set) = children.get_mut(&edge.parent) {
                set.insert(edge.child);
            }
            if let Some(set) = parents.get_mut(&edge.child) {
                set.insert(edge.parent);
            }
        }

        if parents.get(&initial).is_some_and(|p| !p.is_empty()) {
            return Err(GraphError::InvalidSeed(
                "initial step has inbound edges".to_string(),
            ));
        }
        for (id, inbound) in &parents {
            if *id != initial && inbound.is_empty() {
                return Err(GraphError::InvalidSeed(format!(
                    "step {id} has no inbound edge"
                )));
            }
        }

        // Acyclicity via Kahn's algorithm: peel steps whose remaining inbound
        // count reaches zero, starting from Initial. Leftover steps sit on a
        // cycle or behind one; combined with the inbound check above this
        // also proves every step reachable from Initial.
        let mut remaining: BTreeMap<StepId, usize> =
            parents.iter().map(|(id, p)| (*id, p.len())).collect();
        let mut queue = vec![initial];
        let mut peeled = 0usize;
        while let Some(id) = queue.pop() {
            peeled += 1;
            if let Some(kids) = children.get(&id) {
                for child in kids {
                    if let Some(count) = remaining.get_mut(child) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push(*child);
                        }
                    }
                }
            }
        }
        if peeled != step_map.len() {
            return Err(GraphError::InvalidSeed(
                "edge set contains a cycle or unreachable steps".to_string(),
            ));
        }

        Ok(Self {
            graph_id,
            initial,
            steps: step_map,
            children,
            parents,
            revision: 0,
        })
    }

    /// Mint a fresh, detached step via the graph's factory.
    pub fn create_step(&self, schema: &mut IdSchema) -> Step {
        Step::new(schema.mint_step(), self.graph_id)
    }

    /// Attach a detached step as a new child of `parent`.
    pub fn attach(&mut self, parent: StepId, step: Step) -> Result<(), GraphError> {
        if step.graph() != self.graph_id {
            return Err(GraphError::ForeignStep(step.id()));
        }
        if !self.steps.contains_key(&parent) {
            return Err(GraphError::UnknownParent(parent));
        }
        let id = step.id();
        if self.steps.contains_key(&id) {
            return Err(GraphError::AlreadyAttached(id));
        }

        self.steps.insert(id, step);
        self.children.insert(id, BTreeSet::new());
        self.parents.insert(id, BTreeSet::new());
        self.link(parent, id);
        self.revision += 1;
        tracing::debug!(%parent, step = %id, "attached step");
        Ok(())
    }

    /// Remove a step and its incident edges.
    ///
    /// Fails `ProtectedStep` for Initial and `StepInUse` if removal would
    /// disconnect any other step from Initial. Because edges only ever
    /// attach new steps, that reduces to: every child of the step must have
    /// a second parent.
    pub fn delete(&mut self, id: StepId) -> Result<(), GraphError> {
        if id == self.initial {
            return Err(GraphError::ProtectedStep(id));
        }
        if !self.steps.contains_key(&id) {
            return Err(GraphError::UnknownStep(id));
        }
        if let Some(kids) = self.children.get(&id) {
            for child in kids {
                if self.parents.get(child).is_some_and(|p| p.len() < 2) {
                    return Err(GraphError::StepInUse(id));
                }
            }
        }

        let kids = self.children.remove(&id).unwrap_or_default();
        let folks = self.parents.remove(&id).unwrap_or_default();
        for child in kids {
            if let Some(p) = self.parents.get_mut(&child) {
                p.remove(&id);
            }
        }
        for parent in folks {
            if let Some(c) = self.children.get_mut(&parent) {
                c.remove(&id);
            }
        }
        self.steps.remove(&id);
        self.revision += 1;
        tracing::debug!(step = %id, "deleted step");
        Ok(())
    }

    fn link(&mut self, parent: StepId, child: StepId) {
        self.children.entry(parent).or_default().insert(child);
        self.parents.entry(child).or_default().insert(parent);
    }

    /// Graph identifier.
    pub fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    /// The permanent Initial step.
    pub fn initial(&self) -> StepId {
        self.initial
    }

    /// Revision counter, incremented on every mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Bump the revision; used by the model for field mutations.
    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    /// Whether a step is attached.
    pub fn contains(&self, id: StepId) -> bool {
        self.steps.contains_key(&id)
    }

    /// Look up an attached step.
    pub fn step(&self, id: StepId) -> Option<&Step> {
        self.steps.get(&id)
    }

    pub(crate) fn step_mut(&mut self, id: StepId) -> Option<&mut Step> {
        self.steps.get_mut(&id)
    }

    /// Parent ids of a step, ordered by id.
    pub fn parents_of(&self, id: StepId) -> Vec<StepId> {
        self.parents
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Child ids of a step, ordered by id.
    pub fn children_of(&self, id: StepId) -> Vec<StepId> {
        self.children
            .get(&id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Inbound edge count.
    pub fn in_degree(&self, id: StepId) -> usize {
        self.parents.get(&id).map(|s| s.len()).unwrap_or(0)
    }

    /// Outbound edge count.
    pub fn out_degree(&self, id: StepId) -> usize {
        self.children.get(&id).map(|s| s.len()).unwrap_or(0)
    }

    /// All attached step ids, ordered.
    pub fn all_step_ids(&self) -> Vec<StepId> {
        self.steps.keys().copied().collect()
    }

    /// All edges in canonical order.
    pub fn all_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (parent, kids) in &self.children {
            for child in kids {
                edges.push(Edge::new(*parent, *child));
            }
        }
        edges
    }

    /// Number of attached steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.children.values().map(|s| s.len()).sum()
    }

    /// Fingerprint of the current step and edge sets.
    pub fn fingerprint(&self) -> GraphFingerprint {
        GraphFingerprint::compute(&self.all_step_ids(), &self.all_edges())
    }
}
