//! Workflow graph facade.
//!
//! [`WorkflowGraph`] owns the step store, the transaction broker, and the
//! Active pointer, and is the single mutation entry point. All mutations run
//! serialized on one logical model thread; `&mut self` receivers make that
//! the natural mode of use.

use serde::{Deserialize, Serialize};

use crate::active::WorkspaceSynchronizer;
use crate::broker::{GraphEvent, GraphListener, TransactionBroker};
use crate::canonical::GraphFingerprint;
use crate::error::GraphError;
use crate::navigator::Navigator;
use crate::segment::SegmentLayer;
use crate::store::StepStore;
use crate::types::{Edge, GraphId, IdSchema, Person, Resource, Step, StepId, ToolRef};
use chrono::{DateTime, Utc};

/// Snapshot of a whole graph as exchanged with the persistence backend.
///
/// The core imposes no file or wire format; the backend serializes this
/// however it likes and replays it idempotently at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSeed {
    /// Graph identifier.
    pub graph_id: GraphId,
    /// The permanent Initial step.
    pub initial: StepId,
    /// The Active step at save time.
    pub active: StepId,
    /// All steps.
    pub steps: Vec<Step>,
    /// All edges.
    pub edges: Vec<Edge>,
}

/// A workflow graph: step store, transaction broker, and Active pointer.
#[derive(Debug)]
pub struct WorkflowGraph {
    store: StepStore,
    broker: TransactionBroker,
    schema: IdSchema,
    active: StepId,
}

impl WorkflowGraph {
    /// Create a graph holding only the Initial step, which starts Active.
    pub fn new(mut schema: IdSchema) -> Self {
        let store = StepStore::new(&mut schema);
        let active = store.initial();
        Self {
            store,
            broker: TransactionBroker::new(),
            schema,
            active,
        }
    }

    /// Rebuild a graph from a persisted seed, validating all invariants.
    pub fn from_seed(seed: GraphSeed, schema: IdSchema) -> Result<Self, GraphError> {
        let store = StepStore::from_parts(seed.graph_id, seed.initial, seed.steps, seed.edges)?;
        if !store.contains(seed.active) {
            return Err(GraphError::InvalidSeed(format!(
                "active step {} is not attached",
                seed.active
            )));
        }
        Ok(Self {
            store,
            broker: TransactionBroker::new(),
            schema,
            active: seed.active,
        })
    }

    /// Replace the graph's contents from a seed, keeping listeners.
    ///
    /// Fires `on_state_reset` once; any events pending in an open bracket
    /// are discarded.
    pub fn reset(&mut self, seed: GraphSeed) -> Result<(), GraphError> {
        self.guard()?;
        let store = StepStore::from_parts(seed.graph_id, seed.initial, seed.steps, seed.edges)?;
        if !store.contains(seed.active) {
            return Err(GraphError::InvalidSeed(format!(
                "active step {} is not attached",
                seed.active
            )));
        }
        self.store = store;
        self.active = seed.active;
        self.broker.notify_reset();
        tracing::debug!(graph = %self.store.graph_id(), "graph state reset");
        Ok(())
    }

    /// Export the current state for the persistence backend.
    pub fn seed(&self) -> GraphSeed {
        GraphSeed {
            graph_id: self.store.graph_id(),
            initial: self.store.initial(),
            active: self.active,
            steps: self
                .store
                .all_step_ids()
                .into_iter()
                .filter_map(|id| self.store.step(id).cloned())
                .collect(),
            edges: self.store.all_edges(),
        }
    }

    // ── Read access ─────────────────────────────────────────────────────

    /// The underlying step store.
    pub fn store(&self) -> &StepStore {
        &self.store
    }

    /// Stateless query view over the store.
    pub fn navigator(&self) -> Navigator<'_> {
        self.store.navigator()
    }

    /// Build a fresh display layer mirroring the current topology.
    pub fn segment_layer(&self) -> SegmentLayer {
        SegmentLayer::new(&self.store)
    }

    /// The Active step.
    pub fn active(&self) -> StepId {
        self.active
    }

    /// The permanent Initial step.
    pub fn initial(&self) -> StepId {
        self.store.initial()
    }

    /// Fingerprint of the current step and edge sets.
    pub fn fingerprint(&self) -> GraphFingerprint {
        self.store.fingerprint()
    }

    // ── Transactions and listeners ──────────────────────────────────────

    /// Register a change listener.
    pub fn add_listener(&mut self, listener: Box<dyn GraphListener + Send>) {
        self.broker.add_listener(listener);
    }

    /// Open a (possibly nested) transaction bracket.
    pub fn begin_update(&mut self) {
        self.broker.begin_update();
    }

    /// Close a bracket; events flush when the outermost closes.
    pub fn end_update(&mut self) -> Result<(), GraphError> {
        self.broker.end_update()
    }

    /// Whether a transaction bracket is open.
    pub fn is_updating(&self) -> bool {
        self.broker.is_updating()
    }

    // ── Structural mutations ────────────────────────────────────────────

    /// Mint a fresh, detached step via the graph's factory.
    pub fn create_step(&mut self) -> Step {
        self.store.create_step(&mut self.schema)
    }

    /// Attach a detached step as a new child of `parent`.
    pub fn add_step(&mut self, parent: StepId, step: Step) -> Result<(), GraphError> {
        self.guard()?;
        let id = step.id();
        self.store.attach(parent, step)?;
        self.broker.queue(GraphEvent::StepAdded(id));
        Ok(())
    }

    /// Attach a step under the Active step, then advance Active to it.
    ///
    /// The attach commits immediately; the Active transition goes through
    /// the synchronizer and aborts cleanly on failure or cancellation,
    /// leaving the step attached and Active unchanged (no rollback).
    pub async fn add_step_to_active(
        &mut self,
        step: Step,
        sync: &dyn WorkspaceSynchronizer,
    ) -> Result<(), GraphError> {
        self.guard()?;
        let id = step.id();
        self.store.attach(self.active, step)?;
        self.broker.queue(GraphEvent::StepAdded(id));
        self.set_active(id, sync).await
    }

    /// Remove a step and its incident edges.
    ///
    /// Initial always reports `ProtectedStep`, even while Active.
    pub fn delete_step(&mut self, id: StepId) -> Result<(), GraphError> {
        self.guard()?;
        if id == self.active && id != self.store.initial() {
            return Err(GraphError::ActiveStep(id));
        }
        self.store.delete(id)?;
        self.broker.queue(GraphEvent::StepRemoved(id));
        Ok(())
    }

    /// Move the Active pointer to `target`, synchronizing the working area.
    ///
    /// The swap commits only if the synchronizer reports success; on failure
    /// or cancellation mid-sync the transition aborts and Active is left
    /// unchanged. Setting the current Active step again is a no-op.
    pub async fn set_active(
        &mut self,
        target: StepId,
        sync: &dyn WorkspaceSynchronizer,
    ) -> Result<(), GraphError> {
        self.guard()?;
        if !self.store.contains(target) {
            return Err(GraphError::InvalidActiveTarget(target));
        }
        if target == self.active {
            return Ok(());
        }
        let old = self.active;
        if let Err(e) = sync.sync(old, target).await {
            tracing::debug!(%old, %target, error = %e, "active transition aborted");
            return Err(GraphError::Sync(e));
        }
        self.active = target;
        self.broker.queue(GraphEvent::ActiveStepChanged { old, new: target });
        tracing::debug!(%old, new = %target, "active step changed");
        Ok(())
    }

    // ── Field mutations ─────────────────────────────────────────────────

    /// Set a step's title.
    pub fn set_title(&mut self, id: StepId, title: impl Into<String>) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.set_title(title))
    }

    /// Set a step's description.
    pub fn set_description(
        &mut self,
        id: StepId,
        description: impl Into<String>,
    ) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.set_description(description))
    }

    /// Set or clear a step's recording timestamp.
    pub fn set_recorded_at(
        &mut self,
        id: StepId,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.set_recorded_at(at))
    }

    /// Append an input resource.
    pub fn add_input(&mut self, id: StepId, resource: Resource) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.add_input(resource))
    }

    /// Append an output resource.
    pub fn add_output(&mut self, id: StepId, resource: Resource) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.add_output(resource))
    }

    /// Append a participating person.
    pub fn add_person(&mut self, id: StepId, person: Person) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.add_person(person))
    }

    /// Set or clear the tool reference.
    pub fn set_tool(&mut self, id: StepId, tool: Option<ToolRef>) -> Result<(), GraphError> {
        self.mutate_step(id, |step| step.set_tool(tool))
    }

    /// Set a property; queues `PropertyChanged` only if the value changed.
    pub fn set_property(
        &mut self,
        id: StepId,
        key: &str,
        value: &str,
    ) -> Result<(), GraphError> {
        self.guard()?;
        let step = self
            .store
            .step_mut(id)
            .ok_or(GraphError::UnknownStep(id))?;
        if step.properties_mut().set(key, value) {
            self.store.bump_revision();
            self.broker.queue(GraphEvent::PropertyChanged {
                step: id,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    /// Remove a property if present.
    pub fn remove_property(&mut self, id: StepId, key: &str) -> Result<(), GraphError> {
        self.guard()?;
        let step = self
            .store
            .step_mut(id)
            .ok_or(GraphError::UnknownStep(id))?;
        if step.properties_mut().remove(key).is_some() {
            self.store.bump_revision();
            self.broker.queue(GraphEvent::PropertyChanged {
                step: id,
                key: key.to_string(),
            });
        }
        Ok(())
    }

    fn mutate_step(
        &mut self,
        id: StepId,
        f: impl FnOnce(&mut Step),
    ) -> Result<(), GraphError> {
        self.guard()?;
        let step = self
            .store
            .step_mut(id)
            .ok_or(GraphError::UnknownStep(id))?;
        f(step);
        self.store.bump_revision();
        self.broker.queue(GraphEvent::StepChanged(id));
        Ok(())
    }

    fn guard(&self) -> Result<(), GraphError> {
        if self.broker.is_notifying() {
            return Err(GraphError::ReentrantMutation);
        }
        Ok(())
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new(IdSchema::random())
    }
}
