//! Scenario tests for the workflow graph.
//!
//! These exercise the documented end-to-end behaviors: transaction event
//! ordering, active-step transitions through the synchronizer, and segment
//! compression around merge points.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use worktrail::{
    CompressOutcome, Edge, GraphError, GraphListener, IdSchema, NoOpSynchronizer, SkipReason,
    StepId, SyncError, WorkflowGraph, WorkspaceSynchronizer,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Recorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut self.log.lock().unwrap())
    }
}

impl GraphListener for Recorder {
    fn on_step_added(&mut self, step: StepId) {
        self.log.lock().unwrap().push(format!("added {step}"));
    }
    fn on_step_removed(&mut self, step: StepId) {
        self.log.lock().unwrap().push(format!("removed {step}"));
    }
    fn on_active_step_changed(&mut self, old: StepId, new: StepId) {
        self.log.lock().unwrap().push(format!("active {old} -> {new}"));
    }
    fn on_state_reset(&mut self) {
        self.log.lock().unwrap().push("reset".to_string());
    }
}

struct FailingSynchronizer;

#[async_trait]
impl WorkspaceSynchronizer for FailingSynchronizer {
    async fn sync(&self, _from: StepId, _to: StepId) -> Result<(), SyncError> {
        Err(SyncError::Failed("workspace is dirty".to_string()))
    }
}

/// Never resolves; models a stalled synchronization that the caller cancels.
struct StalledSynchronizer;

#[async_trait]
impl WorkspaceSynchronizer for StalledSynchronizer {
    async fn sync(&self, _from: StepId, _to: StepId) -> Result<(), SyncError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

fn block_on_set_active(graph: &mut WorkflowGraph, target: StepId) {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(graph.set_active(target, &NoOpSynchronizer))
        .unwrap();
}

fn graph_with_recorder() -> (WorkflowGraph, Recorder) {
    let mut graph = WorkflowGraph::new(IdSchema::sequential());
    let recorder = Recorder::default();
    graph.add_listener(Box::new(recorder.clone()));
    (graph, recorder)
}

/// Build `Initial -> A -> B -> C -> D` plus `Initial -> E -> D`, making D a
/// merge point while A, B, C stay single-in/single-out.
fn build_merge_graph() -> (WorkflowGraph, [StepId; 5]) {
    let mut graph = WorkflowGraph::new(IdSchema::sequential());
    let initial = graph.initial();

    let mut ids = Vec::new();
    let mut parent = initial;
    for title in ["A", "B", "C", "D"] {
        let step = graph.create_step();
        let id = step.id();
        graph.add_step(parent, step).unwrap();
        graph.set_title(id, title).unwrap();
        ids.push(id);
        parent = id;
    }
    let e_step = graph.create_step();
    let e = e_step.id();
    graph.add_step(initial, e_step).unwrap();

    // Second inbound edge to D comes from the persisted form; attach-only
    // mutation cannot create merges, so rebuild from a seed.
    let mut seed = graph.seed();
    seed.edges.push(Edge::new(e, ids[3]));
    let graph = WorkflowGraph::from_seed(seed, IdSchema::Sequential { next: 1000 }).unwrap();

    (graph, [ids[0], ids[1], ids[2], ids[3], e])
}

// ─────────────────────────────────────────────────────────────────────────────
// STRUCTURAL INVARIANTS
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_initial_has_no_inbound_edges_and_is_protected() {
    let (graph, ids) = build_merge_graph();
    let initial = graph.initial();

    assert_eq!(graph.store().in_degree(initial), 0);
    for id in ids {
        assert!(graph.store().in_degree(id) >= 1);
    }

    // Initial reports protected whether or not it is Active.
    let mut graph = graph;
    assert_eq!(graph.active(), initial);
    assert_eq!(
        graph.delete_step(initial).unwrap_err(),
        GraphError::ProtectedStep(initial)
    );
    let step = graph.create_step();
    let id = step.id();
    graph.add_step(initial, step).unwrap();
    block_on_set_active(&mut graph, id);
    assert_eq!(
        graph.delete_step(initial).unwrap_err(),
        GraphError::ProtectedStep(initial)
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// TRANSACTION ORDERING
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_adds_flush_in_call_order_before_active_change() {
    let (mut graph, recorder) = graph_with_recorder();
    let initial = graph.initial();

    let mut ids = Vec::new();
    graph.begin_update();
    let mut parent = initial;
    for _ in 0..4 {
        let step = graph.create_step();
        let id = step.id();
        graph.add_step(parent, step).unwrap();
        ids.push(id);
        parent = id;
    }
    graph.set_active(parent, &NoOpSynchronizer).await.unwrap();
    assert!(recorder.take().is_empty());
    graph.end_update().unwrap();

    let log = recorder.take();
    assert_eq!(log.len(), 5);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(log[i], format!("added {id}"));
    }
    assert_eq!(log[4], format!("active {initial} -> {parent}"));
}

#[test]
fn test_nested_brackets_notify_exactly_once() {
    let (mut graph, recorder) = graph_with_recorder();
    let s1 = graph.create_step();
    let id1 = s1.id();
    let s2 = graph.create_step();
    let id2 = s2.id();

    graph.begin_update();
    graph.add_step(graph.initial(), s1).unwrap();
    graph.begin_update();
    graph.add_step(id1, s2).unwrap();
    graph.end_update().unwrap();
    graph.end_update().unwrap();

    assert_eq!(
        recorder.take(),
        vec![format!("added {id1}"), format!("added {id2}")]
    );
}

#[test]
fn test_no_rollback_after_failed_mutation_mid_bracket() {
    let (mut graph, recorder) = graph_with_recorder();
    let s1 = graph.create_step();
    let id1 = s1.id();
    let ghost = StepId::new(uuid::Uuid::from_u128(9999));

    graph.begin_update();
    graph.add_step(graph.initial(), s1).unwrap();
    let s2 = graph.create_step();
    assert!(graph.add_step(ghost, s2).is_err());
    graph.end_update().unwrap();

    // The first mutation survives and is announced.
    assert!(graph.store().contains(id1));
    assert_eq!(recorder.take(), vec![format!("added {id1}")]);
}

// ─────────────────────────────────────────────────────────────────────────────
// ACTIVE TRANSITIONS
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failed_sync_reports_and_leaves_active_unchanged() {
    let (mut graph, recorder) = graph_with_recorder();
    let step = graph.create_step();
    let id = step.id();
    graph.add_step(graph.initial(), step).unwrap();
    recorder.take();

    let before = graph.active();
    let err = graph.set_active(id, &FailingSynchronizer).await.unwrap_err();
    assert!(matches!(err, GraphError::Sync(SyncError::Failed(_))));
    assert_eq!(graph.active(), before);
    assert!(recorder.take().is_empty());
}

#[tokio::test]
async fn test_cancelled_sync_aborts_transition_cleanly() {
    let (mut graph, recorder) = graph_with_recorder();
    let step = graph.create_step();
    let id = step.id();
    graph.add_step(graph.initial(), step).unwrap();
    recorder.take();

    let before = graph.active();
    let result = tokio::time::timeout(
        Duration::from_millis(20),
        graph.set_active(id, &StalledSynchronizer),
    )
    .await;
    assert!(result.is_err(), "sync should still be pending at timeout");
    assert_eq!(graph.active(), before);
    assert!(recorder.take().is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// SEGMENT COMPRESSION
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_compress_before_merge_point_anchors_at_run_head() {
    let (graph, [a, b, c, d, _e]) = build_merge_graph();
    let mut layer = graph.segment_layer();

    assert!(layer.can_compress(b));
    let outcome = layer.compress(b);
    assert_eq!(outcome, CompressOutcome::Applied { anchor: a, hidden: 2 });
    assert_eq!(layer.hidden_steps(a), &[b, c]);
    assert!(layer.display_edges().contains(&Edge::new(a, d)));
    // D has two inbound edges, so it stays a separate visible node.
    assert!(layer.is_visible(d));

    let node = layer.node(graph.store(), graph.active(), a).unwrap();
    assert_eq!(node.hidden_count, 2);
    assert_eq!(node.label, "A");
}

#[test]
fn test_round_trip_restores_exact_topology() {
    let (graph, [_a, b, _c, _d, _e]) = build_merge_graph();
    let mut layer = graph.segment_layer();
    let before = layer.fingerprint();

    let CompressOutcome::Applied { anchor, .. } = layer.compress(b) else {
        panic!("compress should apply");
    };
    assert!(layer.expand(anchor).is_applied());
    assert_eq!(layer.fingerprint(), before);
}

#[test]
fn test_disqualified_operations_are_reported_noops() {
    let (graph, [_a, _b, _c, d, e]) = build_merge_graph();
    let mut layer = graph.segment_layer();
    let before = layer.fingerprint();

    // D is a merge point reachable only through ineligible neighbors.
    assert!(!layer.can_compress(graph.initial()));
    assert_eq!(
        layer.compress(graph.initial()),
        CompressOutcome::Skipped(SkipReason::InitialStep)
    );
    // E's forward walk hits the merge and its backward walk hits Initial.
    assert_eq!(
        layer.compress(e),
        CompressOutcome::Skipped(SkipReason::NotEligible)
    );
    assert!(!layer.can_expand(d));

    assert_eq!(layer.fingerprint(), before);
    assert_eq!(layer.revision(), 0);
}

#[test]
fn test_active_decoration_follows_hidden_membership() {
    let (mut graph, [a, b, _c, _d, _e]) = build_merge_graph();
    block_on_set_active(&mut graph, b);

    let mut layer = graph.segment_layer();
    assert!(layer.compress(b).is_applied());

    let anchor = layer.node(graph.store(), graph.active(), a).unwrap();
    assert!(anchor.is_active, "anchor represents the hidden active step");
}
