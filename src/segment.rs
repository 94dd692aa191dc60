//! Segment compression engine.
//!
//! A [`SegmentLayer`] is a derived, reversible display view of the graph:
//! contiguous single-in/single-out runs fold into one visible anchor that
//! stands in for an ordered list of hidden steps. The layer owns its own
//! adjacency so compression never touches the underlying store, and
//! rendering consumes it only through [`DisplayNode`] snapshots.
//!
//! Compression and expansion are deliberate no-ops when preconditions fail:
//! UI affordances poll `can_compress`/`can_expand` continuously, so probes
//! and disqualified operations stay total and cheap.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::RwLock;
use serde::Serialize;
use xxhash_rust::xxh64::Xxh64;

use crate::canonical::GraphFingerprint;
use crate::store::StepStore;
use crate::types::{Edge, StepId};

/// Synthetic label for the Initial step, which has no recorded title.
pub const INITIAL_STEP_LABEL: &str = "Start";

const DECORATION_CACHE_ENTRIES: usize = 1024;

/// Why a compress/expand call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The id is unknown to the layer or currently hidden.
    NotFound,
    /// The Initial step can never be compressed.
    InitialStep,
    /// The step already owns hidden steps; expand it first.
    OwnsHidden,
    /// Neither hideable nor a pipe, or the maximal run is empty.
    NotEligible,
    /// Expand target has no hidden steps.
    NothingHidden,
}

/// Result of a `compress` call.
///
/// One explicit type for all no-op paths; probes and disqualified calls
/// never raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressOutcome {
    /// A run was folded into `anchor`.
    Applied {
        /// Visible anchor now standing in for the run.
        anchor: StepId,
        /// Number of steps newly hidden.
        hidden: usize,
    },
    /// Nothing changed.
    Skipped(SkipReason),
}

impl CompressOutcome {
    /// Whether the call changed the layer.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Result of an `expand` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandOutcome {
    /// Hidden steps were restored behind `anchor`.
    Applied {
        /// The segment anchor that was expanded.
        anchor: StepId,
        /// Number of steps restored.
        restored: usize,
    },
    /// Nothing changed.
    Skipped(SkipReason),
}

impl ExpandOutcome {
    /// Whether the call changed the layer.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Snapshot of one display node for the rendering layer.
///
/// Identity, label, and classification only; layout and coordinates belong
/// to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayNode {
    /// Stable identity (the anchor step's id).
    pub id: StepId,
    /// Step title, or a synthetic label for Initial.
    pub label: String,
    /// Whether this is the Initial step.
    pub is_initial: bool,
    /// Whether this node is Active, considering hidden members.
    pub is_active: bool,
    /// Whether this node is a head (no visible successors), considering
    /// hidden members.
    pub is_head: bool,
    /// Number of hidden steps this node stands in for (0 for plain steps).
    pub hidden_count: usize,
}

/// LRU cache for computed decorations.
///
/// An explicit, capacity-bounded arena keyed by stable identity plus the
/// revisions that affect the result; any change produces a cache miss.
struct DecorationCache {
    inner: RwLock<LruCache<u64, DisplayNode>>,
}

impl DecorationCache {
    fn new(entries: usize) -> Self {
        let size = NonZeroUsize::new(entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(size)),
        }
    }

    fn get(&self, key: u64) -> Option<DisplayNode> {
        self.inner.write().get(&key).cloned()
    }

    fn put(&self, key: u64, node: DisplayNode) {
        self.inner.write().put(key, node);
    }
}

struct CompressPlan {
    first: StepId,
    last: StepId,
    run: Vec<StepId>,
}

/// Derived display layer mapping each step to its owning display node.
pub struct SegmentLayer {
    initial: StepId,
    /// Visible display adjacency; keys are exactly the visible nodes.
    children: BTreeMap<StepId, BTreeSet<StepId>>,
    parents: BTreeMap<StepId, BTreeSet<StepId>>,
    /// Anchor -> ordered hidden steps it stands in for.
    hidden: BTreeMap<StepId, Vec<StepId>>,
    /// Step -> owning display node (itself when visible).
    owner: BTreeMap<StepId, StepId>,
    /// Bumped on every applied compress/expand; keys the decoration cache.
    revision: u64,
    cache: DecorationCache,
}

impl std::fmt::Debug for SegmentLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentLayer")
            .field("initial", &self.initial)
            .field("visible", &self.children.len())
            .field("segments", &self.hidden.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl SegmentLayer {
    /// Build a display layer mirroring the store: every step visible, no
    /// segments.
    pub fn new(store: &StepStore) -> Self {
        let mut children: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
        let mut parents: BTreeMap<StepId, BTreeSet<StepId>> = BTreeMap::new();
        let mut owner = BTreeMap::new();
        for id in store.all_step_ids() {
            children.insert(id, store.children_of(id).into_iter().collect());
            parents.insert(id, store.parents_of(id).into_iter().collect());
            owner.insert(id, id);
        }
        Self {
            initial: store.initial(),
            children,
            parents,
            hidden: BTreeMap::new(),
            owner,
            revision: 0,
            cache: DecorationCache::new(DECORATION_CACHE_ENTRIES),
        }
    }

    // ── Probes ──────────────────────────────────────────────────────────

    /// Whether `id` currently has its own display node.
    pub fn is_visible(&self, id: StepId) -> bool {
        self.owner.get(&id) == Some(&id)
    }

    /// Whether `id` is a segment anchor with hidden steps.
    pub fn owns_hidden(&self, id: StepId) -> bool {
        self.hidden.get(&id).is_some_and(|v| !v.is_empty())
    }

    /// The display node standing in for `id` (itself when visible).
    pub fn owner_of(&self, id: StepId) -> Option<StepId> {
        self.owner.get(&id).copied()
    }

    /// Ordered hidden steps behind an anchor (empty for plain steps).
    pub fn hidden_steps(&self, anchor: StepId) -> &[StepId] {
        self.hidden.get(&anchor).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Whether a `compress(step)` call would change the layer.
    pub fn can_compress(&self, step: StepId) -> bool {
        self.plan_compress(step).is_ok()
    }

    /// Whether an `expand(anchor)` call would change the layer.
    pub fn can_expand(&self, anchor: StepId) -> bool {
        self.is_visible(anchor) && self.owns_hidden(anchor)
    }

    /// Layer revision; bumped on every applied compress/expand.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Visible display node ids, ordered.
    pub fn display_step_ids(&self) -> Vec<StepId> {
        self.children.keys().copied().collect()
    }

    /// Display edges in canonical order.
    pub fn display_edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (parent, kids) in &self.children {
            for child in kids {
                edges.push(Edge::new(*parent, *child));
            }
        }
        edges
    }

    /// Fingerprint of the display node and edge sets.
    pub fn fingerprint(&self) -> GraphFingerprint {
        GraphFingerprint::compute(&self.display_step_ids(), &self.display_edges())
    }

    // ── Compression ─────────────────────────────────────────────────────

    /// Fold the maximal single-in/single-out run around `step` into one
    /// segment.
    ///
    /// A single call extends maximally in both directions at once; repeated
    /// invocations are never needed. Disqualified calls are reported no-ops.
    pub fn compress(&mut self, step: StepId) -> CompressOutcome {
        let plan = match self.plan_compress(step) {
            Ok(plan) => plan,
            Err(reason) => {
                tracing::trace!(step = %step, ?reason, "compress skipped");
                return CompressOutcome::Skipped(reason);
            }
        };
        let CompressPlan { first, last, run } = plan;

        let successors: Vec<StepId> = self
            .children
            .get(&last)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();

        // Delete each run node's display node and incident display edges.
        for h in &run {
            let folks = self.parents.remove(h).unwrap_or_default();
            let kids = self.children.remove(h).unwrap_or_default();
            for p in folks {
                if let Some(set) = self.children.get_mut(&p) {
                    set.remove(h);
                }
            }
            for c in kids {
                if let Some(set) = self.parents.get_mut(&c) {
                    set.remove(h);
                }
            }
            self.owner.insert(*h, first);
        }
        self.hidden.entry(first).or_default().extend(run.iter().copied());

        // Re-link the anchor directly to every successor of the run's tail.
        for s in &successors {
            self.children.entry(first).or_default().insert(*s);
            self.parents.entry(*s).or_default().insert(first);
        }

        self.revision += 1;
        tracing::debug!(anchor = %first, hidden = run.len(), "compressed run into segment");
        CompressOutcome::Applied {
            anchor: first,
            hidden: run.len(),
        }
    }

    /// Restore a segment's hidden steps: the exact inverse of `compress`.
    pub fn expand(&mut self, anchor: StepId) -> ExpandOutcome {
        if !self.is_visible(anchor) {
            return ExpandOutcome::Skipped(SkipReason::NotFound);
        }
        let run = match self.hidden.remove(&anchor) {
            Some(run) if !run.is_empty() => run,
            _ => return ExpandOutcome::Skipped(SkipReason::NothingHidden),
        };

        // The anchor's current successors are the run tail's former ones.
        let successors: Vec<StepId> = self
            .children
            .get(&anchor)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        for s in &successors {
            if let Some(set) = self.parents.get_mut(s) {
                set.remove(&anchor);
            }
        }
        if let Some(set) = self.children.get_mut(&anchor) {
            set.clear();
        }

        // Reconnect the run as a chain behind the anchor.
        let mut prev = anchor;
        for h in &run {
            self.children.insert(*h, BTreeSet::new());
            self.parents.insert(*h, BTreeSet::new());
            self.children.entry(prev).or_default().insert(*h);
            self.parents.entry(*h).or_default().insert(prev);
            self.owner.insert(*h, *h);
            prev = *h;
        }
        for s in &successors {
            self.children.entry(prev).or_default().insert(*s);
            self.parents.entry(*s).or_default().insert(prev);
        }

        self.revision += 1;
        tracing::debug!(anchor = %anchor, restored = run.len(), "expanded segment");
        ExpandOutcome::Applied {
            anchor,
            restored: run.len(),
        }
    }

    // ── Decorations ─────────────────────────────────────────────────────

    /// Snapshot one display node for the rendering layer.
    ///
    /// `active` is the graph's current Active step; an anchor counts as
    /// active when the Active step is among its hidden members. Served from
    /// the decoration cache when nothing relevant changed.
    pub fn node(&self, store: &StepStore, active: StepId, id: StepId) -> Option<DisplayNode> {
        if !self.is_visible(id) {
            return None;
        }
        let key = self.cache_key(store, active, id);
        if let Some(hit) = self.cache.get(key) {
            return Some(hit);
        }

        let step = store.step(id)?;
        let is_initial = id == self.initial;
        let label = if is_initial {
            INITIAL_STEP_LABEL.to_string()
        } else {
            step.title().to_string()
        };
        let hidden_count = self.hidden.get(&id).map(|v| v.len()).unwrap_or(0);
        let is_active =
            id == active || self.hidden.get(&id).is_some_and(|v| v.contains(&active));
        let is_head = self.children.get(&id).is_some_and(|c| c.is_empty())
            && (!is_initial || self.children.len() == 1);

        let node = DisplayNode {
            id,
            label,
            is_initial,
            is_active,
            is_head,
            hidden_count,
        };
        self.cache.put(key, node.clone());
        Some(node)
    }

    /// Snapshot every display node, ordered by id.
    pub fn nodes(&self, store: &StepStore, active: StepId) -> Vec<DisplayNode> {
        self.display_step_ids()
            .into_iter()
            .filter_map(|id| self.node(store, active, id))
            .collect()
    }

    fn cache_key(&self, store: &StepStore, active: StepId, id: StepId) -> u64 {
        let mut hasher = Xxh64::new(0);
        hasher.write(id.as_uuid().as_bytes());
        hasher.write(active.as_uuid().as_bytes());
        hasher.write(&self.revision.to_le_bytes());
        hasher.write(&store.revision().to_le_bytes());
        hasher.finish()
    }

    // ── Internal topology queries (display adjacency, not the store) ────

    fn out_degree(&self, id: StepId) -> usize {
        self.children.get(&id).map(|s| s.len()).unwrap_or(0)
    }

    fn in_degree(&self, id: StepId) -> usize {
        self.parents.get(&id).map(|s| s.len()).unwrap_or(0)
    }

    fn pipe(&self, id: StepId) -> bool {
        id != self.initial && self.out_degree(id) == 1
    }

    fn hideable(&self, id: StepId) -> bool {
        id != self.initial && self.in_degree(id) == 1
    }

    fn unique_parent(&self, id: StepId) -> Option<StepId> {
        let set = self.parents.get(&id)?;
        if set.len() == 1 {
            set.iter().next().copied()
        } else {
            None
        }
    }

    fn unique_child(&self, id: StepId) -> Option<StepId> {
        let set = self.children.get(&id)?;
        if set.len() == 1 {
            set.iter().next().copied()
        } else {
            None
        }
    }

    /// Plan the maximal run around `step`, or say why there is none.
    fn plan_compress(&self, step: StepId) -> Result<CompressPlan, SkipReason> {
        if !self.is_visible(step) {
            return Err(SkipReason::NotFound);
        }
        if step == self.initial {
            return Err(SkipReason::InitialStep);
        }
        if self.owns_hidden(step) {
            return Err(SkipReason::OwnsHidden);
        }
        if !(self.hideable(step) || self.pipe(step)) {
            return Err(SkipReason::NotEligible);
        }

        // Walk backward while the current node could fold into its
        // predecessor. A node that owns hidden steps never folds into
        // another segment; since every compress is maximal, the walks in
        // practice stop short of an existing anchor rather than at one.
        let mut first = step;
        loop {
            if !self.hideable(first) || self.owns_hidden(first) {
                break;
            }
            let Some(prev) = self.unique_parent(first) else {
                break;
            };
            if !self.pipe(prev) {
                break;
            }
            first = prev;
        }

        // Walk forward while the successor could fold into the run.
        let mut last = step;
        loop {
            if !self.pipe(last) {
                break;
            }
            let Some(next) = self.unique_child(last) else {
                break;
            };
            if !self.hideable(next) || self.owns_hidden(next) {
                break;
            }
            last = next;
        }

        // The run is everything strictly after `first` through `last`.
        let mut run = Vec::new();
        let mut cursor = first;
        while cursor != last {
            let Some(next) = self.unique_child(cursor) else {
                return Err(SkipReason::NotEligible);
            };
            run.push(next);
            cursor = next;
        }
        if run.is_empty() {
            return Err(SkipReason::NotEligible);
        }
        Ok(CompressPlan { first, last, run })
    }
}
