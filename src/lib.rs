//! # worktrail
//!
//! A research workflow documented as a DAG of recorded actions ("steps"),
//! with an Active pointer mirroring the working area and a reversible
//! visual-compression transform for long single-parent/single-child runs.
//!
//! ## Core Contract
//!
//! 1. Topology mutates only through the step store: edges always connect an
//!    attached step to a brand-new one, so the graph is a DAG by construction
//! 2. The Active pointer moves only after the external workspace
//!    synchronizer succeeds; a failed or cancelled sync changes nothing
//! 3. Change events batch under nested transaction brackets and flush once,
//!    in a fixed order, when the outermost bracket closes
//! 4. `expand(compress(run))` restores the exact pre-compression display
//!    topology
//!
//! ## Architecture
//!
//! ```text
//! StepStore → Navigator → WorkflowGraph (active + broker) → SegmentLayer
//!                                 ↓
//!                          GraphListener / DisplayNode
//! ```
//!
//! Rendering, file-content persistence, metadata, and publication wizards
//! are external collaborators; this crate exposes only data and events.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod active;
pub mod broker;
pub mod canonical;
pub mod error;
pub mod model;
pub mod navigator;
pub mod segment;
pub mod store;
pub mod types;

// Re-exports
pub use active::{NoOpSynchronizer, WorkspaceSynchronizer};
pub use broker::{GraphEvent, GraphListener, TransactionBroker};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes, GraphFingerprint};
pub use error::{GraphError, SyncError};
pub use model::{GraphSeed, WorkflowGraph};
pub use navigator::Navigator;
pub use segment::{
    CompressOutcome, DisplayNode, ExpandOutcome, SegmentLayer, SkipReason, INITIAL_STEP_LABEL,
};
pub use store::StepStore;
pub use types::{Edge, GraphId, IdSchema, Person, PropertyBag, Resource, Step, StepId, ToolRef};

/// Schema version for all worktrail types.
/// Increment on breaking changes to any schema type.
pub const WORKTRAIL_SCHEMA_VERSION: &str = "1.0.0";
