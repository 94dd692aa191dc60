//! Error types for the workflow graph.
//!
//! Two policies apply (spec'd per operation on the mutation entry points):
//!
//! - Structural and state violations are programmer-contract errors; they
//!   fail fast and never recover silently.
//! - [`SyncError`] is expected and recoverable: the graph is left unchanged
//!   so the caller can retry or prompt the user.
//!
//! Read and probe paths (navigator queries, `can_compress`/`can_expand`)
//! never raise; unknown ids yield `None`/`false`.

use crate::types::StepId;

/// Errors raised by mutation entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Parent is not attached to the graph.
    #[error("unknown parent step: {0}")]
    UnknownParent(StepId),

    /// Step is already attached to the graph.
    #[error("step already attached: {0}")]
    AlreadyAttached(StepId),

    /// Step was minted by a different graph's factory.
    #[error("step {0} belongs to a different graph")]
    ForeignStep(StepId),

    /// Step is not attached to the graph.
    #[error("unknown step: {0}")]
    UnknownStep(StepId),

    /// The Initial step is permanent and cannot be deleted.
    #[error("initial step {0} is protected")]
    ProtectedStep(StepId),

    /// Deleting this step would disconnect other steps from Initial.
    #[error("step {0} still connects other steps to the initial step")]
    StepInUse(StepId),

    /// The step is currently the Active step and cannot be deleted.
    #[error("step {0} is the active step")]
    ActiveStep(StepId),

    /// `set_active` target is not an attached step.
    #[error("invalid active target: {0}")]
    InvalidActiveTarget(StepId),

    /// A listener re-entered a mutation method during notification.
    #[error("mutation re-entered during listener notification")]
    ReentrantMutation,

    /// `end_update` called without a matching `begin_update`.
    #[error("end_update without matching begin_update")]
    EndWithoutBegin,

    /// The supplied graph seed violates a structural invariant.
    #[error("invalid graph seed: {0}")]
    InvalidSeed(String),

    /// Workspace synchronization failed; the Active pointer is unchanged.
    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Errors from the external workspace synchronizer.
///
/// Always recoverable: a failed or interrupted synchronization aborts the
/// Active transition and leaves the graph untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The synchronizer reported a failure.
    #[error("workspace synchronization failed: {0}")]
    Failed(String),

    /// The synchronization was interrupted before completion.
    #[error("workspace synchronization interrupted")]
    Interrupted,
}
