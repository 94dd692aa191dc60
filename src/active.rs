//! Workspace synchronizer seam for Active-step transitions.
//!
//! Moving the Active pointer mirrors the working area onto another step,
//! which is the one operation expected to block for non-trivial wall-clock
//! time. The model awaits the collaborator and commits the pointer swap only
//! on success; dropping the returned future mid-await cancels the transition
//! with the pointer untouched.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::StepId;

/// External collaborator that brings the working area from one step's state
/// to another's.
///
/// Implementations may block and must be interruptible; the core imposes no
/// timeout of its own.
#[async_trait]
pub trait WorkspaceSynchronizer: Send + Sync {
    /// Synchronize the working area from `from` to `to`.
    async fn sync(&self, from: StepId, to: StepId) -> Result<(), SyncError>;
}

/// Synchronizer that always succeeds without touching anything.
///
/// Useful for embedders without a working area and for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSynchronizer;

#[async_trait]
impl WorkspaceSynchronizer for NoOpSynchronizer {
    async fn sync(&self, _from: StepId, _to: StepId) -> Result<(), SyncError> {
        Ok(())
    }
}
