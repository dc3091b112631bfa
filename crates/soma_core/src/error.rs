//! Error taxonomy for the organism's core paths.
//!
//! Only construction-time collaborator failures are allowed to abort a
//! subsystem (and even then a fallback variant may absorb them). Everything
//! else is caught at the tick or turn boundary, logged, and degraded.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SomaError {
    /// A collaborator (generator / embedder / store) could not be
    /// constructed. Fatal to that subsystem unless a fallback exists.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// A completion or stream failed mid-flight. Non-fatal; callers fall
    /// back to degraded text or an aborted stream.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A consolidation step failed. Non-fatal; the item is dropped.
    #[error("consolidation failed: {0}")]
    Consolidation(String),

    /// A retrieval failed. Non-fatal; callers proceed with empty context.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// Durability is degraded but in-memory state continues.
    #[error("persistence failed: {0}")]
    Persistence(String),
}
