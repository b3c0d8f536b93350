//! The Vizier error taxonomy.
//!
//! Kinds, not type names: every fallible operation in the workspace
//! ultimately reports one of these. Each layer (`vizier-store`,
//! `vizier-cache`, `vizier-backend`) has its own narrower `thiserror` enum
//! and converts `Into<VizierError>` at its boundary, so callers only ever
//! have to match on this one taxonomy.

use crate::id::Identifier;

#[derive(Debug, thiserror::Error)]
pub enum VizierError {
    /// Malformed command or arguments; rejected before persistence.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown project/branch/workflow/module/dataset id.
    #[error("not found: {kind} {id}")]
    NotFound { kind: &'static str, id: Identifier },

    /// Duplicate name, attempt to mutate a committed workflow, or an edit
    /// against a nonexistent head.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Worker unreachable or container missing. Surfaced to and retried
    /// by the caller; the controller never retries on its own.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A module ran and failed. This is not an API error: it is recorded
    /// as the module's terminal `ERROR` state and does not fail the edit
    /// operation that produced it. Exists in this taxonomy only so a
    /// backend can report it uniformly; `vizier-api` must never turn one
    /// of these into an HTTP error response.
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// An on-disk record failed its schema check on load. The affected
    /// entity is marked unavailable rather than failing the whole store.
    #[error("corrupted record: {0}")]
    Corruption(String),

    /// Escape hatch for I/O and other infrastructure failures that don't
    /// fit a more specific kind.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VizierError {
    pub fn not_found(kind: &'static str, id: impl Into<Identifier>) -> Self {
        VizierError::NotFound { kind, id: id.into() }
    }
}
