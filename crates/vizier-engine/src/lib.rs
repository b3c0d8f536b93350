//! # Vizier Execution Controller
//!
//! The engine that turns an edit (append/insert/delete/replace a module)
//! into a new immutable [`vizier_core::Workflow`] and schedules whatever
//! that edit invalidates.
//!
//! ## Architecture
//!
//! One [`branch_actor::BranchActor`] per branch owns that branch's entire
//! live state and drains a queue of `{Edit, TaskUpdate, CancelExec}`
//! events — this is the branch's exclusive lock, implemented as
//! single-writer-via-channel rather than a mutex (spec.md §9). A module
//! is scheduled by asking a [`vizier_backend::Backend`] to run it and
//! giving it a [`vizier_backend::TaskStateSink`] that feeds progress back
//! into the owning actor's queue; [`controller::ExecutionController`] is
//! the stateless front door that lazily spawns actors and routes task ids
//! back to the actor that submitted them.
//!
//! ```text
//! ExecutionController ──edit──▶ BranchActor ──execute──▶ Backend
//!          ▲                         │                      │
//!          └──────── update_task_state ◀──── TaskStateSink ◀┘
//! ```

pub mod branch_actor;
pub mod controller;
pub mod error;
pub mod invalidation;
pub mod validation;

pub use controller::ExecutionController;
pub use error::EngineError;
pub use invalidation::{ConservativePolicy, EditPlan, ReusePolicy};
