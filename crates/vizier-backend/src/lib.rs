//! # Vizier backends
//!
//! Execution transport for a command: the abstraction the Execution
//! Controller schedules work against. Two reference shapes plus an
//! optional routing layer:
//!
//! - [`inprocess::InProcessBackend`] — runs commands on the controller's
//!   own task pool via a pluggable [`handler::CommandHandler`] registry.
//! - [`container::ContainerBackend`] — submits commands to a per-project
//!   remote worker over HTTP; progress arrives out-of-band through
//!   `vizier-api`'s task-state route.
//! - [`dispatcher::MultiQueueDispatcher`] — routes a command to a named
//!   queue by `(package_id, command_id)`, each queue its own `Backend`.

pub mod backend;
pub mod builtins;
pub mod container;
pub mod dispatcher;
pub mod handler;
pub mod inprocess;

pub use backend::{Backend, BackendError, ProjectContext, TaskReport, TaskState, TaskStateSink};
pub use container::ContainerBackend;
pub use dispatcher::MultiQueueDispatcher;
pub use handler::{CommandHandler, CommandOutcome, HandlerRegistry};
pub use inprocess::InProcessBackend;
