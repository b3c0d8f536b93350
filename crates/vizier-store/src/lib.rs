//! # Viztrail Store
//!
//! The persistent, append-only history of viztrails, branches, workflows
//! and modules. Owns these four entities exclusively: nothing outside this
//! crate mutates a workflow or module record directly.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       ViztrailStore                         │
//! │  viztrails → branches → workflows → modules                 │
//! └───────────────────────────────────────────────────────────┘
//!             ▲                                 ▲
//!             │                                 │
//!   InMemoryViztrailStore              FsViztrailStore
//!   (tests, single process)    (JSON object-store on disk)
//! ```

pub mod fs;
pub mod memory;
pub mod store;

pub use fs::FsViztrailStore;
pub use memory::InMemoryViztrailStore;
pub use store::{BranchSource, ModuleRef, ModuleUpdate, StoreError, ViztrailStore};
