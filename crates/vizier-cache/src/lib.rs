//! # Project Cache
//!
//! Maps project ids to live per-project state: datastore handle, filestore
//! handle, viztrail handle, and — for container-backed projects — a remote
//! worker endpoint. Two implementations share the same `ProjectCache`
//! contract:
//!
//! - [`common::CommonProjectCache`] — per-process, load-on-demand,
//!   single-flight per id.
//! - [`container::ContainerProjectCache`] — read-through over a persisted
//!   manifest file; never starts containers itself.
//!
//! Both surface a missing/corrupt project as *unavailable* rather than
//! omitting it, so operators can repair it instead of silently losing it
//! from `list_projects`.

pub mod cache;
pub mod common;
pub mod container;

pub use cache::{CacheError, ContainerEndpoint, ProjectCache, ProjectHandle};
pub use common::CommonProjectCache;
pub use container::{ContainerManifestEntry, ContainerProjectCache};
