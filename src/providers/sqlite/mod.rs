//! Local measurement store backed by SQLite.
//!
//! Holds the same entities as the SQUASH API (metrics, jobs, package
//! snapshots, measurements) and serves measurement pages with the
//! changed-package annotation computed at read time.

mod store;
mod validation;

pub use store::{SqliteStore, StoreCounts, DEFAULT_PAGE_SIZE};
