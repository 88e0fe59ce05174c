//! Issue metadata store for the Watchtower pipeline.
//!
//! Issues aggregate every occurrence sharing a fingerprint within a
//! project. The store is SQLite-backed; the uniqueness constraint on
//! (project_id, fingerprint) is the only cross-worker locking discipline.

pub mod cardinality;
pub mod issue;
pub mod schema;
pub mod store;

pub use cardinality::UserSketch;
pub use issue::{Issue, IssueStatus};
pub use store::IssueStore;
