//! Snapshot reconciliation for following/followers lists.
//!
//! This crate provides:
//! - Canonical user records with per-endpoint identity extraction
//! - Id-unique list snapshots and old/new snapshot pairs
//! - Added/removed diffs and reciprocation sets, recomputed wholesale
//! - Removal logs that persist until explicitly acknowledged

pub mod diff;
pub mod error;
pub mod reconciler;
pub mod record;
pub mod removal;
pub mod snapshot;
pub mod state;

// Re-export main types
pub use diff::{diff_snapshots, reconcile_mutual, MutualView, SnapshotDiff};
pub use error::ReconcileError;
pub use reconciler::{CycleSummary, RunSummary, ShrinkGuard, SnapshotReconciler};
pub use record::{IdShape, Relation, UserRecord};
pub use removal::RemovalLog;
pub use snapshot::{ListSnapshot, SnapshotPair};
pub use state::AccountState;
