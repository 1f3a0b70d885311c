//! Scheduled harvesting of following/followers lists.
//!
//! Glues [`harvest::PaginatedFetcher`] to [`reconcile::SnapshotReconciler`]:
//! credentials come from JSON files or the environment, per-account state
//! lives in a directory of JSON files, and [`WatchCycle`] runs one
//! fetch-and-reconcile pass per account.

pub mod credentials;
pub mod cycle;
pub mod error;
pub mod store;

// Re-export main types
pub use credentials::{credentials_from_env, load_all, load_credentials, FileCredentialRefresher};
pub use cycle::{CycleOutcome, RunResult, WatchCycle};
pub use error::WatchError;
pub use store::StateStore;
