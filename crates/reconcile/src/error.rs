//! Error types for snapshot reconciliation.

use thiserror::Error;

use crate::record::Relation;

/// Errors raised when snapshot input violates the reconciler's contract.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A snapshot contained the same account id twice.
    #[error("duplicate id {id} in {relation} snapshot")]
    DuplicateId { relation: Relation, id: String },

    /// A stored list contained the same account id twice.
    #[error("duplicate id {0} in stored list")]
    DuplicateRecord(String),

    /// A user object could not be turned into a record.
    #[error("invalid user record: {0}")]
    InvalidRecord(String),

    /// The new snapshot shrank enough to look like a truncated fetch.
    #[error(
        "refusing {relation} snapshot of {new_len} records against {old_len} previous records"
    )]
    SuspiciousShrink {
        relation: Relation,
        old_len: usize,
        new_len: usize,
    },

    /// No record with the given id exists where one was expected.
    #[error("no {relation} record with id {id}")]
    NotFound { relation: Relation, id: String },

    /// Unknown relation name.
    #[error("unknown relation: {0} (expected \"following\" or \"followers\")")]
    Relation(String),
}
