//! List snapshots.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::record::{Relation, UserRecord};

/// An ordered, id-unique capture of one relation list.
///
/// Serialized as a plain list; loading a list with a repeated id fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<UserRecord>", into = "Vec<UserRecord>")]
pub struct ListSnapshot {
    records: Vec<UserRecord>,
}

/// First id that occurs more than once.
pub(crate) fn first_duplicate(records: &[UserRecord]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .map(|r| r.id.as_str())
        .find(|id| !seen.insert(*id))
}

impl ListSnapshot {
    /// Build a snapshot, rejecting duplicate ids.
    pub fn new(relation: Relation, records: Vec<UserRecord>) -> Result<Self, ReconcileError> {
        if let Some(id) = first_duplicate(&records) {
            return Err(ReconcileError::DuplicateId {
                relation,
                id: id.to_string(),
            });
        }
        Ok(Self { records })
    }

    /// Build a snapshot keeping the first occurrence of each id.
    ///
    /// Paginated endpoints can repeat an account across page boundaries when
    /// the list changes mid-run.
    #[must_use]
    pub fn dedup(records: Vec<UserRecord>) -> Self {
        let mut seen = HashSet::with_capacity(records.len());
        let records = records
            .into_iter()
            .filter(|r| seen.insert(r.id.clone()))
            .collect();
        Self { records }
    }

    /// Records in fetch order.
    #[must_use]
    pub fn records(&self) -> &[UserRecord] {
        &self.records
    }

    /// Consume the snapshot.
    #[must_use]
    pub fn into_records(self) -> Vec<UserRecord> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Id lookup over this snapshot.
    #[must_use]
    pub fn index(&self) -> HashMap<&str, &UserRecord> {
        self.records.iter().map(|r| (r.id.as_str(), r)).collect()
    }

    /// Whether an account with `id` is present.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.records.iter().any(|r| r.id == id)
    }

    /// Remove the record with `id`, returning it.
    pub fn remove(&mut self, id: &str) -> Option<UserRecord> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }
}

impl TryFrom<Vec<UserRecord>> for ListSnapshot {
    type Error = ReconcileError;

    fn try_from(records: Vec<UserRecord>) -> Result<Self, Self::Error> {
        if let Some(id) = first_duplicate(&records) {
            return Err(ReconcileError::DuplicateRecord(id.to_string()));
        }
        Ok(Self { records })
    }
}

impl From<ListSnapshot> for Vec<UserRecord> {
    fn from(snapshot: ListSnapshot) -> Self {
        snapshot.records
    }
}

/// The previous and current snapshot of one relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPair {
    /// Snapshot before the last successful run.
    #[serde(default)]
    pub old: ListSnapshot,
    /// Snapshot from the last successful run.
    #[serde(default)]
    pub new: ListSnapshot,
}

impl SnapshotPair {
    /// Demote `new` to `old` and install `fetched` as `new`.
    pub fn promote(&mut self, fetched: ListSnapshot) {
        self.old = std::mem::replace(&mut self.new, fetched);
    }

    /// Whether no run has completed yet.
    #[must_use]
    pub fn is_first_run(&self) -> bool {
        self.old.is_empty() && self.new.is_empty()
    }
}
