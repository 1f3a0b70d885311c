//! Accumulated removal log.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::record::UserRecord;
use crate::snapshot::first_duplicate;

/// Accounts that disappeared from a list, kept until acknowledged.
///
/// Serialized as a plain list of records in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<UserRecord>", into = "Vec<UserRecord>")]
pub struct RemovalLog {
    entries: Vec<UserRecord>,
}

impl TryFrom<Vec<UserRecord>> for RemovalLog {
    type Error = ReconcileError;

    fn try_from(entries: Vec<UserRecord>) -> Result<Self, Self::Error> {
        if let Some(id) = first_duplicate(&entries) {
            return Err(ReconcileError::DuplicateRecord(id.to_string()));
        }
        Ok(Self { entries })
    }
}

impl From<RemovalLog> for Vec<UserRecord> {
    fn from(log: RemovalLog) -> Self {
        log.entries
    }
}

impl RemovalLog {
    /// Union `removed` into the log.
    ///
    /// An incoming record replaces a stored record with the same id in place,
    /// so metadata stays fresh. Returns how many ids were new to the log.
    pub fn accumulate<I>(&mut self, removed: I) -> usize
    where
        I: IntoIterator<Item = UserRecord>,
    {
        let mut positions: HashMap<String, usize> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();

        let mut inserted = 0;
        for record in removed {
            if let Some(&pos) = positions.get(&record.id) {
                self.entries[pos] = record;
            } else {
                positions.insert(record.id.clone(), self.entries.len());
                self.entries.push(record);
                inserted += 1;
            }
        }
        inserted
    }

    /// Drop an entry the consumer has seen. Returns the removed record.
    pub fn acknowledge(&mut self, id: &str) -> Option<UserRecord> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&UserRecord> {
        self.entries.iter().find(|e| e.id == id)
    }

    #[must_use]
    pub fn entries(&self) -> &[UserRecord] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
