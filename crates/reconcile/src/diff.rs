//! Set differences between snapshots, keyed by id.

use serde::{Deserialize, Serialize};

use crate::record::UserRecord;
use crate::snapshot::ListSnapshot;

/// What changed between two snapshots of the same relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// In `new` but not in `old`, in `new` order.
    pub added: Vec<UserRecord>,
    /// In `old` but not in `new`, in `old` order.
    pub removed: Vec<UserRecord>,
}

impl SnapshotDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Reciprocation views derived from the current following/followers lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutualView {
    /// Accounts followed that do not follow back.
    pub followed_not_following_back: Vec<UserRecord>,
    /// Followers that are not followed back.
    pub followers_not_followed_back: Vec<UserRecord>,
}

/// Records of `side` whose id is absent from `other`.
fn missing_from(side: &ListSnapshot, other: &ListSnapshot) -> Vec<UserRecord> {
    let index = other.index();
    side.records()
        .iter()
        .filter(|r| !index.contains_key(r.id.as_str()))
        .cloned()
        .collect()
}

/// Compute additions and removals between `old` and `new`.
///
/// Records are returned whole, taken from the side they belong to.
#[must_use]
pub fn diff_snapshots(old: &ListSnapshot, new: &ListSnapshot) -> SnapshotDiff {
    SnapshotDiff {
        added: missing_from(new, old),
        removed: missing_from(old, new),
    }
}

/// Recompute both reciprocation sets from scratch.
#[must_use]
pub fn reconcile_mutual(following: &ListSnapshot, followers: &ListSnapshot) -> MutualView {
    MutualView {
        followed_not_following_back: missing_from(following, followers),
        followers_not_followed_back: missing_from(followers, following),
    }
}
