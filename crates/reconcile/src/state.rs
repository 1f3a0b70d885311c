//! Persisted per-account reconciliation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::reconcile_mutual;
use crate::error::ReconcileError;
use crate::record::{Relation, UserRecord};
use crate::removal::RemovalLog;
use crate::snapshot::SnapshotPair;

/// Everything kept between runs for one owning account.
///
/// Field names match what the persistence layer stores.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Owning account.
    pub account_id: String,
    /// Snapshots of the accounts the owner follows.
    #[serde(default)]
    pub following: SnapshotPair,
    /// Snapshots of the owner's followers.
    #[serde(default)]
    pub followers: SnapshotPair,
    /// Followed accounts that do not follow back.
    #[serde(default)]
    pub who_i_follow_he_dont_followback: Vec<UserRecord>,
    /// Followers the owner does not follow back.
    #[serde(default)]
    pub who_i_dont_follow_he_followback: Vec<UserRecord>,
    /// Accounts that left the following list.
    #[serde(default)]
    pub who_removed_following: RemovalLog,
    /// Accounts that stopped following the owner.
    #[serde(default)]
    pub who_removed_follower: RemovalLog,
    /// When a run last changed this state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AccountState {
    /// Empty state for an account that has never been harvested.
    #[must_use]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pair(&self, relation: Relation) -> &SnapshotPair {
        match relation {
            Relation::Following => &self.following,
            Relation::Followers => &self.followers,
        }
    }

    pub fn pair_mut(&mut self, relation: Relation) -> &mut SnapshotPair {
        match relation {
            Relation::Following => &mut self.following,
            Relation::Followers => &mut self.followers,
        }
    }

    #[must_use]
    pub fn removal_log(&self, relation: Relation) -> &RemovalLog {
        match relation {
            Relation::Following => &self.who_removed_following,
            Relation::Followers => &self.who_removed_follower,
        }
    }

    pub fn removal_log_mut(&mut self, relation: Relation) -> &mut RemovalLog {
        match relation {
            Relation::Following => &mut self.who_removed_following,
            Relation::Followers => &mut self.who_removed_follower,
        }
    }

    /// Recompute both reciprocation sets from the current snapshots.
    pub fn refresh_mutual(&mut self) {
        let view = reconcile_mutual(&self.following.new, &self.followers.new);
        self.who_i_follow_he_dont_followback = view.followed_not_following_back;
        self.who_i_dont_follow_he_followback = view.followers_not_followed_back;
    }

    /// Clear a removal-log entry once the consumer has seen it.
    pub fn acknowledge_removal(
        &mut self,
        relation: Relation,
        id: &str,
    ) -> Result<UserRecord, ReconcileError> {
        let record = self
            .removal_log_mut(relation)
            .acknowledge(id)
            .ok_or_else(|| ReconcileError::NotFound {
                relation,
                id: id.to_string(),
            })?;
        self.updated_at = Some(Utc::now());
        Ok(record)
    }

    /// Forget an account the owner has just unfollowed.
    ///
    /// Drops it from both following snapshots so the next run does not
    /// report it as removed, then recomputes the reciprocation sets.
    pub fn forget_following(&mut self, id: &str) -> Result<UserRecord, ReconcileError> {
        let record = self
            .following
            .new
            .remove(id)
            .ok_or_else(|| ReconcileError::NotFound {
                relation: Relation::Following,
                id: id.to_string(),
            })?;
        self.following.old.remove(id);
        self.refresh_mutual();
        self.updated_at = Some(Utc::now());

        tracing::debug!(account_id = %self.account_id, id, "Forgot following record");
        Ok(record)
    }
}
