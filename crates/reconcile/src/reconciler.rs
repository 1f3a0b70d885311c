//! Applying a completed fetch to an account's state.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::diff::diff_snapshots;
use crate::error::ReconcileError;
use crate::record::{Relation, UserRecord};
use crate::snapshot::ListSnapshot;
use crate::state::AccountState;

/// Rejects fetched lists that shrank enough to look like a truncated fetch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkGuard {
    /// Reject an empty list when the previous one was not empty.
    pub reject_empty: bool,
    /// Reject when more than this fraction of the previous list vanished.
    pub max_drop_ratio: Option<f64>,
}

impl Default for ShrinkGuard {
    fn default() -> Self {
        Self {
            reject_empty: true,
            max_drop_ratio: None,
        }
    }
}

impl ShrinkGuard {
    /// Accept every list.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            reject_empty: false,
            max_drop_ratio: None,
        }
    }

    /// Check `fetched` against the current snapshot.
    pub fn check(
        &self,
        relation: Relation,
        current: &ListSnapshot,
        fetched: &ListSnapshot,
    ) -> Result<(), ReconcileError> {
        let old_len = current.len();
        let new_len = fetched.len();
        if old_len == 0 {
            return Ok(());
        }

        let empty = self.reject_empty && new_len == 0;
        let dropped = self.max_drop_ratio.is_some_and(|ratio| {
            let lost = old_len.saturating_sub(new_len) as f64;
            lost / old_len as f64 > ratio
        });

        if empty || dropped {
            warn!(%relation, old_len, new_len, "Fetched list shrank suspiciously");
            return Err(ReconcileError::SuspiciousShrink {
                relation,
                old_len,
                new_len,
            });
        }
        Ok(())
    }
}

/// Outcome of applying one relation's fetch.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub relation: Relation,
    /// Size of the new snapshot.
    pub total: usize,
    pub added: Vec<UserRecord>,
    pub removed: Vec<UserRecord>,
    /// Removed ids not already in the removal log.
    pub newly_logged: usize,
}

/// Outcome of applying both relations from one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub following: RunSummary,
    pub followers: RunSummary,
    pub not_following_back: usize,
    pub not_followed_back: usize,
}

/// Turns freshly fetched lists into updated snapshots, removal logs and
/// reciprocation sets.
#[derive(Debug, Clone, Default)]
pub struct SnapshotReconciler {
    guard: ShrinkGuard,
}

impl SnapshotReconciler {
    #[must_use]
    pub fn new(guard: ShrinkGuard) -> Self {
        Self { guard }
    }

    /// Apply one relation's fetched list.
    ///
    /// On error the state is untouched.
    pub fn apply(
        &self,
        state: &mut AccountState,
        relation: Relation,
        fetched: ListSnapshot,
    ) -> Result<RunSummary, ReconcileError> {
        self.guard.check(relation, &state.pair(relation).new, &fetched)?;
        let summary = Self::promote(state, relation, fetched);
        state.refresh_mutual();
        Ok(summary)
    }

    /// Apply both lists from one cycle. Either both are applied or neither.
    pub fn apply_cycle(
        &self,
        state: &mut AccountState,
        following: ListSnapshot,
        followers: ListSnapshot,
    ) -> Result<CycleSummary, ReconcileError> {
        self.guard
            .check(Relation::Following, &state.following.new, &following)?;
        self.guard
            .check(Relation::Followers, &state.followers.new, &followers)?;

        let following = Self::promote(state, Relation::Following, following);
        let followers = Self::promote(state, Relation::Followers, followers);
        state.refresh_mutual();

        let summary = CycleSummary {
            following,
            followers,
            not_following_back: state.who_i_follow_he_dont_followback.len(),
            not_followed_back: state.who_i_dont_follow_he_followback.len(),
        };

        info!(
            account_id = %state.account_id,
            not_following_back = summary.not_following_back,
            not_followed_back = summary.not_followed_back,
            "Reconciled account"
        );
        Ok(summary)
    }

    fn promote(state: &mut AccountState, relation: Relation, fetched: ListSnapshot) -> RunSummary {
        let pair = state.pair_mut(relation);
        pair.promote(fetched);
        let diff = diff_snapshots(&pair.old, &pair.new);
        let total = pair.new.len();

        let newly_logged = state
            .removal_log_mut(relation)
            .accumulate(diff.removed.iter().cloned());
        state.updated_at = Some(Utc::now());

        info!(
            account_id = %state.account_id,
            %relation,
            total,
            added = diff.added.len(),
            removed = diff.removed.len(),
            newly_logged,
            "Applied snapshot"
        );

        RunSummary {
            relation,
            total,
            added: diff.added,
            removed: diff.removed,
            newly_logged,
        }
    }
}
