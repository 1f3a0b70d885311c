//! One fetch-and-reconcile cycle per account.

use futures::future::join_all;
use harvest::{AuthBundle, FallbackTrigger, FetchReport, PaginatedFetcher, ProfileCounts};
use reconcile::{CycleSummary, Relation, SnapshotReconciler};
use tracing::{error, info, warn};

use crate::error::WatchError;
use crate::store::StateStore;

/// Result of a successful cycle for one account.
#[derive(Debug)]
pub struct CycleOutcome {
    pub account_id: String,
    pub summary: CycleSummary,
    pub following_report: FetchReport,
    pub followers_report: FetchReport,
    /// Credentials that replaced the ones the cycle started with.
    pub refreshed_auth: Option<AuthBundle>,
}

/// Per-account results of a multi-account run.
#[derive(Debug, Default)]
pub struct RunResult {
    pub succeeded: Vec<CycleOutcome>,
    pub failed: Vec<(String, WatchError)>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetches both lists, reconciles them into saved state, and saves.
///
/// State is only loaded after both fetches succeed, and only saved after
/// reconciliation accepts them.
pub struct WatchCycle {
    fetcher: PaginatedFetcher,
    reconciler: SnapshotReconciler,
    store: StateStore,
}

impl WatchCycle {
    #[must_use]
    pub fn new(fetcher: PaginatedFetcher, reconciler: SnapshotReconciler, store: StateStore) -> Self {
        Self {
            fetcher,
            reconciler,
            store,
        }
    }

    #[must_use]
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Run one cycle for one account.
    pub async fn run_account(&self, auth: AuthBundle) -> Result<CycleOutcome, WatchError> {
        let account_id = auth.account_id.clone();
        // Fail on a bad account id before spending any requests.
        self.store.path_for(&account_id)?;
        info!(account_id = %account_id, "Starting watch cycle");

        let expected = self.expected_counts(&auth).await;

        let following = self
            .fetcher
            .fetch_expecting(
                &auth,
                Relation::Following,
                expected.map(|c| c.for_relation(Relation::Following)),
            )
            .await?;
        let auth = following.refreshed_auth.clone().unwrap_or(auth);

        let followers = self
            .fetcher
            .fetch_expecting(
                &auth,
                Relation::Followers,
                expected.map(|c| c.for_relation(Relation::Followers)),
            )
            .await?;
        let refreshed_auth = followers
            .refreshed_auth
            .clone()
            .or_else(|| following.refreshed_auth.clone());

        let mut state = self.store.load(&account_id)?;
        let summary =
            self.reconciler
                .apply_cycle(&mut state, following.snapshot, followers.snapshot)?;
        self.store.save(&state)?;

        info!(
            account_id = %account_id,
            following = summary.following.total,
            followers = summary.followers.total,
            unfollowed = summary.following.removed.len(),
            lost_followers = summary.followers.removed.len(),
            "Watch cycle complete"
        );

        Ok(CycleOutcome {
            account_id,
            summary,
            following_report: following.report,
            followers_report: followers.report,
            refreshed_auth,
        })
    }

    /// Run cycles for every account concurrently.
    pub async fn run_all(&self, accounts: Vec<AuthBundle>) -> RunResult {
        let ids: Vec<String> = accounts.iter().map(|a| a.account_id.clone()).collect();
        let results = join_all(accounts.into_iter().map(|auth| self.run_account(auth))).await;

        let mut run = RunResult::default();
        for (account_id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(outcome) => run.succeeded.push(outcome),
                Err(e) => {
                    error!(account_id = %account_id, error = %e, "Watch cycle failed");
                    run.failed.push((account_id, e));
                }
            }
        }
        run
    }

    /// Advertised list sizes, only fetched when the fallback depends on them.
    async fn expected_counts(&self, auth: &AuthBundle) -> Option<ProfileCounts> {
        if self.fetcher.config().fallback_trigger != FallbackTrigger::BelowExpected {
            return None;
        }
        match self.fetcher.profile_counts(auth).await {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!(account_id = %auth.account_id, error = %e, "Profile counts unavailable");
                None
            }
        }
    }
}
