//! Cursor-paginated list fetcher with bounded retry.
//!
//! A run walks the endpoint one page at a time. Each page is attempted up to
//! `max_retries` times; a page that keeps failing abandons the whole run and
//! nothing fetched so far is returned, because reconciling a truncated list
//! would report every missing account as removed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reconcile::{ListSnapshot, Relation, UserRecord};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthBundle, CredentialRefresher};
use crate::config::FetchConfig;
use crate::endpoint::{with_session_headers, Page};
use crate::error::{parse_retry_after, FetchError};
use crate::profile::ProfileCounts;

/// Where the loop is and what it does next.
#[derive(Debug)]
enum Phase {
    /// Request the page at `cursor`; `attempt` starts at 1.
    Fetching {
        cursor: Option<String>,
        page_size: u32,
        attempt: u32,
    },
    /// Sleep, then make attempt `attempt + 1` at the same position.
    RetryWait {
        cursor: Option<String>,
        page_size: u32,
        attempt: u32,
        delay: Duration,
    },
    Done,
}

/// Counters describing how a run went.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchReport {
    /// Pages that parsed successfully.
    pub pages: u32,
    /// HTTP requests sent, including failed attempts.
    pub requests: u32,
    /// Failed attempts that were retried.
    pub retries: u32,
    /// Records skipped because their id was already collected.
    pub duplicates: usize,
    /// Whether the truncation re-check ran.
    pub fallback_triggered: bool,
    /// New records found by the re-check.
    pub fallback_recovered: usize,
    /// Whether credentials were refreshed mid-run.
    pub credentials_refreshed: bool,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub relation: Relation,
    /// Every record across all pages, in fetch order, ids unique.
    pub snapshot: ListSnapshot,
    pub report: FetchReport,
    /// Replacement credentials, if a refresh happened.
    pub refreshed_auth: Option<AuthBundle>,
}

/// Mutable bookkeeping for one run.
struct RunState {
    auth: AuthBundle,
    records: Vec<UserRecord>,
    seen: HashSet<String>,
    report: FetchReport,
    in_fallback: bool,
}

impl RunState {
    /// Append unseen records, returning how many were new.
    fn absorb(&mut self, records: Vec<UserRecord>) -> usize {
        let before = self.records.len();
        for record in records {
            if self.seen.insert(record.id.clone()) {
                self.records.push(record);
            } else {
                self.report.duplicates += 1;
            }
        }
        self.records.len() - before
    }
}

/// Walks a relation list to the end.
pub struct PaginatedFetcher {
    client: Client,
    config: FetchConfig,
    refresher: Option<Arc<dyn CredentialRefresher>>,
}

impl PaginatedFetcher {
    /// Create a fetcher.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        config.validate()?;
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            config,
            refresher: None,
        })
    }

    /// Attach a collaborator that can replace rejected credentials.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch the complete `relation` list for the account in `auth`.
    pub async fn fetch(
        &self,
        auth: &AuthBundle,
        relation: Relation,
    ) -> Result<FetchOutcome, FetchError> {
        self.fetch_expecting(auth, relation, None).await
    }

    /// Like [`fetch`](Self::fetch), with the list size the account advertises.
    ///
    /// `expected_total` only matters for
    /// [`FallbackTrigger::BelowExpected`](crate::FallbackTrigger::BelowExpected).
    pub async fn fetch_expecting(
        &self,
        auth: &AuthBundle,
        relation: Relation,
        expected_total: Option<usize>,
    ) -> Result<FetchOutcome, FetchError> {
        auth.validate()?;

        let result = match self.config.run_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.run(auth, relation, expected_total)).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::DeadlineExceeded(limit)),
                }
            }
            None => self.run(auth, relation, expected_total).await,
        };

        if let Err(e) = &result {
            error!(account_id = %auth.account_id, %relation, error = %e, "Fetch run failed");
        }
        result
    }

    async fn run(
        &self,
        auth: &AuthBundle,
        relation: Relation,
        expected_total: Option<usize>,
    ) -> Result<FetchOutcome, FetchError> {
        let started = Instant::now();
        info!(
            account_id = %auth.account_id,
            %relation,
            page_size = self.config.page_size,
            "Starting fetch run"
        );

        let mut state = RunState {
            auth: auth.clone(),
            records: Vec::new(),
            seen: HashSet::new(),
            report: FetchReport::default(),
            in_fallback: false,
        };

        let mut phase = Phase::Fetching {
            cursor: None,
            page_size: self.config.page_size,
            attempt: 1,
        };

        loop {
            phase = match phase {
                Phase::Fetching {
                    cursor,
                    page_size,
                    attempt,
                } => {
                    self.step(&mut state, relation, expected_total, cursor, page_size, attempt)
                        .await?
                }
                Phase::RetryWait {
                    cursor,
                    page_size,
                    attempt,
                    delay,
                } => {
                    tokio::time::sleep(delay).await;
                    Phase::Fetching {
                        cursor,
                        page_size,
                        attempt: attempt + 1,
                    }
                }
                Phase::Done => break,
            };
        }

        state.report.elapsed = started.elapsed();
        info!(
            account_id = %auth.account_id,
            %relation,
            total = state.records.len(),
            pages = state.report.pages,
            requests = state.report.requests,
            fallback_triggered = state.report.fallback_triggered,
            "Fetch run complete"
        );

        let refreshed_auth = state.report.credentials_refreshed.then_some(state.auth);
        Ok(FetchOutcome {
            relation,
            snapshot: ListSnapshot::dedup(state.records),
            report: state.report,
            refreshed_auth,
        })
    }

    /// Make one request and decide the next phase.
    async fn step(
        &self,
        state: &mut RunState,
        relation: Relation,
        expected_total: Option<usize>,
        cursor: Option<String>,
        page_size: u32,
        attempt: u32,
    ) -> Result<Phase, FetchError> {
        if state.report.requests as usize >= self.config.max_pages {
            return Err(FetchError::PageLimitExceeded(self.config.max_pages));
        }
        state.report.requests += 1;

        debug!(%relation, cursor = ?cursor, page_size, attempt, "Fetching page");
        let result = self
            .fetch_page(&state.auth, relation, page_size, cursor.as_deref())
            .await;

        match result {
            Ok(page) => {
                state.report.pages += 1;
                let fresh = state.absorb(page.records);
                if state.in_fallback {
                    state.report.fallback_recovered += fresh;
                }
                debug!(%relation, fresh, total = state.records.len(), "Page ok");

                Ok(self.after_page(state, relation, expected_total, cursor, page.next_cursor, page_size))
            }
            Err(e) if e.is_auth() && !state.report.credentials_refreshed => {
                let Some(refresher) = &self.refresher else {
                    return Err(e);
                };
                warn!(account_id = %state.auth.account_id, error = %e, "Credentials rejected, refreshing");
                state.auth = refresher.refresh(&state.auth).await?;
                state.report.credentials_refreshed = true;
                Ok(Phase::Fetching {
                    cursor,
                    page_size,
                    attempt,
                })
            }
            Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                let delay = e.retry_delay(self.config.retry_delay, self.config.max_retry_after);
                state.report.retries += 1;
                warn!(
                    %relation,
                    cursor = ?cursor,
                    attempt,
                    max_retries = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Page request failed, retrying"
                );
                Ok(Phase::RetryWait {
                    cursor,
                    page_size,
                    attempt,
                    delay,
                })
            }
            Err(e) if e.is_retryable() => Err(FetchError::ExhaustedRetries {
                attempts: attempt,
                source: Box::new(e),
            }),
            Err(e) => Err(e),
        }
    }

    /// Pick the next phase after a successful page.
    fn after_page(
        &self,
        state: &mut RunState,
        relation: Relation,
        expected_total: Option<usize>,
        cursor: Option<String>,
        next_cursor: Option<String>,
        page_size: u32,
    ) -> Phase {
        // A repeated cursor ends the walk like a missing one.
        let next_cursor = match next_cursor {
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                warn!(%relation, cursor = %next, "Server repeated the cursor");
                None
            }
            other => other,
        };

        match next_cursor {
            Some(next) => Phase::Fetching {
                cursor: Some(next),
                page_size,
                attempt: 1,
            },
            None if !state.in_fallback
                && self.config.fallback_enabled()
                && self
                    .config
                    .fallback_trigger
                    .fires(state.records.len(), expected_total) =>
            {
                warn!(
                    %relation,
                    cursor = ?cursor,
                    collected = state.records.len(),
                    expected_total = ?expected_total,
                    fallback_page_size = self.config.fallback_page_size,
                    "Cursor ran out at normal page size, re-checking with small pages"
                );
                state.in_fallback = true;
                state.report.fallback_triggered = true;
                Phase::Fetching {
                    cursor,
                    page_size: self.config.fallback_page_size,
                    attempt: 1,
                }
            }
            None => Phase::Done,
        }
    }

    /// Request and parse a single page.
    async fn fetch_page(
        &self,
        auth: &AuthBundle,
        relation: Relation,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let request =
            self.config
                .endpoint
                .request(&self.client, &self.config, auth, relation, page_size, cursor);
        let body = Self::send(request).await?;
        self.config.endpoint.parse_page(&body, relation)
    }

    /// Fetch the list sizes the account advertises, in a single attempt.
    ///
    /// Feeds [`fetch_expecting`](Self::fetch_expecting) when the fallback
    /// trigger is size-conditioned.
    pub async fn profile_counts(&self, auth: &AuthBundle) -> Result<ProfileCounts, FetchError> {
        auth.validate()?;
        let url = format!(
            "{}/users/{}/info/",
            self.config.base_url.trim_end_matches('/'),
            auth.account_id
        );
        let request = with_session_headers(self.client.get(url), &self.config, auth, "");
        let body = Self::send(request).await?;
        let counts = ProfileCounts::from_body(&body)?;

        debug!(
            account_id = %auth.account_id,
            following = counts.following,
            followers = counts.followers,
            "Fetched profile counts"
        );
        Ok(counts)
    }

    /// Send a request and classify the response.
    async fn send(request: RequestBuilder) -> Result<Value, FetchError> {
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = match response.headers().get(RETRY_AFTER).map(|v| v.to_str()) {
                Some(Ok(value)) => {
                    let parsed = parse_retry_after(value, Utc::now());
                    if parsed.is_none() {
                        debug!(value, "Unparseable Retry-After, using fixed delay");
                    }
                    parsed
                }
                Some(Err(_)) => {
                    debug!("Non-ASCII Retry-After, using fixed delay");
                    None
                }
                None => None,
            };
            return Err(FetchError::RateLimited { retry_after });
        }

        let text = response.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Auth {
                status: status.as_u16(),
                message: text,
            });
        }
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Failed to decode response body");
            FetchError::MalformedResponse(format!("undecodable body: {e}"))
        })
    }
}
