//! Fetcher configuration.

use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::error::FetchError;

/// Default REST API root.
pub const DEFAULT_BASE_URL: &str = "https://www.instagram.com/api/v1";

/// Default GraphQL query URL.
pub const DEFAULT_GRAPHQL_URL: &str = "https://www.instagram.com/graphql/query/";

/// Origin used to build the `referer` header.
pub const DEFAULT_WEB_ORIGIN: &str = "https://www.instagram.com";

/// Page size for normal pagination.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Page size used when re-checking a suspected truncation.
pub const DEFAULT_FALLBACK_PAGE_SIZE: u32 = 1;

/// Attempts per page, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fixed wait between attempts.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Longest server-requested wait we will honour.
pub const DEFAULT_MAX_RETRY_AFTER_SECS: u64 = 300;

/// Per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Cap on requests per run.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Browser user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// When to re-request the last position at the fallback page size.
///
/// The upstream API sometimes ends a large-page walk early without any error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackTrigger {
    /// Trust the first missing cursor.
    Never,
    /// Re-check once whenever the cursor runs out at normal page size.
    #[default]
    OnExhaustion,
    /// Re-check only if fewer records than the expected total were collected.
    /// Without an expected total this behaves like `OnExhaustion`.
    BelowExpected,
}

impl FallbackTrigger {
    /// Decide whether to fall back after `collected` records.
    pub fn fires(self, collected: usize, expected: Option<usize>) -> bool {
        match self {
            Self::Never => false,
            Self::OnExhaustion => true,
            Self::BelowExpected => expected.is_none_or(|total| collected < total),
        }
    }
}

impl std::str::FromStr for FallbackTrigger {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "on-exhaustion" => Ok(Self::OnExhaustion),
            "below-expected" => Ok(Self::BelowExpected),
            other => Err(FetchError::Config(format!(
                "unknown fallback trigger: {other}"
            ))),
        }
    }
}

/// Settings for [`crate::PaginatedFetcher`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Which endpoint family to page through.
    pub endpoint: Endpoint,
    /// REST API root.
    pub base_url: String,
    /// GraphQL query URL.
    pub graphql_url: String,
    /// Origin for the `referer` header.
    pub web_origin: String,
    /// Normal page size.
    pub page_size: u32,
    /// Page size for the truncation re-check.
    pub fallback_page_size: u32,
    /// When the re-check happens.
    pub fallback_trigger: FallbackTrigger,
    /// Attempts per page, including the first.
    pub max_retries: u32,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,
    /// Cap on server-requested waits.
    pub max_retry_after: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Deadline for a whole run, including retry waits.
    pub run_timeout: Option<Duration>,
    /// Cap on requests per run.
    pub max_pages: usize,
    /// `user-agent` header.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Friendships,
            base_url: DEFAULT_BASE_URL.to_string(),
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
            web_origin: DEFAULT_WEB_ORIGIN.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            fallback_page_size: DEFAULT_FALLBACK_PAGE_SIZE,
            fallback_trigger: FallbackTrigger::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            max_retry_after: Duration::from_secs(DEFAULT_MAX_RETRY_AFTER_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            run_timeout: None,
            max_pages: DEFAULT_MAX_PAGES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Reject settings that would make the fetch loop misbehave.
    pub fn validate(&self) -> Result<(), FetchError> {
        if self.page_size == 0 || self.fallback_page_size == 0 {
            return Err(FetchError::Config("page sizes must be positive".into()));
        }
        if self.max_retries == 0 {
            return Err(FetchError::Config("max_retries must be at least 1".into()));
        }
        if self.max_pages == 0 {
            return Err(FetchError::Config("max_pages must be at least 1".into()));
        }
        Ok(())
    }

    /// Whether the truncation re-check can do anything.
    pub(crate) fn fallback_enabled(&self) -> bool {
        self.fallback_trigger != FallbackTrigger::Never && self.fallback_page_size < self.page_size
    }
}
