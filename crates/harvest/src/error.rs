//! Error types for list harvesting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Read a `Retry-After` value given as delay seconds or as an HTTP date.
///
/// A date in the past means retry now.
pub(crate) fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

/// Errors that can occur while fetching a relation list.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, timeout or body-read failure.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server asked us to slow down.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Server-supplied wait, if any.
        retry_after: Option<Duration>,
    },

    /// Body was not JSON or lacked an expected field.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Session is expired or invalid.
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    /// Any other non-success status.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// A page kept failing; the run was abandoned.
    #[error("giving up after {attempts} attempts: {source}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    /// Pagination did not terminate within the page cap.
    #[error("pagination exceeded {0} requests")]
    PageLimitExceeded(usize),

    /// The whole run overran its deadline.
    #[error("fetch run exceeded {0:?}")]
    DeadlineExceeded(Duration),

    /// The credential refresher could not supply new credentials.
    #[error("credential refresh failed: {0}")]
    Refresh(String),

    /// Invalid fetcher configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether the same page may be requested again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => !e.is_builder(),
            Self::RateLimited { .. } | Self::MalformedResponse(_) => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 408,
            Self::Auth { .. }
            | Self::ExhaustedRetries { .. }
            | Self::PageLimitExceeded(_)
            | Self::DeadlineExceeded(_)
            | Self::Refresh(_)
            | Self::Config(_) => false,
        }
    }

    /// Whether credentials need refreshing.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Auth { .. } => true,
            Self::ExhaustedRetries { source, .. } => source.is_auth(),
            _ => false,
        }
    }

    /// How long to wait before the next attempt.
    pub(crate) fn retry_delay(&self, fixed: Duration, cap: Duration) -> Duration {
        match self {
            Self::RateLimited {
                retry_after: Some(wait),
            } => (*wait).min(cap),
            _ => fixed,
        }
    }
}
