//! Session credentials and the refresh seam.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// Credentials for one account's private API session.
///
/// Field aliases accept the cookie names the browser session exposes.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthBundle {
    /// Numeric id of the owning account (`ds_user_id` cookie).
    #[serde(alias = "user_id", alias = "ds_user_id")]
    pub account_id: String,
    /// `sessionid` cookie.
    #[serde(alias = "session_id", alias = "sessionid")]
    pub session_token: String,
    /// `csrftoken` cookie, echoed in `x-csrftoken`.
    #[serde(alias = "csrftoken")]
    pub csrf_token: String,
    /// Web app id sent as `x-ig-app-id`.
    #[serde(alias = "x_ig_app_id")]
    pub app_id: String,
}

impl AuthBundle {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        session_token: impl Into<String>,
        csrf_token: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            session_token: session_token.into(),
            csrf_token: csrf_token.into(),
            app_id: app_id.into(),
        }
    }

    /// Cookie header for API requests.
    #[must_use]
    pub fn cookie_header(&self) -> String {
        format!(
            "csrftoken={}; ds_user_id={}; sessionid={}",
            self.csrf_token, self.account_id, self.session_token
        )
    }

    /// Check that no field is blank.
    pub fn validate(&self) -> Result<(), FetchError> {
        let missing: Vec<&str> = [
            ("account_id", &self.account_id),
            ("session_token", &self.session_token),
            ("csrf_token", &self.csrf_token),
            ("app_id", &self.app_id),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(FetchError::Config(format!(
                "missing credentials: {}",
                missing.join(", ")
            )))
        }
    }
}

// Tokens stay out of logs.
impl fmt::Debug for AuthBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthBundle")
            .field("account_id", &self.account_id)
            .field("session_token", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .field("app_id", &self.app_id)
            .finish()
    }
}

/// Supplies fresh credentials when the API rejects the current ones.
///
/// Called at most once per fetch run, and only after an auth error.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Return a replacement for `expired`.
    async fn refresh(&self, expired: &AuthBundle) -> Result<AuthBundle, FetchError>;
}
