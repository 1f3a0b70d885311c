//! Credential files, environment credentials and file-backed refresh.
//!
//! A credential file holds either one object or a list of objects with the
//! session cookies of an account:
//!
//! ```json
//! [{"user_id": "42", "session_id": "...", "csrftoken": "...", "x_ig_app_id": "936619743392459"}]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use harvest::{AuthBundle, CredentialRefresher, FetchError};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::WatchError;

pub const ENV_ACCOUNT_ID: &str = "FOLLOWWATCH_ACCOUNT_ID";
pub const ENV_SESSION_ID: &str = "FOLLOWWATCH_SESSION_ID";
pub const ENV_CSRF_TOKEN: &str = "FOLLOWWATCH_CSRF_TOKEN";
pub const ENV_APP_ID: &str = "FOLLOWWATCH_APP_ID";

/// Parse credential JSON: a single bundle or a list of bundles.
pub fn parse_credentials(content: &str) -> Result<Vec<AuthBundle>, WatchError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| WatchError::Credentials(format!("invalid JSON: {e}")))?;

    let entries = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => {
            return Err(WatchError::Credentials(
                "expected an object or a list of objects".into(),
            ))
        }
    };
    if entries.is_empty() {
        return Err(WatchError::Credentials("no credential entries".into()));
    }

    entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| -> Result<AuthBundle, WatchError> {
            let bundle: AuthBundle = serde_json::from_value(entry)
                .map_err(|e| WatchError::Credentials(format!("entry {i}: {e}")))?;
            bundle
                .validate()
                .map_err(|e| WatchError::Credentials(format!("entry {i}: {e}")))?;
            Ok(bundle)
        })
        .collect()
}

/// Load every bundle from a credential file.
pub fn load_credentials(path: &Path) -> Result<Vec<AuthBundle>, WatchError> {
    let content = std::fs::read_to_string(path).map_err(|e| WatchError::io(path, e))?;
    let bundles = parse_credentials(&content)?;
    debug!(path = %path.display(), accounts = bundles.len(), "Loaded credentials");
    Ok(bundles)
}

/// Load bundles from several files, rejecting an account listed twice.
pub fn load_all(paths: &[PathBuf]) -> Result<Vec<AuthBundle>, WatchError> {
    let mut seen = HashSet::new();
    let mut bundles = Vec::new();
    for path in paths {
        for bundle in load_credentials(path)? {
            if !seen.insert(bundle.account_id.clone()) {
                return Err(WatchError::Credentials(format!(
                    "account {} listed more than once",
                    bundle.account_id
                )));
            }
            bundles.push(bundle);
        }
    }
    Ok(bundles)
}

/// Read a bundle from `FOLLOWWATCH_*` environment variables.
pub fn credentials_from_env() -> Result<AuthBundle, WatchError> {
    let var = |name: &str| {
        std::env::var(name).map_err(|_| WatchError::Credentials(format!("{name} not set")))
    };

    let bundle = AuthBundle::new(
        var(ENV_ACCOUNT_ID)?,
        var(ENV_SESSION_ID)?,
        var(ENV_CSRF_TOKEN)?,
        var(ENV_APP_ID)?,
    );
    bundle
        .validate()
        .map_err(|e| WatchError::Credentials(e.to_string()))?;
    Ok(bundle)
}

/// Refreshes rejected credentials by re-reading the credential files.
///
/// Whatever renews the session (a browser export, a person) writes the new
/// cookies to the same file; the refresh fails if nothing changed.
#[derive(Debug, Clone)]
pub struct FileCredentialRefresher {
    paths: Vec<PathBuf>,
}

impl FileCredentialRefresher {
    #[must_use]
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

#[async_trait]
impl CredentialRefresher for FileCredentialRefresher {
    async fn refresh(&self, expired: &AuthBundle) -> Result<AuthBundle, FetchError> {
        for path in &self.paths {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| FetchError::Refresh(format!("{}: {e}", path.display())))?;
            let bundles =
                parse_credentials(&content).map_err(|e| FetchError::Refresh(e.to_string()))?;

            let Some(fresh) = bundles
                .into_iter()
                .find(|b| b.account_id == expired.account_id)
            else {
                continue;
            };

            if &fresh == expired {
                return Err(FetchError::Refresh(format!(
                    "credentials for account {} in {} are unchanged",
                    expired.account_id,
                    path.display()
                )));
            }
            info!(account_id = %fresh.account_id, path = %path.display(), "Reloaded credentials");
            return Ok(fresh);
        }

        Err(FetchError::Refresh(format!(
            "no credentials for account {}",
            expired.account_id
        )))
    }
}
