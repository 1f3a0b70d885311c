//! JSON file store for per-account state.
//!
//! One file per account, `{dir}/{account_id}.json`. Writes go to a temporary
//! file in the same directory and are renamed into place, so a crash never
//! leaves a half-written state behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use reconcile::AccountState;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::WatchError;

/// Directory of account state files.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for `account_id`.
    pub fn path_for(&self, account_id: &str) -> Result<PathBuf, WatchError> {
        let valid = !account_id.is_empty()
            && !account_id.starts_with('.')
            && account_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(WatchError::InvalidAccountId(account_id.to_string()));
        }
        Ok(self.dir.join(format!("{account_id}.json")))
    }

    /// Load state, or an empty state if the account has never been saved.
    pub fn load(&self, account_id: &str) -> Result<AccountState, WatchError> {
        let path = self.path_for(account_id)?;
        if !path.exists() {
            debug!(account_id, "No saved state, starting fresh");
            return Ok(AccountState::new(account_id));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| WatchError::io(&path, e))?;
        let state: AccountState =
            serde_json::from_str(&content).map_err(|e| WatchError::json(&path, e))?;
        if state.account_id != account_id {
            return Err(WatchError::AccountMismatch {
                path,
                expected: account_id.to_string(),
                found: state.account_id,
            });
        }
        Ok(state)
    }

    /// Atomically replace the saved state.
    pub fn save(&self, state: &AccountState) -> Result<PathBuf, WatchError> {
        let path = self.path_for(&state.account_id)?;
        std::fs::create_dir_all(&self.dir).map_err(|e| WatchError::io(&self.dir, e))?;

        let content = serde_json::to_string_pretty(state).map_err(|e| WatchError::json(&path, e))?;
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(|e| WatchError::io(&self.dir, e))?;
        tmp.write_all(content.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| WatchError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| WatchError::io(&path, e.error))?;

        debug!(account_id = %state.account_id, path = %path.display(), "Saved state");
        Ok(path)
    }

    /// Account ids with a saved state, sorted.
    pub fn accounts(&self) -> Result<Vec<String>, WatchError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = std::fs::read_dir(&self.dir).map_err(|e| WatchError::io(&self.dir, e))?;
        let mut accounts = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| WatchError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if self.path_for(stem).is_ok() {
                    accounts.push(stem.to_string());
                }
            }
        }
        accounts.sort();
        Ok(accounts)
    }
}
