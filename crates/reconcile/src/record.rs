//! User records and identity extraction.
//!
//! Different endpoints describe the same account with differently shaped
//! objects: the private mobile API keys users by `pk`, the web search API and
//! GraphQL nodes by `id`, and either may be a JSON string or an integer.
//! Every object goes through [`IdShape::extract`] before it takes part in any
//! set operation, so the rest of the crate only ever sees a canonical string
//! `id`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReconcileError;

/// Which related-accounts list a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    /// Accounts the owner follows.
    Following,
    /// Accounts following the owner.
    Followers,
}

impl Relation {
    /// Path segment / wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Following => "following",
            Self::Followers => "followers",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "following" => Ok(Self::Following),
            "followers" | "follower" => Ok(Self::Followers),
            other => Err(ReconcileError::Relation(other.to_string())),
        }
    }
}

/// A related account, kept with its display metadata.
///
/// `id` is the platform-assigned identifier and the only join key; usernames
/// can change between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawUser")]
pub struct UserRecord {
    /// Platform-assigned numeric id, as a string.
    pub id: String,
    /// Handle at the time of the fetch.
    pub username: String,
    /// Display name.
    pub full_name: String,
    /// Whether the account is private.
    pub is_private: bool,
    /// Whether the account is verified.
    pub is_verified: bool,
    /// Avatar URL.
    pub profile_pic_url: String,
}

impl UserRecord {
    /// Create a record with only an id and username set.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            full_name: String::new(),
            is_private: false,
            is_verified: false,
            profile_pic_url: String::new(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }
}

/// How an endpoint identifies users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    /// Private mobile API objects: `pk` first, then `id`.
    Mobile,
    /// Web search API objects: `id` first, then `pk`.
    Web,
    /// GraphQL edges: `{"node": {...}}` wrapping a web-shaped object.
    GraphQlEdge,
}

impl IdShape {
    /// Build a canonical record from one user object of this shape.
    pub fn extract(self, value: &Value) -> Result<UserRecord, ReconcileError> {
        let object = match self {
            Self::GraphQlEdge => value
                .get("node")
                .ok_or_else(|| ReconcileError::InvalidRecord("edge without node".to_string()))?,
            Self::Mobile | Self::Web => value,
        };

        let raw = RawUser::deserialize(object)
            .map_err(|e| ReconcileError::InvalidRecord(e.to_string()))?;

        let id = match self {
            Self::Mobile => raw.pk.clone().or_else(|| raw.id.clone()),
            Self::Web | Self::GraphQlEdge => raw.id.clone().or_else(|| raw.pk.clone()),
        };

        raw.into_record(id)
    }

    /// Extract every object in `values`, failing on the first invalid one.
    pub fn extract_all(self, values: &[Value]) -> Result<Vec<UserRecord>, ReconcileError> {
        values.iter().map(|v| self.extract(v)).collect()
    }
}

/// An identifier that may arrive as a string or an integer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    fn into_string(self) -> Option<String> {
        match self {
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

/// Loosely typed user object; both id spellings are read so the caller can
/// pick according to the endpoint shape.
#[derive(Debug, Deserialize)]
struct RawUser {
    #[serde(default)]
    id: Option<RawId>,
    #[serde(default)]
    pk: Option<RawId>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    is_private: Option<bool>,
    #[serde(default)]
    is_verified: Option<bool>,
    #[serde(default)]
    profile_pic_url: Option<String>,
}

impl RawUser {
    fn into_record(self, id: Option<RawId>) -> Result<UserRecord, ReconcileError> {
        let id = id.and_then(RawId::into_string).ok_or_else(|| {
            ReconcileError::InvalidRecord(format!(
                "user {} has no id or pk",
                self.username.as_deref().unwrap_or("<unknown>")
            ))
        })?;

        Ok(UserRecord {
            id,
            username: self.username.unwrap_or_default(),
            full_name: self.full_name.unwrap_or_default(),
            is_private: self.is_private.unwrap_or(false),
            is_verified: self.is_verified.unwrap_or(false),
            profile_pic_url: self.profile_pic_url.unwrap_or_default(),
        })
    }
}

// Stored records are canonical (`id`), but older stores wrote `pk`.
impl TryFrom<RawUser> for UserRecord {
    type Error = ReconcileError;

    fn try_from(raw: RawUser) -> Result<Self, Self::Error> {
        let id = raw.id.clone().or_else(|| raw.pk.clone());
        raw.into_record(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mobile_shape_prefers_pk() {
        let value = json!({"pk": 123, "id": "999", "username": "alice"});
        let record = IdShape::Mobile.extract(&value).unwrap();
        assert_eq!(record.id, "123");
        assert_eq!(record.username, "alice");
    }

    #[test]
    fn test_web_shape_prefers_id() {
        let value = json!({"pk": "123", "id": "999", "username": "alice"});
        let record = IdShape::Web.extract(&value).unwrap();
        assert_eq!(record.id, "999");
    }

    #[test]
    fn test_graphql_edge_unwraps_node() {
        let value = json!({"node": {"id": "42", "username": "bob", "is_verified": true}});
        let record = IdShape::GraphQlEdge.extract(&value).unwrap();
        assert_eq!(record.id, "42");
        assert!(record.is_verified);
        assert!(!record.is_private);
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let value = json!({"username": "ghost"});
        assert!(matches!(
            IdShape::Mobile.extract(&value),
            Err(ReconcileError::InvalidRecord(_))
        ));

        let blank = json!({"pk": "", "username": "ghost"});
        assert!(IdShape::Mobile.extract(&blank).is_err());
    }

    #[test]
    fn test_stored_record_accepts_pk() {
        let record: UserRecord =
            serde_json::from_value(json!({"pk": "7", "username": "carol"})).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.full_name, "");

        let missing = serde_json::from_value::<UserRecord>(json!({"username": "carol"}));
        assert!(missing.is_err());
    }

    #[test]
    fn test_record_serializes_canonical_id() {
        let record = UserRecord::new("5", "dave");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], "5");
        assert!(value.get("pk").is_none());
    }

    #[test]
    fn test_relation_parse() {
        assert_eq!("Following".parse::<Relation>().unwrap(), Relation::Following);
        assert_eq!("followers".parse::<Relation>().unwrap(), Relation::Followers);
        assert!("friends".parse::<Relation>().is_err());
    }
}
