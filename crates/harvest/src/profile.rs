//! Advertised list sizes from the profile info endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

/// Following/follower counts the platform reports for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCounts {
    pub following: usize,
    pub followers: usize,
}

impl ProfileCounts {
    /// Read `user.following_count` / `user.follower_count`.
    pub(crate) fn from_body(body: &Value) -> Result<Self, FetchError> {
        let user = body
            .get("user")
            .ok_or_else(|| FetchError::MalformedResponse("missing 'user'".into()))?;
        let count = |key: &str| {
            user.get(key)
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .ok_or_else(|| FetchError::MalformedResponse(format!("missing user.{key}")))
        };

        Ok(Self {
            following: count("following_count")?,
            followers: count("follower_count")?,
        })
    }

    #[must_use]
    pub fn for_relation(&self, relation: reconcile::Relation) -> usize {
        match relation {
            reconcile::Relation::Following => self.following,
            reconcile::Relation::Followers => self.followers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_profile_counts() {
        let body = json!({"user": {"pk": "42", "following_count": 310, "follower_count": 295}});
        let counts = ProfileCounts::from_body(&body).unwrap();
        assert_eq!(counts.for_relation(reconcile::Relation::Following), 310);
        assert_eq!(counts.followers, 295);

        assert!(ProfileCounts::from_body(&json!({"status": "fail"})).is_err());
    }
}
