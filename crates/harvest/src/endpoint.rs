//! Endpoint families: request construction and page parsing.

use reconcile::{IdShape, Relation, UserRecord};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};

use crate::auth::AuthBundle;
use crate::config::FetchConfig;
use crate::error::FetchError;

/// GraphQL query hash for the following list.
pub const FOLLOWING_QUERY_HASH: &str = "58712303d941c6855d4e888c5f0cd22f";

/// GraphQL query hash for the followers list.
pub const FOLLOWERS_QUERY_HASH: &str = "37479f2b8209594dde7facb0d904896a";

/// Which paginated API to walk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Endpoint {
    /// `GET {base}/friendships/{id}/{relation}/?count=N&max_id=C`, cursor in
    /// `next_max_id`, users in mobile shape.
    #[default]
    Friendships,
    /// `GET {graphql}?query_hash=H&variables={..}`, cursor in
    /// `page_info.end_cursor`, users as edges.
    GraphQl {
        following_hash: String,
        followers_hash: String,
    },
}

impl Endpoint {
    /// GraphQL endpoint with the known query hashes.
    #[must_use]
    pub fn graphql() -> Self {
        Self::GraphQl {
            following_hash: FOLLOWING_QUERY_HASH.to_string(),
            followers_hash: FOLLOWERS_QUERY_HASH.to_string(),
        }
    }

    /// Build the request for one page.
    pub(crate) fn request(
        &self,
        client: &Client,
        config: &FetchConfig,
        auth: &AuthBundle,
        relation: Relation,
        page_size: u32,
        cursor: Option<&str>,
    ) -> RequestBuilder {
        let builder = match self {
            Self::Friendships => {
                let url = format!(
                    "{}/friendships/{}/{}/",
                    config.base_url.trim_end_matches('/'),
                    auth.account_id,
                    relation
                );
                let mut query = vec![("count", page_size.to_string())];
                if let Some(cursor) = cursor {
                    query.push(("max_id", cursor.to_string()));
                }
                client.get(url).query(&query)
            }
            Self::GraphQl {
                following_hash,
                followers_hash,
            } => {
                let hash = match relation {
                    Relation::Following => following_hash,
                    Relation::Followers => followers_hash,
                };
                let variables = json!({
                    "id": auth.account_id,
                    "first": page_size,
                    "after": cursor,
                })
                .to_string();
                client
                    .get(&config.graphql_url)
                    .query(&[("query_hash", hash.as_str()), ("variables", variables.as_str())])
            }
        };

        with_session_headers(builder, config, auth, relation.as_str())
    }

    /// Parse one decoded page body.
    pub(crate) fn parse_page(&self, body: &Value, relation: Relation) -> Result<Page, FetchError> {
        match self {
            Self::Friendships => parse_friendships(body),
            Self::GraphQl { .. } => parse_graphql(body, relation),
        }
    }
}

/// Attach the cookie, CSRF, app-id, referer and user-agent headers.
pub(crate) fn with_session_headers(
    builder: RequestBuilder,
    config: &FetchConfig,
    auth: &AuthBundle,
    referer_section: &str,
) -> RequestBuilder {
    let origin = config.web_origin.trim_end_matches('/');
    let referer = if referer_section.is_empty() {
        format!("{origin}/{}/", auth.account_id)
    } else {
        format!("{origin}/{}/{referer_section}/", auth.account_id)
    };
    builder
        .header("cookie", auth.cookie_header())
        .header("referer", referer)
        .header("x-csrftoken", &auth.csrf_token)
        .header("x-ig-app-id", &auth.app_id)
        .header("user-agent", &config.user_agent)
}

/// One page of users and the cursor for the next.
#[derive(Debug, Clone)]
pub(crate) struct Page {
    pub records: Vec<UserRecord>,
    pub next_cursor: Option<String>,
}

/// Read a cursor that may be a string or a number; empty means end.
fn cursor_value(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_friendships(body: &Value) -> Result<Page, FetchError> {
    let users = body
        .get("users")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MalformedResponse("missing 'users' array".into()))?;

    let records = IdShape::Mobile
        .extract_all(users)
        .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

    Ok(Page {
        records,
        next_cursor: cursor_value(body.get("next_max_id")),
    })
}

fn parse_graphql(body: &Value, relation: Relation) -> Result<Page, FetchError> {
    let edge_key = match relation {
        Relation::Following => "edge_follow",
        Relation::Followers => "edge_followed_by",
    };
    let connection = body
        .get("data")
        .and_then(|d| d.get("user"))
        .and_then(|u| u.get(edge_key))
        .ok_or_else(|| FetchError::MalformedResponse(format!("missing data.user.{edge_key}")))?;

    let edges = connection
        .get("edges")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::MalformedResponse(format!("missing {edge_key}.edges")))?;

    let records = IdShape::GraphQlEdge
        .extract_all(edges)
        .map_err(|e| FetchError::MalformedResponse(e.to_string()))?;

    let page_info = connection.get("page_info");
    let has_next = page_info
        .and_then(|p| p.get("has_next_page"))
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let next_cursor = if has_next {
        cursor_value(page_info.and_then(|p| p.get("end_cursor")))
    } else {
        None
    };

    Ok(Page {
        records,
        next_cursor,
    })
}
