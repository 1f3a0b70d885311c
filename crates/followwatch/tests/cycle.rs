//! End-to-end cycles against a mock API server.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use followwatch::{FileCredentialRefresher, StateStore, WatchCycle, WatchError};
use harvest::{AuthBundle, FallbackTrigger, FetchConfig, FetchError, PaginatedFetcher};
use reconcile::{ReconcileError, SnapshotReconciler};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn auth(session: &str) -> AuthBundle {
    AuthBundle::new("42", session, "csrf", "936619743392459")
}

fn config(server: &MockServer) -> FetchConfig {
    FetchConfig {
        base_url: server.uri(),
        fallback_trigger: FallbackTrigger::Never,
        retry_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

fn list(ids: &[u64]) -> ResponseTemplate {
    let users: Vec<Value> = ids
        .iter()
        .map(|id| json!({"pk": id, "username": format!("user{id}"), "full_name": ""}))
        .collect();
    ResponseTemplate::new(200).set_body_json(json!({"users": users, "next_max_id": null}))
}

async fn serve(server: &MockServer, following: &[u64], followers: &[u64]) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/friendships/42/following/"))
        .respond_with(list(following))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/friendships/42/followers/"))
        .respond_with(list(followers))
        .mount(server)
        .await;
}

fn cycle(server: &MockServer, dir: &Path) -> WatchCycle {
    WatchCycle::new(
        PaginatedFetcher::new(config(server)).unwrap(),
        SnapshotReconciler::default(),
        StateStore::new(dir),
    )
}

fn ids(records: &[reconcile::UserRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

#[tokio::test]
async fn test_two_cycles_track_unfollows() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cycle = cycle(&server, dir.path());

    serve(&server, &[1, 2, 3], &[2, 3, 4]).await;
    let first = cycle.run_account(auth("s")).await.unwrap();
    assert_eq!(first.summary.following.added.len(), 3);
    assert!(first.summary.following.removed.is_empty());

    serve(&server, &[2, 3], &[3, 4, 5]).await;
    let second = cycle.run_account(auth("s")).await.unwrap();
    assert_eq!(ids(&second.summary.following.removed), vec!["1"]);
    assert_eq!(ids(&second.summary.followers.removed), vec!["2"]);
    assert_eq!(ids(&second.summary.followers.added), vec!["5"]);

    let state = cycle.store().load("42").unwrap();
    assert_eq!(ids(state.who_removed_following.entries()), vec!["1"]);
    assert_eq!(ids(state.who_removed_follower.entries()), vec!["2"]);
    assert_eq!(ids(&state.who_i_follow_he_dont_followback), vec!["2"]);
    assert_eq!(ids(&state.who_i_dont_follow_he_followback), vec!["4", "5"]);
}

#[tokio::test]
async fn test_failed_fetch_leaves_state_untouched() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cycle = cycle(&server, dir.path());

    serve(&server, &[1, 2], &[2]).await;
    cycle.run_account(auth("s")).await.unwrap();
    let before = std::fs::read_to_string(dir.path().join("42.json")).unwrap();

    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/friendships/42/following/"))
        .respond_with(list(&[1]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/friendships/42/followers/"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = cycle.run_account(auth("s")).await.unwrap_err();
    assert!(matches!(
        err,
        WatchError::Fetch(FetchError::ExhaustedRetries { attempts: 3, .. })
    ));
    let after = std::fs::read_to_string(dir.path().join("42.json")).unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_empty_list_rejected_by_shrink_guard() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cycle = cycle(&server, dir.path());

    serve(&server, &[1, 2], &[2]).await;
    cycle.run_account(auth("s")).await.unwrap();

    serve(&server, &[], &[2]).await;
    let err = cycle.run_account(auth("s")).await.unwrap_err();
    assert!(matches!(
        err,
        WatchError::Reconcile(ReconcileError::SuspiciousShrink { .. })
    ));

    let state = cycle.store().load("42").unwrap();
    assert_eq!(state.following.new.len(), 2);
    assert!(state.who_removed_following.is_empty());
}

#[tokio::test]
async fn test_run_all_reports_each_account() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cycle = cycle(&server, dir.path());
    serve(&server, &[1], &[1]).await;

    let bad = AuthBundle::new("../escape", "s", "csrf", "app");
    let result = cycle.run_all(vec![auth("s"), bad]).await;

    assert_eq!(result.succeeded.len(), 1);
    assert_eq!(result.succeeded[0].account_id, "42");
    assert_eq!(result.failed.len(), 1);
    assert!(matches!(result.failed[0].1, WatchError::InvalidAccountId(_)));
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_expired_session_refreshed_from_file() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let creds = dir.path().join("users_data.json");
    std::fs::write(
        &creds,
        r#"[{"user_id": "42", "session_id": "fresh", "csrftoken": "csrf", "x_ig_app_id": "936619743392459"}]"#,
    )
    .unwrap();

    Mock::given(method("GET"))
        .and(header("cookie", "csrftoken=csrf; ds_user_id=42; sessionid=stale"))
        .respond_with(ResponseTemplate::new(401).set_body_string("login_required"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/friendships/42/following/"))
        .and(header("cookie", "csrftoken=csrf; ds_user_id=42; sessionid=fresh"))
        .respond_with(list(&[1, 2]))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/friendships/42/followers/"))
        .and(header("cookie", "csrftoken=csrf; ds_user_id=42; sessionid=fresh"))
        .respond_with(list(&[2]))
        .mount(&server)
        .await;

    let fetcher = PaginatedFetcher::new(config(&server))
        .unwrap()
        .with_refresher(Arc::new(FileCredentialRefresher::new(vec![creds])));
    let cycle = WatchCycle::new(
        fetcher,
        SnapshotReconciler::default(),
        StateStore::new(dir.path().join("state")),
    );

    let outcome = cycle.run_account(auth("stale")).await.unwrap();
    assert!(outcome.following_report.credentials_refreshed);
    assert!(!outcome.followers_report.credentials_refreshed);
    assert_eq!(
        outcome.refreshed_auth.map(|a| a.session_token).as_deref(),
        Some("fresh")
    );
    assert_eq!(ids(&outcome.summary.following.added), vec!["1", "2"]);
}

#[tokio::test]
async fn test_profile_counts_fetched_for_below_expected() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    serve(&server, &[1, 2], &[2]).await;
    Mock::given(method("GET"))
        .and(path("/users/42/info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"following_count": 2, "follower_count": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = PaginatedFetcher::new(FetchConfig {
        fallback_trigger: FallbackTrigger::BelowExpected,
        ..config(&server)
    })
    .unwrap();
    let cycle = WatchCycle::new(
        fetcher,
        SnapshotReconciler::default(),
        StateStore::new(dir.path()),
    );

    let outcome = cycle.run_account(auth("s")).await.unwrap();
    assert!(!outcome.following_report.fallback_triggered);
    assert!(!outcome.followers_report.fallback_triggered);
    assert_eq!(outcome.following_report.requests, 1);
}
