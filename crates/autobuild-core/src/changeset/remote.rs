//! Remote change source backed by a GitLab project events endpoint.
//!
//! The endpoint returns the project's recent events. The newest push event
//! names a commit range; the files changed across that range are computed in
//! the local clone of the repository.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::git;
use crate::error::{AutobuildError, Result};

/// Header GitLab expects the access token in.
pub const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

/// One entry of a project events response. Only the fields needed to find
/// push ranges are decoded; everything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectEvent {
    /// ISO-8601 creation time. Non-push events may omit it.
    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub push_data: Option<PushData>,
}

/// The `push_data` object of a push event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushData {
    pub action: String,

    /// Null when the push created a new branch.
    #[serde(default)]
    pub commit_from: Option<String>,

    #[serde(default)]
    pub commit_to: Option<String>,

    #[serde(default, rename = "ref")]
    pub ref_name: Option<String>,
}

/// Commit range of a single push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRange {
    pub from: Option<String>,
    pub to: String,
    pub pushed_at: DateTime<Utc>,
}

/// Anything that can list project events.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self) -> Result<Vec<ProjectEvent>>;
}

/// [`EventSource`] calling the GitLab events API over HTTP.
pub struct GitLabEvents {
    endpoint: String,
    token: String,
    http_client: reqwest::Client,
}

impl GitLabEvents {
    /// Create a client for `endpoint`, e.g.
    /// `https://gitlab.example.org/api/v4/projects/42/events`.
    pub fn new(endpoint: &str, token: &str) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("recipe-autobuild/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AutobuildError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            token: token.to_string(),
            http_client,
        })
    }
}

#[async_trait]
impl EventSource for GitLabEvents {
    async fn fetch_events(&self) -> Result<Vec<ProjectEvent>> {
        debug!(endpoint = %self.endpoint, "Querying project events");

        let response = self
            .http_client
            .get(&self.endpoint)
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| AutobuildError::Api(format!("{} unreachable: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AutobuildError::Api(format!(
                "{} rejected the request with status {status}",
                self.endpoint
            )));
        }

        let events: Vec<ProjectEvent> = response
            .json()
            .await
            .map_err(|e| AutobuildError::Api(format!("undecodable events response: {e}")))?;
        Ok(events)
    }
}

/// Pick the newest push event, ignoring pushes before `since`.
pub fn latest_push(
    events: &[ProjectEvent],
    since: Option<DateTime<Utc>>,
) -> Result<Option<PushRange>> {
    let mut latest: Option<PushRange> = None;

    for event in events {
        let Some(push) = &event.push_data else { continue };
        if push.action != "pushed" {
            continue;
        }
        let Some(to) = &push.commit_to else { continue };

        let raw_date = event.created_at.as_deref().ok_or_else(|| {
            AutobuildError::Api(format!("push event for {to} has no created_at"))
        })?;
        let pushed_at = parse_event_time(raw_date)?;

        if since.is_some_and(|since| pushed_at < since) {
            continue;
        }
        if latest.as_ref().is_some_and(|l| l.pushed_at >= pushed_at) {
            continue;
        }

        latest = Some(PushRange {
            // New branches are reported with an all-zero commit_from.
            from: push
                .commit_from
                .clone()
                .filter(|sha| !sha.chars().all(|c| c == '0')),
            to: to.clone(),
            pushed_at,
        });
    }

    Ok(latest)
}

/// Parse an ISO-8601 event timestamp. RFC 3339 first, then offsets
/// without a colon (`+0200`).
fn parse_event_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AutobuildError::Api(format!("invalid created_at {raw:?}: {e}")))
}

/// Remote change source: newest push reported by an [`EventSource`].
#[derive(Clone)]
pub struct RemoteApi {
    /// Local clone of the repository the events refer to.
    pub repo: PathBuf,

    /// Ignore pushes older than this.
    pub since: Option<DateTime<Utc>>,

    pub events: Arc<dyn EventSource>,
}

impl std::fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApi")
            .field("repo", &self.repo)
            .field("since", &self.since)
            .finish_non_exhaustive()
    }
}

impl RemoteApi {
    /// Absolute paths changed by the newest push, including the changes of
    /// its first commit.
    pub async fn changed_paths(&self) -> Result<Vec<PathBuf>> {
        let events = self.events.fetch_events().await?;
        let Some(range) = latest_push(&events, self.since)? else {
            warn!(
                events = events.len(),
                "No push events in the reporting window; nothing changed"
            );
            return Ok(Vec::new());
        };

        info!(
            from = range.from.as_deref().unwrap_or("-"),
            to = %range.to,
            pushed_at = %range.pushed_at,
            "Using latest push"
        );

        let top = git::toplevel(&self.repo)?;
        let to = git::resolve_commit(&top, &range.to)?;
        let from = match &range.from {
            Some(from) => git::resolve_commit(&top, from)?,
            None => to.clone(),
        };
        git::ensure_ordered(&top, &from, &to)?;

        let mut bases = git::parents(&top, &from)?;
        if bases.is_empty() {
            bases.push(git::EMPTY_TREE.to_string());
        }

        let mut paths = Vec::new();
        for base in &bases {
            for rel in git::changed_paths(&top, base, &to)? {
                let abs = top.join(rel);
                if !paths.contains(&abs) {
                    paths.push(abs);
                }
            }
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_event(date: &str, from: Option<&str>, to: &str) -> ProjectEvent {
        ProjectEvent {
            created_at: Some(date.to_string()),
            push_data: Some(PushData {
                action: "pushed".to_string(),
                commit_from: from.map(str::to_string),
                commit_to: Some(to.to_string()),
                ref_name: Some("master".to_string()),
            }),
        }
    }

    #[test]
    fn test_null_commit_from_means_new_branch() {
        let zeros = "0".repeat(40);
        let events = vec![push_event("2020-01-01T00:00:00Z", Some(&zeros), "abc")];
        let range = latest_push(&events, None).unwrap().unwrap();
        assert_eq!(range.from, None);
        assert_eq!(range.to, "abc");
    }

    #[test]
    fn test_latest_push_picks_newest() {
        let events = vec![
            push_event("1999-02-11T11:35:15.188Z", Some("a"), "b"),
            push_event("2000-04-11T11:35:15.188Z", Some("c"), "d"),
            ProjectEvent {
                created_at: None,
                push_data: None,
            },
        ];

        let range = latest_push(&events, None).unwrap().unwrap();
        assert_eq!(range.from.as_deref(), Some("c"));
        assert_eq!(range.to, "d");
    }

    #[test]
    fn test_latest_push_ignores_other_actions() {
        let mut removed = push_event("2001-01-01T00:00:00Z", Some("x"), "y");
        removed.push_data.as_mut().unwrap().action = "removed".to_string();
        let events = vec![push_event("2000-01-01T00:00:00Z", Some("a"), "b"), removed];

        let range = latest_push(&events, None).unwrap().unwrap();
        assert_eq!(range.to, "b");
    }

    #[test]
    fn test_latest_push_respects_since() {
        let events = vec![push_event("2000-01-01T00:00:00Z", Some("a"), "b")];
        let since = DateTime::parse_from_rfc3339("2010-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(latest_push(&events, Some(since)).unwrap().is_none());
    }

    #[test]
    fn test_latest_push_rejects_bad_date() {
        let events = vec![push_event("yesterday", Some("a"), "b")];
        let err = latest_push(&events, None).unwrap_err();
        assert!(matches!(err, AutobuildError::Api(_)));
    }

    #[test]
    fn test_event_decodes_gitlab_json() {
        let raw = r#"[
            {"project_id": 42, "action_name": "pushed to",
             "created_at": "2000-04-11T11:35:15.188Z", "author": {},
             "push_data": {"commit_count": 5, "action": "pushed", "ref_type": "branch",
                           "commit_from": null, "commit_to": "abc", "ref": "master",
                           "commit_title": "did_something"},
             "author_username": "test"},
            {"project_id": "some_id", "author_username": "test"}
        ]"#;
        let events: Vec<ProjectEvent> = serde_json::from_str(raw).unwrap();
        assert_eq!(events.len(), 2);

        let range = latest_push(&events, None).unwrap().unwrap();
        assert!(range.from.is_none());
        assert_eq!(range.to, "abc");
    }

    #[test]
    fn test_event_time_accepts_offset_without_colon() {
        let parsed = parse_event_time("2020-01-01T10:00:00.123+0200").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2020-01-01T08:00:00.123+00:00");
        let parsed = parse_event_time("2020-01-01T10:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2020-01-01T10:00:00+00:00");
        assert!(matches!(
            parse_event_time("yesterday"),
            Err(AutobuildError::Api(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_events_sends_token_and_decodes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/events")
            .match_header(TOKEN_HEADER, "secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"created_at":"2020-01-01T10:00:00Z","push_data":{"action":"pushed","commit_from":"a","commit_to":"b","ref":"master"}}]"#,
            )
            .create_async()
            .await;

        let events = GitLabEvents::new(&format!("{}/events", server.url()), "secret").unwrap();
        let fetched = events.fetch_events().await.unwrap();
        mock.assert_async().await;
        assert_eq!(fetched.len(), 1);
        assert_eq!(
            fetched[0].push_data.as_ref().unwrap().ref_name.as_deref(),
            Some("master")
        );
    }

    #[tokio::test]
    async fn test_rejected_request_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .with_status(401)
            .with_body(r#"{"message":"401 Unauthorized"}"#)
            .create_async()
            .await;

        let events = GitLabEvents::new(&format!("{}/events", server.url()), "bad").unwrap();
        let err = events.fetch_events().await.unwrap_err();
        assert!(matches!(err, AutobuildError::Api(ref msg) if msg.contains("401")));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_api_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/events")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let events = GitLabEvents::new(&format!("{}/events", server.url()), "secret").unwrap();
        let err = events.fetch_events().await.unwrap_err();
        assert!(matches!(err, AutobuildError::Api(ref msg) if msg.contains("undecodable")));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_api_error() {
        let events = GitLabEvents::new("http://127.0.0.1:9/events", "token").unwrap();
        let err = events.fetch_events().await.unwrap_err();
        assert!(matches!(err, AutobuildError::Api(_)));
    }
}
