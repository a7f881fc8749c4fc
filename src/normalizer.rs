// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Transformation logic that converts raw API payloads into normalized,
//! display-ready events.
//!
//! Normalization is a pure mapping per [`EventKind`]. Optional fields are
//! tolerated, missing authors collapse to [`UNKNOWN_AUTHOR`], and an entry that
//! cannot be decoded at all is skipped with a warning. A run never fails here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::warn;

use crate::{
    digest::RepositoryDigest,
    event::{
        CommitEvent, EventKind, IssueEvent, ItemState, NormalizedEvent, PullRequestEvent,
        ReleaseEvent,
    },
    source::{RawRepositoryEvents, carries_pull_request_reference},
};

/// Author recorded when the payload carries no usable identity.
pub const UNKNOWN_AUTHOR: &str = "unknown";
/// Maximum number of release body characters kept before the ellipsis.
pub const RELEASE_BODY_LIMIT: usize = 200;
/// Marker appended to truncated release bodies.
pub const ELLIPSIS: &str = "...";
/// Length of the abbreviated commit SHA.
const SHORT_SHA_LEN: usize = 7;

#[derive(Debug, Default, Deserialize,)]
struct RawUser
{
    login: Option<String,>,
}

#[derive(Debug, Deserialize,)]
struct RawCommit
{
    sha:      String,
    #[serde(default)]
    commit:   RawCommitDetail,
    html_url: Option<String,>,
}

#[derive(Debug, Default, Deserialize,)]
struct RawCommitDetail
{
    message: Option<String,>,
    author:  Option<RawSignature,>,
}

#[derive(Debug, Deserialize,)]
struct RawSignature
{
    name:  Option<String,>,
    email: Option<String,>,
    date:  Option<DateTime<Utc,>,>,
}

#[derive(Debug, Deserialize,)]
struct RawPullRequest
{
    number:     u64,
    title:      Option<String,>,
    state:      Option<String,>,
    user:       Option<RawUser,>,
    created_at: Option<DateTime<Utc,>,>,
    updated_at: Option<DateTime<Utc,>,>,
    merged:     Option<bool,>,
    merged_at:  Option<DateTime<Utc,>,>,
    html_url:   Option<String,>,
}

#[derive(Debug, Deserialize,)]
struct RawIssue
{
    number:     u64,
    title:      Option<String,>,
    state:      Option<String,>,
    user:       Option<RawUser,>,
    created_at: Option<DateTime<Utc,>,>,
    updated_at: Option<DateTime<Utc,>,>,
    closed_at:  Option<DateTime<Utc,>,>,
    html_url:   Option<String,>,
}

#[derive(Debug, Deserialize,)]
struct RawRelease
{
    tag_name:     String,
    name:         Option<String,>,
    #[serde(default)]
    draft:        bool,
    #[serde(default)]
    prerelease:   bool,
    author:       Option<RawUser,>,
    created_at:   Option<DateTime<Utc,>,>,
    published_at: Option<DateTime<Utc,>,>,
    html_url:     Option<String,>,
    body:         Option<String,>,
}

fn author_login(user: Option<RawUser,>,) -> String
{
    user.and_then(|user| user.login,)
        .filter(|login| !login.trim().is_empty(),)
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_owned(),)
}

fn first_line(message: &str,) -> String
{
    message.lines().next().unwrap_or_default().trim_end().to_owned()
}

/// Truncates `body` to [`RELEASE_BODY_LIMIT`] characters followed by
/// [`ELLIPSIS`]. Bodies at or under the limit are returned unchanged.
pub fn truncate_body(body: &str,) -> String
{
    match body.char_indices().nth(RELEASE_BODY_LIMIT,) {
        Some((cut, _,),) => format!("{}{ELLIPSIS}", &body[..cut]),
        None => body.to_owned(),
    }
}

fn decode<T: DeserializeOwned,>(item: &Value,) -> Result<T, serde_json::Error,>
{
    T::deserialize(item,)
}

fn normalize_commit(raw: RawCommit,) -> CommitEvent
{
    let signature = raw.commit.author;
    let (author, author_email, created_at,) = match signature {
        Some(signature,) => (
            signature.name.filter(|name| !name.trim().is_empty(),),
            signature.email,
            signature.date,
        ),
        None => (None, None, None,),
    };

    CommitEvent {
        sha: raw.sha.chars().take(SHORT_SHA_LEN,).collect(),
        message: first_line(raw.commit.message.as_deref().unwrap_or_default(),),
        author: author.unwrap_or_else(|| UNKNOWN_AUTHOR.to_owned(),),
        author_email: author_email.unwrap_or_default(),
        created_at,
        url: raw.html_url.unwrap_or_default(),
    }
}

fn normalize_pull_request(raw: RawPullRequest,) -> PullRequestEvent
{
    PullRequestEvent {
        number:     raw.number,
        title:      raw.title.unwrap_or_default(),
        state:      ItemState::from_api(raw.state.as_deref().unwrap_or_default(),),
        merged:     raw.merged.unwrap_or(raw.merged_at.is_some(),),
        author:     author_login(raw.user,),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        merged_at:  raw.merged_at,
        url:        raw.html_url.unwrap_or_default(),
    }
}

fn normalize_issue(raw: RawIssue,) -> IssueEvent
{
    IssueEvent {
        number:     raw.number,
        title:      raw.title.unwrap_or_default(),
        state:      ItemState::from_api(raw.state.as_deref().unwrap_or_default(),),
        author:     author_login(raw.user,),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        closed_at:  raw.closed_at,
        url:        raw.html_url.unwrap_or_default(),
    }
}

fn normalize_release(raw: RawRelease,) -> ReleaseEvent
{
    let name = raw
        .name
        .filter(|name| !name.trim().is_empty(),)
        .unwrap_or_else(|| raw.tag_name.clone(),);

    ReleaseEvent {
        tag_name: raw.tag_name,
        name,
        draft: raw.draft,
        prerelease: raw.prerelease,
        author: author_login(raw.author,),
        created_at: raw.created_at,
        published_at: raw.published_at,
        url: raw.html_url.unwrap_or_default(),
        body: truncate_body(raw.body.as_deref().unwrap_or_default(),),
    }
}

/// Normalizes one raw item of `kind`.
///
/// Returns `None` for pull requests surfacing through the issues endpoint.
///
/// # Errors
///
/// Returns the decoding error when the item lacks mandatory fields such as
/// the commit SHA, the item number or the release tag.
pub fn normalize_event(
    kind: EventKind,
    item: &Value,
) -> Result<Option<NormalizedEvent,>, serde_json::Error,>
{
    let event = match kind {
        EventKind::Commit => NormalizedEvent::Commit(normalize_commit(decode(item,)?,),),
        EventKind::PullRequest => {
            NormalizedEvent::PullRequest(normalize_pull_request(decode(item,)?,),)
        }
        EventKind::Issue => {
            if carries_pull_request_reference(item,) {
                return Ok(None,);
            }
            NormalizedEvent::Issue(normalize_issue(decode(item,)?,),)
        }
        EventKind::Release => NormalizedEvent::Release(normalize_release(decode(item,)?,),),
    };
    Ok(Some(event,),)
}

/// Normalizes the raw activity of one repository into a digest.
///
/// Every fetched kind keeps its entry, even when empty, and events keep API
/// order.
pub fn normalize_repository(raw: RawRepositoryEvents,) -> RepositoryDigest
{
    let mut digest = RepositoryDigest::new(raw.owner, raw.repo, raw.fetched_at,);
    let mut events = BTreeMap::new();

    for (kind, items,) in raw.events {
        let normalized: Vec<NormalizedEvent,> = items
            .iter()
            .filter_map(|item| match normalize_event(kind, item,) {
                Ok(event,) => event,
                Err(error,) => {
                    warn!(
                        "Skipping undecodable {} entry in {}/{}: {}",
                        kind.label(),
                        digest.owner,
                        digest.repo,
                        error
                    );
                    None
                }
            },)
            .collect();
        events.insert(kind, normalized,);
    }

    digest.events = events;
    digest
}

/// Normalizes every repository in parallel, preserving input order.
pub fn normalize_all(raws: Vec<RawRepositoryEvents,>,) -> Vec<RepositoryDigest,>
{
    raws.into_par_iter().map(normalize_repository,).collect()
}

#[cfg(test)]
mod tests
{
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    fn fetched_at() -> DateTime<Utc,>
    {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0,).single().expect("valid timestamp",)
    }

    fn raw(kind: EventKind, items: Vec<Value,>,) -> RawRepositoryEvents
    {
        RawRepositoryEvents {
            owner:      "octocat".to_owned(),
            repo:       "hello-world".to_owned(),
            fetched_at: fetched_at(),
            events:     BTreeMap::from([(kind, items,)],),
        }
    }

    fn commit_payload() -> Value
    {
        json!({
            "sha": "6dcb09b5b57875f334f61aebed695e2e4193db5e",
            "html_url": "https://github.com/octocat/hello-world/commit/6dcb09b",
            "commit": {
                "message": "Fix all the bugs\n\nLonger description",
                "author": {
                    "name": "Monalisa Octocat",
                    "email": "support@github.com",
                    "date": "2025-03-14T08:30:00Z"
                }
            }
        })
    }

    #[test]
    fn commit_keeps_short_sha_and_first_line()
    {
        let event = normalize_event(EventKind::Commit, &commit_payload(),)
            .expect("decodes",)
            .expect("kept",);

        let NormalizedEvent::Commit(commit,) = event else {
            panic!("expected commit, got {event:?}");
        };
        assert_eq!(commit.sha, "6dcb09b");
        assert_eq!(commit.message, "Fix all the bugs");
        assert_eq!(commit.author, "Monalisa Octocat");
        assert_eq!(commit.author_email, "support@github.com");
        assert_eq!(commit.created_at, Some(Utc.with_ymd_and_hms(2025, 3, 14, 8, 30, 0).unwrap()));
    }

    #[test]
    fn commit_without_author_uses_sentinel()
    {
        let payload = json!({ "sha": "abc", "commit": { "message": "init", "author": null } });
        let Some(NormalizedEvent::Commit(commit,),) =
            normalize_event(EventKind::Commit, &payload,).expect("decodes",)
        else {
            panic!("expected commit");
        };
        assert_eq!(commit.sha, "abc");
        assert_eq!(commit.author, UNKNOWN_AUTHOR);
        assert!(commit.url.is_empty());
    }

    #[test]
    fn pull_request_merged_flag_falls_back_to_merged_at()
    {
        let payload = json!({
            "number": 1347,
            "title": "Amazing new feature",
            "state": "closed",
            "user": null,
            "created_at": "2025-03-13T10:00:00Z",
            "updated_at": "2025-03-14T07:00:00Z",
            "merged_at": "2025-03-14T07:00:00Z",
            "html_url": "https://github.com/octocat/hello-world/pull/1347"
        });

        let Some(NormalizedEvent::PullRequest(pull,),) =
            normalize_event(EventKind::PullRequest, &payload,).expect("decodes",)
        else {
            panic!("expected pull request");
        };
        assert!(pull.merged);
        assert_eq!(pull.state, ItemState::Closed);
        assert_eq!(pull.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn issue_with_pull_request_reference_is_dropped()
    {
        let issue = json!({ "number": 1, "title": "Bug", "state": "open", "user": { "login": "mona" } });
        let pull = json!({ "number": 2, "title": "PR", "state": "open", "pull_request": { "url": "x" } });

        let digest = normalize_repository(raw(EventKind::Issue, vec![issue, pull],),);

        let issues = digest.events_of(EventKind::Issue,);
        assert_eq!(issues.len(), 1);
        let NormalizedEvent::Issue(issue,) = &issues[0] else {
            panic!("expected issue");
        };
        assert_eq!(issue.number, 1);
        assert_eq!(issue.author, "mona");
    }

    #[test]
    fn release_name_falls_back_to_tag_and_body_is_truncated()
    {
        let payload = json!({
            "tag_name": "v1.0.0",
            "name": null,
            "draft": false,
            "prerelease": true,
            "author": { "login": "octocat" },
            "created_at": "2025-03-14T08:00:00Z",
            "published_at": "2025-03-14T08:05:00Z",
            "html_url": "https://github.com/octocat/hello-world/releases/v1.0.0",
            "body": "x".repeat(250)
        });

        let Some(NormalizedEvent::Release(release,),) =
            normalize_event(EventKind::Release, &payload,).expect("decodes",)
        else {
            panic!("expected release");
        };
        assert_eq!(release.name, "v1.0.0");
        assert!(release.prerelease);
        assert_eq!(release.body.chars().count(), RELEASE_BODY_LIMIT + ELLIPSIS.len());
        assert!(release.body.ends_with(ELLIPSIS));
    }

    #[test]
    fn release_body_boundary_at_two_hundred_characters()
    {
        let exact = "a".repeat(200,);
        assert_eq!(truncate_body(&exact), exact);

        let over = "a".repeat(201,);
        assert_eq!(truncate_body(&over), format!("{}...", "a".repeat(200)));

        let wide = "ж".repeat(201,);
        assert_eq!(truncate_body(&wide).chars().count(), 203);
    }

    #[test]
    fn undecodable_entries_are_skipped()
    {
        let digest = normalize_repository(raw(
            EventKind::Commit,
            vec![json!({ "commit": {} }), commit_payload(), json!("garbage")],
        ),);

        assert_eq!(digest.events_of(EventKind::Commit).len(), 1);
    }

    #[test]
    fn empty_watched_kinds_produce_empty_digest()
    {
        let digest = normalize_repository(RawRepositoryEvents {
            owner:      "octocat".to_owned(),
            repo:       "hello-world".to_owned(),
            fetched_at: fetched_at(),
            events:     BTreeMap::new(),
        },);

        assert!(digest.is_empty());
        assert_eq!(digest.fetched_at, fetched_at());
    }

    #[test]
    fn normalize_all_preserves_order()
    {
        let raws: Vec<RawRepositoryEvents,> = (0..16)
            .map(|index| RawRepositoryEvents {
                owner:      "octocat".to_owned(),
                repo:       format!("repo-{index}"),
                fetched_at: fetched_at(),
                events:     BTreeMap::new(),
            },)
            .collect();

        let digests = normalize_all(raws,);
        let names: Vec<String,> = digests.iter().map(|d| d.repo.clone(),).collect();
        let expected: Vec<String,> = (0..16).map(|index| format!("repo-{index}"),).collect();
        assert_eq!(names, expected);
    }

    proptest! {
        #[test]
        fn truncated_body_never_exceeds_limit(body in ".{0,400}") {
            let truncated = truncate_body(&body);
            let length = body.chars().count();
            if length <= RELEASE_BODY_LIMIT {
                prop_assert_eq!(truncated, body);
            } else {
                prop_assert_eq!(truncated.chars().count(), RELEASE_BODY_LIMIT + ELLIPSIS.len());
                prop_assert!(body.starts_with(truncated.trim_end_matches(ELLIPSIS)));
            }
        }
    }
}
