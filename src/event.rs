// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

//! Event kinds tracked per repository and their normalized, display-ready
//! records.
//!
//! Every [`NormalizedEvent`] carries enough information to render one report
//! line item without querying the remote API again.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Activity categories that can be watched on a repository.
///
/// The set is closed. Wire names match the vocabulary used in configuration
/// files and webhook payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,)]
pub enum EventKind
{
    /// Commits pushed to the default branch.
    #[serde(rename = "commits", alias = "commit")]
    Commit,
    /// Pull requests in any state.
    #[serde(rename = "pull_requests", alias = "pull_request", alias = "pulls")]
    PullRequest,
    /// Issues in any state, excluding pull requests.
    #[serde(rename = "issues", alias = "issue")]
    Issue,
    /// Published, draft and pre-release releases.
    #[serde(rename = "releases", alias = "release")]
    Release,
}

impl EventKind
{
    /// Every kind in rendering order.
    pub const ALL: [EventKind; 4] =
        [EventKind::Commit, EventKind::PullRequest, EventKind::Issue, EventKind::Release,];

    /// Name used in configuration files, CLI arguments and JSON payloads.
    pub const fn wire_name(self,) -> &'static str
    {
        match self {
            Self::Commit => "commits",
            Self::PullRequest => "pull_requests",
            Self::Issue => "issues",
            Self::Release => "releases",
        }
    }

    /// Human readable label used as the report subsection title.
    pub const fn label(self,) -> &'static str
    {
        match self {
            Self::Commit => "Commit",
            Self::PullRequest => "Pull Request",
            Self::Issue => "Issue",
            Self::Release => "Release",
        }
    }
}

impl fmt::Display for EventKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_,>,) -> fmt::Result
    {
        f.write_str(self.wire_name(),)
    }
}

impl FromStr for EventKind
{
    type Err = Error;

    fn from_str(value: &str,) -> Result<Self, Self::Err,>
    {
        match value.trim().to_ascii_lowercase().as_str() {
            "commits" | "commit" => Ok(Self::Commit,),
            "pull_requests" | "pull_request" | "pulls" => Ok(Self::PullRequest,),
            "issues" | "issue" => Ok(Self::Issue,),
            "releases" | "release" => Ok(Self::Release,),
            other => Err(Error::validation(format!(
                "unknown event kind '{other}', expected one of: commits, pull_requests, issues, \
                 releases"
            ),),),
        }
    }
}

/// Open/closed state shared by pull requests and issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize,)]
#[serde(rename_all = "lowercase")]
pub enum ItemState
{
    /// The item is still open.
    Open,
    /// The item has been closed (or merged).
    Closed,
}

impl ItemState
{
    /// Maps the API state string; anything other than `closed` counts as open.
    pub fn from_api(value: &str,) -> Self
    {
        if value.eq_ignore_ascii_case("closed",) { Self::Closed } else { Self::Open }
    }
}

/// Normalized commit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct CommitEvent
{
    /// Abbreviated SHA (seven characters).
    pub sha:          String,
    /// First line of the commit message.
    pub message:      String,
    /// Author name recorded in the commit.
    pub author:       String,
    /// Author email recorded in the commit.
    pub author_email: String,
    /// Authoring timestamp.
    pub created_at:   Option<DateTime<Utc,>,>,
    /// Permalink to the commit page.
    pub url:          String,
}

/// Normalized pull request record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct PullRequestEvent
{
    pub number:     u64,
    pub title:      String,
    pub state:      ItemState,
    pub merged:     bool,
    pub author:     String,
    pub created_at: Option<DateTime<Utc,>,>,
    pub updated_at: Option<DateTime<Utc,>,>,
    pub merged_at:  Option<DateTime<Utc,>,>,
    pub url:        String,
}

/// Normalized issue record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct IssueEvent
{
    pub number:     u64,
    pub title:      String,
    pub state:      ItemState,
    pub author:     String,
    pub created_at: Option<DateTime<Utc,>,>,
    pub updated_at: Option<DateTime<Utc,>,>,
    pub closed_at:  Option<DateTime<Utc,>,>,
    pub url:        String,
}

/// Normalized release record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct ReleaseEvent
{
    pub tag_name:     String,
    /// Display name, falling back to the tag when the release is unnamed.
    pub name:         String,
    pub draft:        bool,
    pub prerelease:   bool,
    pub author:       String,
    pub created_at:   Option<DateTime<Utc,>,>,
    pub published_at: Option<DateTime<Utc,>,>,
    pub url:          String,
    /// Release notes, at most 200 characters followed by `...` when cut.
    pub body:         String,
}

/// Uniform record produced by the normalizer, one variant per [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
#[serde(untagged)]
pub enum NormalizedEvent
{
    Commit(CommitEvent,),
    PullRequest(PullRequestEvent,),
    Issue(IssueEvent,),
    Release(ReleaseEvent,),
}

impl NormalizedEvent
{
    /// Returns the kind this record was normalized from.
    pub const fn kind(&self,) -> EventKind
    {
        match self {
            Self::Commit(_,) => EventKind::Commit,
            Self::PullRequest(_,) => EventKind::PullRequest,
            Self::Issue(_,) => EventKind::Issue,
            Self::Release(_,) => EventKind::Release,
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn event_kind_parses_wire_names_and_aliases()
    {
        assert_eq!("commits".parse::<EventKind>().expect("commits",), EventKind::Commit);
        assert_eq!(" Pull_Requests ".parse::<EventKind>().expect("pulls",), EventKind::PullRequest);
        assert_eq!("issue".parse::<EventKind>().expect("issue",), EventKind::Issue);
        assert_eq!("releases".parse::<EventKind>().expect("releases",), EventKind::Release);
    }

    #[test]
    fn event_kind_rejects_unknown_values()
    {
        let error = "stars".parse::<EventKind>().expect_err("stars is not a kind",);
        assert!(error.to_string().contains("unknown event kind 'stars'"));
    }

    #[test]
    fn event_kind_serializes_to_wire_name()
    {
        let json = serde_json::to_string(&EventKind::PullRequest,).expect("serialize",);
        assert_eq!(json, "\"pull_requests\"");

        let kind: EventKind = serde_yaml::from_str("release",).expect("alias accepted",);
        assert_eq!(kind, EventKind::Release);
    }

    #[test]
    fn item_state_treats_anything_but_closed_as_open()
    {
        assert_eq!(ItemState::from_api("closed"), ItemState::Closed);
        assert_eq!(ItemState::from_api("CLOSED"), ItemState::Closed);
        assert_eq!(ItemState::from_api("open"), ItemState::Open);
        assert_eq!(ItemState::from_api(""), ItemState::Open);
    }

    #[test]
    fn normalized_event_reports_its_kind()
    {
        let event = NormalizedEvent::Commit(CommitEvent {
            sha:          "abc1234".to_owned(),
            message:      "Initial commit".to_owned(),
            author:       "Mona".to_owned(),
            author_email: "mona@example.com".to_owned(),
            created_at:   None,
            url:          "https://github.com/octocat/hello-world/commit/abc1234".to_owned(),
        },);

        assert_eq!(event.kind(), EventKind::Commit);
        let json = serde_json::to_value(&event,).expect("serialize",);
        assert_eq!(json["sha"], "abc1234");
    }
}
