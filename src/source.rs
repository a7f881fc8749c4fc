// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

/// Time-windowed fetching of raw repository activity from the GitHub API.
///
/// [`EventSource`] is the transport seam: it lists one page of raw JSON items
/// for one event kind. [`SourceClient`] owns the window arithmetic, the
/// client-side filters for endpoints without server-side time filtering, and
/// the failure policy: any error degrades to an empty list for that kind only.
use std::{collections::BTreeMap, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use indicatif::ProgressBar;
use masterror::AppError;
use octocrab::Octocrab;
use serde::Serialize;
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet, time::timeout};
use tracing::{debug, warn};

use crate::{
    config::{CheckFrequency, FetchSettings, MAX_CONCURRENCY},
    event::EventKind,
    scheduler::Shutdown,
    subscription::Subscription,
};

/// Interval `[start, end]` bounding one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq,)]
pub struct CheckWindow
{
    pub start: DateTime<Utc,>,
    pub end:   DateTime<Utc,>,
}

impl CheckWindow
{
    /// Window of one check period ending at `now`.
    pub fn ending_at(now: DateTime<Utc,>, frequency: CheckFrequency,) -> Self
    {
        Self {
            start: now - frequency.period(), end: now,
        }
    }

    /// `true` when `instant` lies within the window, bounds included.
    pub fn contains(&self, instant: DateTime<Utc,>,) -> bool
    {
        self.start <= instant && instant <= self.end
    }
}

/// Query string sent to one list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize,)]
pub struct EventQuery
{
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state:    Option<&'static str,>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter:   Option<&'static str,>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since:    Option<String,>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until:    Option<String,>,
    pub per_page: u8,
}

impl EventQuery
{
    /// Builds the query for `kind`. Releases carry no time bounds because the
    /// endpoint ignores them; they are filtered after the fact.
    pub fn for_kind(kind: EventKind, window: &CheckWindow, per_page: u8,) -> Self
    {
        let since = Some(format_instant(window.start,),);
        let until = Some(format_instant(window.end,),);

        match kind {
            EventKind::Commit => Self {
                state: None, filter: None, since, until, per_page,
            },
            EventKind::PullRequest => Self {
                state: Some("all",), filter: None, since, until, per_page,
            },
            EventKind::Issue => Self {
                state: Some("all",), filter: Some("all",), since, until, per_page,
            },
            EventKind::Release => Self {
                state: None, filter: None, since: None, until: None, per_page,
            },
        }
    }
}

/// REST route listing `kind` for `owner/repo`.
pub fn route_for(owner: &str, repo: &str, kind: EventKind,) -> String
{
    let segment = match kind {
        EventKind::Commit => "commits",
        EventKind::PullRequest => "pulls",
        EventKind::Issue => "issues",
        EventKind::Release => "releases",
    };
    format!("/repos/{owner}/{repo}/{segment}")
}

fn format_instant(instant: DateTime<Utc,>,) -> String
{
    instant.to_rfc3339_opts(SecondsFormat::Secs, true,)
}

/// Transport listing raw activity items.
pub trait EventSource: Send + Sync + 'static
{
    /// Lists one page of raw items of `kind` for `owner/repo`.
    fn list_events(
        &self,
        owner: &str,
        repo: &str,
        kind: EventKind,
        query: &EventQuery,
    ) -> impl Future<Output = Result<Vec<Value,>, AppError,>,> + Send;
}

/// [`EventSource`] backed by the GitHub REST API through octocrab.
#[derive(Clone,)]
pub struct GithubSource
{
    octocrab: Octocrab,
    timeout:  Duration,
}

impl GithubSource
{
    /// Creates an authenticated client for `api_base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError`] when the base URL is invalid or the client cannot
    /// be built.
    pub fn new(token: &str, api_base_url: &str, timeout: Duration,) -> Result<Self, AppError,>
    {
        let octocrab = Octocrab::builder()
            .personal_token(token,)
            .base_uri(api_base_url,)
            .map_err(|e| AppError::validation(format!("invalid api_base_url: {e}"),),)?
            .build()
            .map_err(|e| {
                AppError::unauthorized(format!("failed to initialize GitHub client: {e}"),)
            },)?;

        Ok(Self {
            octocrab,
            timeout,
        },)
    }
}

impl EventSource for GithubSource
{
    async fn list_events(
        &self,
        owner: &str,
        repo: &str,
        kind: EventKind,
        query: &EventQuery,
    ) -> Result<Vec<Value,>, AppError,>
    {
        let route = route_for(owner, repo, kind,);
        debug!("GET {} {:?}", route, query);

        let request = self.octocrab.get::<Vec<Value,>, _, _>(&route, Some(query,),);
        match timeout(self.timeout, request,).await {
            Ok(Ok(items,),) => Ok(items,),
            Ok(Err(e,),) => Err(AppError::service(format!("GET {route} failed: {e}"),),),
            Err(_,) => Err(AppError::service(format!(
                "GET {route} timed out after {}s",
                self.timeout.as_secs()
            ),),),
        }
    }
}

/// Raw activity of one repository, one list per watched kind.
#[derive(Debug, Clone, PartialEq,)]
pub struct RawRepositoryEvents
{
    pub owner:      String,
    pub repo:       String,
    pub fetched_at: DateTime<Utc,>,
    pub events:     BTreeMap<EventKind, Vec<Value,>,>,
}

impl RawRepositoryEvents
{
    fn empty(subscription: &Subscription, fetched_at: DateTime<Utc,>,) -> Self
    {
        Self {
            owner: subscription.owner.clone(),
            repo: subscription.repo.clone(),
            fetched_at,
            events: subscription.watched_kinds.iter().map(|kind| (*kind, Vec::new(),),).collect(),
        }
    }
}

/// `true` when an issues-endpoint item is really a pull request.
pub fn carries_pull_request_reference(item: &Value,) -> bool
{
    item.get("pull_request",).is_some_and(|reference| !reference.is_null(),)
}

/// Drops pull requests returned by the shared issues endpoint.
pub fn exclude_pull_requests(items: Vec<Value,>,) -> Vec<Value,>
{
    items.into_iter().filter(|item| !carries_pull_request_reference(item,),).collect()
}

/// Keeps releases whose `created_at` lies within `window`. Releases without
/// a parseable timestamp are dropped.
pub fn releases_within(items: Vec<Value,>, window: &CheckWindow,) -> Vec<Value,>
{
    items
        .into_iter()
        .filter(|item| {
            item.get("created_at",)
                .and_then(Value::as_str,)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw,).ok(),)
                .is_some_and(|created| window.contains(created.with_timezone(&Utc,),),)
        },)
        .collect()
}

/// Fetches raw activity for subscriptions through an [`EventSource`].
pub struct SourceClient<S,>
{
    source:          S,
    page_size:       u8,
    max_concurrency: usize,
}

impl<S: EventSource,> SourceClient<S,>
{
    pub fn new(source: S, settings: &FetchSettings,) -> Self
    {
        Self {
            source,
            page_size: settings.page_size,
            max_concurrency: settings.max_concurrency.clamp(1, MAX_CONCURRENCY,),
        }
    }

    pub fn source(&self,) -> &S
    {
        &self.source
    }

    /// Fetches every watched kind of one subscription.
    ///
    /// Never fails: a failing kind is logged and left empty.
    pub async fn fetch_repository(
        &self,
        subscription: &Subscription,
        window: &CheckWindow,
    ) -> RawRepositoryEvents
    {
        let mut raw = RawRepositoryEvents::empty(subscription, Utc::now(),);

        for kind in subscription.watched_kinds.iter().copied() {
            let items = self.fetch_kind(subscription, kind, window,).await;
            raw.events.insert(kind, items,);
        }

        raw
    }

    async fn fetch_kind(
        &self,
        subscription: &Subscription,
        kind: EventKind,
        window: &CheckWindow,
    ) -> Vec<Value,>
    {
        let query = EventQuery::for_kind(kind, window, self.page_size,);
        let items = match self
            .source
            .list_events(&subscription.owner, &subscription.repo, kind, &query,)
            .await
        {
            Ok(items,) => items,
            Err(error,) => {
                warn!(
                    repository = %subscription.full_name(),
                    kind = %kind,
                    "Failed to fetch {}: {}", kind.label(), error
                );
                return Vec::new();
            }
        };

        let items = match kind {
            EventKind::Issue => exclude_pull_requests(items,),
            EventKind::Release => releases_within(items, window,),
            EventKind::Commit | EventKind::PullRequest => items,
        };
        debug!("{} {}: {} items in window", subscription.full_name(), kind, items.len());
        items
    }
}

impl<S: EventSource,> SourceClient<S,>
{
    /// Fetches all subscriptions concurrently, at most `max_concurrency`
    /// repositories at a time.
    ///
    /// Each repository fills its own slot; the result follows subscription
    /// order. Returns `None` when `shutdown` fired before every repository
    /// was fetched, in which case the run must be abandoned.
    pub async fn fetch_all(
        self: &Arc<Self,>,
        subscriptions: &[Subscription],
        window: &CheckWindow,
        shutdown: &Shutdown,
        progress: &ProgressBar,
    ) -> Option<Vec<RawRepositoryEvents,>,>
    {
        let limit = Arc::new(Semaphore::new(self.max_concurrency,),);
        let mut tasks = JoinSet::new();

        for (slot, subscription,) in subscriptions.iter().cloned().enumerate() {
            let client = Arc::clone(self,);
            let limit = Arc::clone(&limit,);
            let shutdown = shutdown.clone();
            let window = *window;

            tasks.spawn(async move {
                let _permit = limit.acquire_owned().await.ok()?;
                if shutdown.is_triggered() {
                    debug!("Skipping {} after shutdown request", subscription.full_name());
                    return None;
                }
                Some((slot, client.fetch_repository(&subscription, &window,).await,),)
            },);
        }

        let mut slots: Vec<Option<RawRepositoryEvents,>,> =
            (0..subscriptions.len()).map(|_| None,).collect();
        while let Some(joined,) = tasks.join_next().await {
            match joined {
                Ok(Some((slot, raw,),),) => {
                    progress.set_message(format!("{}/{}", raw.owner, raw.repo),);
                    progress.inc(1,);
                    slots[slot] = Some(raw,);
                }
                Ok(None,) => {}
                Err(error,) => warn!("Repository fetch task failed: {}", error),
            }
        }

        if shutdown.is_triggered() {
            return None;
        }

        let fetched_at = Utc::now();
        Some(
            slots
                .into_iter()
                .zip(subscriptions,)
                .map(|(slot, subscription,)| {
                    slot.unwrap_or_else(|| RawRepositoryEvents::empty(subscription, fetched_at,),)
                },)
                .collect(),
        )
    }
}
